//! Request throttling: path filtering, token bucket accounting and the
//! transport wrapper that ties them together.

mod backend;
mod bucket;
mod filter;
mod policy;
mod transport;

pub use backend::Transport;
pub use bucket::TokenBucketLimiter;
pub use filter::{PathFilter, PrefixMatcher};
pub use policy::ThrottlingPolicy;
pub use transport::ThrottlingTransport;
