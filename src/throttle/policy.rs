//! Immutable throttling policy compiled from configuration.

use crate::config::ThrottleConfig;
use crate::error::Result;

use super::filter::PathFilter;

/// The compiled, read-only throttling rules of one transport.
#[derive(Debug, Clone)]
pub struct ThrottlingPolicy {
    /// Admission rate in requests per second, computed once here
    events_per_second: f64,
    filter: PathFilter,
    allow_overqueue: bool,
}

impl ThrottlingPolicy {
    /// Validate `config` and compile its patterns.
    pub fn new(config: &ThrottleConfig) -> Result<Self> {
        config.validate()?;

        let filter = PathFilter::new(
            &config.http_methods,
            &config.include_prefixes,
            &config.exclude_prefixes,
        )?;

        Ok(Self {
            events_per_second: config.requests_per_unit as f64
                / config.unit_of_time.as_secs_f64(),
            filter,
            allow_overqueue: config.allow_overqueue,
        })
    }

    /// Admission rate in requests per second.
    pub fn events_per_second(&self) -> f64 {
        self.events_per_second
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    pub fn allow_overqueue(&self) -> bool {
        self.allow_overqueue
    }
}
