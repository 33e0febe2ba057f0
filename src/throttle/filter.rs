//! Path and method matching that decides whether a request is throttled.

use regex::Regex;
use std::collections::HashSet;
use tracing::trace;

use crate::error::{Result, ThrottleError};

/// Pattern fragment substituted for the `*` wildcard: one path segment.
const WILDCARD: &str = "[^/]+";

/// A compiled set of path prefix patterns.
#[derive(Debug, Clone)]
pub enum PrefixMatcher {
    /// Matches every path
    All,
    /// Matches no path
    Nothing,
    /// Matches paths starting with any of the compiled prefixes
    Patterns(Regex),
}

impl PrefixMatcher {
    /// Compile an include list. No usable patterns means every path matches.
    pub fn include(prefixes: &[String]) -> Result<Self> {
        Ok(Self::compile(prefixes)?.unwrap_or(PrefixMatcher::All))
    }

    /// Compile an exclude list. No usable patterns means no path matches.
    pub fn exclude(prefixes: &[String]) -> Result<Self> {
        Ok(Self::compile(prefixes)?.unwrap_or(PrefixMatcher::Nothing))
    }

    /// Whether `path` matches.
    pub fn is_match(&self, path: &str) -> bool {
        match self {
            PrefixMatcher::All => true,
            PrefixMatcher::Nothing => false,
            PrefixMatcher::Patterns(regex) => regex.is_match(path),
        }
    }

    /// Build a single anchored alternation from the non-blank prefixes.
    ///
    /// Each prefix is validated on its own first so a failure names the
    /// offending pattern.
    fn compile(prefixes: &[String]) -> Result<Option<Self>> {
        let mut alternatives = Vec::with_capacity(prefixes.len());

        for prefix in prefixes {
            if prefix.trim().is_empty() {
                continue;
            }
            let alternative = format!("^(?:{})", prefix.replace('*', WILDCARD));
            Regex::new(&alternative).map_err(|source| ThrottleError::Pattern {
                pattern: prefix.clone(),
                source,
            })?;
            alternatives.push(alternative);
        }

        if alternatives.is_empty() {
            return Ok(None);
        }

        let combined = alternatives.join("|");
        let regex = Regex::new(&combined).map_err(|source| ThrottleError::Pattern {
            pattern: prefixes.join(", "),
            source,
        })?;
        Ok(Some(PrefixMatcher::Patterns(regex)))
    }
}

/// Decides whether a request is subject to throttling.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: PrefixMatcher,
    exclude: PrefixMatcher,
    methods: HashSet<String>,
}

impl PathFilter {
    /// Compile a filter from method and prefix lists.
    pub fn new(methods: &[String], include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: PrefixMatcher::include(include)?,
            exclude: PrefixMatcher::exclude(exclude)?,
            methods: methods.iter().cloned().collect(),
        })
    }

    /// Whether a request with this path and method is throttled.
    ///
    /// Exclusion wins over everything, then the method set, then inclusion.
    pub fn should_throttle(&self, path: &str, method: &str) -> bool {
        let throttled = !self.exclude.is_match(path)
            && (self.methods.is_empty() || self.methods.contains(method))
            && self.include.is_match(path);

        trace!(path = %path, method = %method, throttled, "Evaluated throttling filter");
        throttled
    }

    /// Whether `request` is throttled.
    pub fn applies_to(&self, request: &reqwest::Request) -> bool {
        self.should_throttle(request.url().path(), request.method().as_str())
    }
}
