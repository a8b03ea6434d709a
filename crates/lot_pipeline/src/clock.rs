//! Execution timestamps. Injected so runs and tests control `executed_at`.

use chrono::{SecondsFormat, Utc};

pub trait Clock {
    /// Current time as `YYYY-MM-DDTHH:MM:SSZ`.
    fn now_utc(&self) -> String;
}

/// Wall clock, truncated to whole seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn now_utc(&self) -> String {
        self.0.clone()
    }
}
