//! Source of "now" for heartbeat stamps and staleness cutoffs.
//!
//! Every time-dependent statement is written as
//! `COALESCE($n::timestamptz, NOW())`, so the strategy only decides whether
//! a timestamp is bound. Call sites never branch on it.

use chrono::{DateTime, Utc};
use mockable::Clock;
use std::fmt;
use std::sync::Arc;

/// Clock strategy selected when the store is constructed.
#[derive(Clone, Default)]
pub enum StoreClock {
    /// Defer to the database server's `NOW()`.
    #[default]
    Server,
    /// Bind timestamps read from an application clock.
    Application(Arc<dyn Clock + Send + Sync>),
}

impl StoreClock {
    /// Wraps an application clock.
    #[must_use]
    pub fn application(clock: impl Clock + Send + Sync + 'static) -> Self {
        Self::Application(Arc::new(clock))
    }

    /// Returns the timestamp to bind, or `None` for the server clock.
    #[must_use]
    pub fn bound_now(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Server => None,
            Self::Application(clock) => Some(clock.utc()),
        }
    }
}

impl fmt::Debug for StoreClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("StoreClock::Server"),
            Self::Application(_) => f.write_str("StoreClock::Application"),
        }
    }
}
