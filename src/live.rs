//! Live refresh state.
//!
//! Live mode re-reads the job source on a fixed interval. The on/off flag and
//! refresh bookkeeping live here instead of in loose globals.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Whether periodic refresh is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiveMode {
    #[default]
    Off,
    On,
}

impl LiveMode {
    /// Flip between on and off.
    pub fn toggle(self) -> Self {
        match self {
            LiveMode::Off => LiveMode::On,
            LiveMode::On => LiveMode::Off,
        }
    }

    pub fn is_on(self) -> bool {
        self == LiveMode::On
    }
}

impl fmt::Display for LiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveMode::Off => write!(f, "off"),
            LiveMode::On => write!(f, "live"),
        }
    }
}

/// A live refresh session.
#[derive(Debug, Clone)]
pub struct LiveSession {
    mode: LiveMode,
    interval: Duration,
    refreshes: u64,
    failures: u64,
    last_refresh: Option<DateTime<Utc>>,
}

impl LiveSession {
    /// A session that is off, refreshing every `interval` once started.
    pub fn new(interval: Duration) -> Self {
        Self {
            mode: LiveMode::Off,
            interval,
            refreshes: 0,
            failures: 0,
            last_refresh: None,
        }
    }

    pub fn mode(&self) -> LiveMode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    /// Toggle live mode, returning the new mode.
    pub fn toggle(&mut self) -> LiveMode {
        self.mode = self.mode.toggle();
        info!("Live mode {}", self.mode);
        self.mode
    }

    /// Record a successful refresh.
    pub fn record_refresh(&mut self, at: DateTime<Utc>) {
        self.refreshes += 1;
        self.last_refresh = Some(at);
    }

    /// Record a refresh that failed.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }
}
