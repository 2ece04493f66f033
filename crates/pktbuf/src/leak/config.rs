// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::env;

/// Enables leak detection when set to `1`, `true`, `yes` or `on` (and disables it for `0`,
/// `false`, `no` or `off`).
pub const ENV_LEAK_DETECTION: &str = "PKTBUF_LEAK_DETECTION";

/// Enables capturing the allocation site of every tracked buffer, using the same values as
/// [`ENV_LEAK_DETECTION`].
pub const ENV_LEAK_DETECTION_SITES: &str = "PKTBUF_LEAK_DETECTION_SITES";

/// Selects the [`LeakReportMode`]: `log` or `strict`.
pub const ENV_LEAK_DETECTION_MODE: &str = "PKTBUF_LEAK_DETECTION_MODE";

/// How [`LeakDetector::check()`][crate::LeakDetector::check] surfaces detected leaks.
///
/// Leaks are always logged when they are found. This only controls whether an explicit check
/// additionally fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LeakReportMode {
    /// Detected leaks are logged and counted.
    #[default]
    Log,

    /// The first detected leak is returned as [`Error::MemoryLeak`][crate::Error::MemoryLeak].
    Strict,
}

/// Settings of a [`LeakDetector`][crate::LeakDetector].
///
/// The settings are read on every allocation and release, so changing them at runtime via
/// [`LeakDetector::set_config()`][crate::LeakDetector::set_config] takes effect immediately
/// for new allocations. Allocations made while detection was disabled are never tracked.
///
/// By default, leak detection is enabled in debug builds and disabled in release builds,
/// allocation sites are not captured and leaks are only logged.
///
/// # Example
///
/// ```
/// use pktbuf::{LeakDetectionConfig, LeakReportMode};
///
/// let config = LeakDetectionConfig::default()
///     .with_enabled(true)
///     .with_allocation_sites(true)
///     .with_mode(LeakReportMode::Strict);
///
/// assert!(config.is_enabled());
/// assert!(config.captures_allocation_sites());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LeakDetectionConfig {
    enabled: bool,
    allocation_sites: bool,
    mode: LeakReportMode,
}

impl LeakDetectionConfig {
    /// A configuration with leak detection switched off.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            allocation_sites: false,
            mode: LeakReportMode::Log,
        }
    }

    /// Reads the configuration from the `PKTBUF_LEAK_DETECTION*` environment variables.
    ///
    /// Unset or unrecognized values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            enabled: lookup(ENV_LEAK_DETECTION)
                .and_then(|value| parse_flag(&value))
                .unwrap_or(defaults.enabled),
            allocation_sites: lookup(ENV_LEAK_DETECTION_SITES)
                .and_then(|value| parse_flag(&value))
                .unwrap_or(defaults.allocation_sites),
            mode: lookup(ENV_LEAK_DETECTION_MODE)
                .and_then(|value| parse_mode(&value))
                .unwrap_or(defaults.mode),
        }
    }

    /// Enables or disables tracking of new allocations.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enables or disables capturing a backtrace at every tracked allocation.
    ///
    /// Capturing backtraces is expensive and meant for hunting down a known leak.
    #[must_use]
    pub const fn with_allocation_sites(mut self, allocation_sites: bool) -> Self {
        self.allocation_sites = allocation_sites;
        self
    }

    /// Sets how explicit checks surface detected leaks.
    #[must_use]
    pub const fn with_mode(mut self, mode: LeakReportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether new allocations are tracked.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a backtrace is captured for every tracked allocation.
    #[must_use]
    pub const fn captures_allocation_sites(&self) -> bool {
        self.allocation_sites
    }

    /// How explicit checks surface detected leaks.
    #[must_use]
    pub const fn mode(&self) -> LeakReportMode {
        self.mode
    }
}

impl Default for LeakDetectionConfig {
    fn default() -> Self {
        Self::disabled().with_enabled(cfg!(debug_assertions))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_mode(value: &str) -> Option<LeakReportMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "log" => Some(LeakReportMode::Log),
        "strict" => Some(LeakReportMode::Strict),
        _ => None,
    }
}
