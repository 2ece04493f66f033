// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Detection of owned buffers that are dropped without being released.

mod config;
mod detector;
mod report;

pub use config::{ENV_LEAK_DETECTION, ENV_LEAK_DETECTION_MODE, ENV_LEAK_DETECTION_SITES, LeakDetectionConfig, LeakReportMode};
pub(crate) use detector::LeakTracker;
pub use detector::{LeakDetector, SWEEP_INTERVAL};
pub use report::LeakReport;
