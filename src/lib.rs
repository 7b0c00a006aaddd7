//! kbd-probe - in-app keyboard traversal over adb and accessibility dumps.
//!
//! This crate provides:
//! - A device command layer over adb with per-command timeouts
//! - Accessibility-dump retrieval with bounded retry
//! - UI-node lookup and bounds geometry for tap targeting
//! - Per-field keyboard probes (text, number, phone, password) with a
//!   grid-tap fallback when keys are not exposed in the tree
//! - An anomaly report printed to stdout (`ANOMS <count>` + one tuple per line)
//!
//! # Example
//!
//! ```rust,no_run
//! use kbd_probe::config::Config;
//! use kbd_probe::device::{self, AdbDevice};
//! use kbd_probe::probe::Prober;
//!
//! let config = Config::from_env();
//! let serial = device::resolve_serial(&config.adb.path, None, config.timing.command_timeout)
//!     .expect("one attached device");
//! let dev = AdbDevice::new(&config.adb.path, serial);
//! let prober = Prober::new(&dev, &config);
//! prober.relaunch_app();
//! let report = prober.run_all();
//! println!("ANOMS {}", report.anomalies.len());
//! ```

pub mod config;
pub mod device;
pub mod poll;
pub mod probe;
pub mod snapshot;
pub mod uitree;

// Re-export configuration
pub use config::{AdbSettings, AppSettings, Config, TimingSettings};

// Re-export the device seam
pub use device::{AdbDevice, DeviceControl, DeviceError, DeviceResult};

// Re-export probe types
pub use probe::{Anomaly, FieldKind, ProbeReport, Prober};

// Re-export tree types
pub use uitree::{Bounds, UiNode, UiSnapshot};
