//! Configuration with environment variable support.
//!
//! All knobs the probe needs are resolved once at process start and threaded
//! through every call as an explicit [`Config`]: there is no ambient global.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ADB` | Path to the adb binary | `adb` (from `PATH`) |
//! | `SERIAL` | Explicit device serial | unset (auto-resolve) |
//! | `PKG` | Target application package | `com.carbit.inappkeyboard` |
//! | `ACT` | Launch component (`pkg/.Activity`) | `com.carbit.inappkeyboard/.MainActivity` |
//! | `UI_DUMP` | On-device accessibility dump path | `/sdcard/window_dump.xml` |

use std::env;
use std::time::Duration;

/// Default adb binary (resolved via `PATH`)
pub const DEFAULT_ADB: &str = "adb";

/// Default target application package
pub const DEFAULT_PACKAGE: &str = "com.carbit.inappkeyboard";

/// Default launch component
pub const DEFAULT_ACTIVITY: &str = "com.carbit.inappkeyboard/.MainActivity";

/// Default on-device dump path
pub const DEFAULT_DUMP_PATH: &str = "/sdcard/window_dump.xml";

/// Environment variable for the adb path
pub const ENV_ADB: &str = "ADB";

/// Environment variable for the device serial
pub const ENV_SERIAL: &str = "SERIAL";

/// Environment variable for the target package
pub const ENV_PACKAGE: &str = "PKG";

/// Environment variable for the launch component
pub const ENV_ACTIVITY: &str = "ACT";

/// Environment variable for the dump path
pub const ENV_DUMP_PATH: &str = "UI_DUMP";

/// Centralized configuration for a probe run
#[derive(Debug, Clone)]
pub struct Config {
    /// Device tool settings
    pub adb: AdbSettings,
    /// Target application settings
    pub app: AppSettings,
    /// Retry budgets and delays
    pub timing: TimingSettings,
}

/// Device-tool related settings
#[derive(Debug, Clone)]
pub struct AdbSettings {
    /// Path to the adb binary
    pub path: String,
    /// Explicit device serial, if requested
    pub serial: Option<String>,
}

/// Target-application settings and derived resource ids
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Application package name
    pub package: String,
    /// Launch component (`pkg/.Activity`)
    pub activity: String,
    /// On-device path where `uiautomator dump` writes
    pub dump_path: String,
}

/// Retry budgets and settle delays for every polled operation
#[derive(Debug, Clone)]
pub struct TimingSettings {
    /// Attempts for one accessibility dump
    pub dump_attempts: usize,
    /// Delay between dump attempts
    pub dump_delay: Duration,
    /// Attempts when tapping an element by resource id
    pub tap_attempts: usize,
    /// Delay between tap attempts
    pub tap_delay: Duration,
    /// Settle time after a tap before re-dumping
    pub settle_delay: Duration,
    /// Settle time after launching the activity
    pub launch_delay: Duration,
    /// Upward swipes allowed to scroll a target into view
    pub scroll_attempts: usize,
    /// Taps of the language-cycle key before giving up
    pub language_cycle_attempts: usize,
    /// Maximum grid points tapped in the grid strategy
    pub grid_tap_cap: usize,
    /// Timeout for a captured shell command
    pub command_timeout: Duration,
    /// Timeout for the `adb version` preflight
    pub preflight_timeout: Duration,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            adb: AdbSettings::from_env(),
            app: AppSettings::from_env(),
            timing: TimingSettings::defaults(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            adb: AdbSettings::defaults(),
            app: AppSettings::defaults(),
            timing: TimingSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl AdbSettings {
    /// Create adb settings from environment variables
    pub fn from_env() -> Self {
        Self {
            path: env::var(ENV_ADB).unwrap_or_else(|_| DEFAULT_ADB.to_string()),
            serial: env::var(ENV_SERIAL).ok().filter(|s| !s.is_empty()),
        }
    }

    /// Create adb settings with defaults
    pub fn defaults() -> Self {
        Self {
            path: DEFAULT_ADB.to_string(),
            serial: None,
        }
    }
}

impl AppSettings {
    /// Create app settings from environment variables
    pub fn from_env() -> Self {
        Self {
            package: env::var(ENV_PACKAGE).unwrap_or_else(|_| DEFAULT_PACKAGE.to_string()),
            activity: env::var(ENV_ACTIVITY).unwrap_or_else(|_| DEFAULT_ACTIVITY.to_string()),
            dump_path: env::var(ENV_DUMP_PATH).unwrap_or_else(|_| DEFAULT_DUMP_PATH.to_string()),
        }
    }

    /// Create app settings with defaults
    pub fn defaults() -> Self {
        Self {
            package: DEFAULT_PACKAGE.to_string(),
            activity: DEFAULT_ACTIVITY.to_string(),
            dump_path: DEFAULT_DUMP_PATH.to_string(),
        }
    }

    /// Resource id of an element under this package (`<pkg>:id/<name>`)
    pub fn resource_id(&self, name: &str) -> String {
        format!("{}:id/{}", self.package, name)
    }

    /// Resource id of the keyboard container view
    pub fn keyboard_container_id(&self) -> String {
        self.resource_id("main_keyboard_container")
    }

    /// Resource id of the generic input container (tap-center fallback)
    pub fn input_container_id(&self) -> String {
        self.resource_id("input_container")
    }
}

impl TimingSettings {
    /// Budgets matching the known flakiness of `uiautomator dump`
    pub fn defaults() -> Self {
        Self {
            dump_attempts: 6,
            dump_delay: Duration::from_millis(60),
            tap_attempts: 18,
            tap_delay: Duration::from_millis(250),
            settle_delay: Duration::from_millis(80),
            launch_delay: Duration::from_millis(1300),
            scroll_attempts: 3,
            language_cycle_attempts: 8,
            grid_tap_cap: 30,
            command_timeout: Duration::from_secs(30),
            preflight_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_uses_package() {
        let app = AppSettings::defaults();
        assert_eq!(
            app.resource_id("btn_text"),
            "com.carbit.inappkeyboard:id/btn_text"
        );
        assert_eq!(
            app.keyboard_container_id(),
            "com.carbit.inappkeyboard:id/main_keyboard_container"
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.adb.path, DEFAULT_ADB);
        assert!(config.adb.serial.is_none());
        assert_eq!(config.app.package, DEFAULT_PACKAGE);
        assert_eq!(config.timing.dump_attempts, 6);
    }
}
