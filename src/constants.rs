//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the crate, providing a single source of truth for constant values.

/// Settings file location constants
pub mod storage {
    /// Directory name under the platform data dir
    pub const APP_DIR: &str = "avatar-settings";

    /// Settings file name inside the data directory
    pub const FILENAME: &str = "user_settings.json";

    /// Suffix for the temporary file written before the atomic rename
    pub const TEMP_SUFFIX: &str = "tmp";

    /// Environment variable overriding the data directory
    pub const DATA_DIR_ENV: &str = "AVATAR_SETTINGS_DIR";
}

/// Body scale constraints (50%-150% in 10% steps)
pub mod scale {
    pub const MIN: f32 = 0.5;
    pub const MAX: f32 = 1.5;
    pub const STEP: f32 = 0.1;
    pub const DEFAULT: f32 = 1.0;

    /// Quantization factor: values are rounded to 1/STEPS_PER_UNIT
    pub const STEPS_PER_UNIT: f32 = 10.0;
}

/// Audio volume constraints
pub mod volume {
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 1.0;
    pub const DEFAULT: f32 = 1.0;
}

/// Debounced autosave
pub mod autosave {
    use std::time::Duration;

    /// Quiet window after the last change before an autosave fires
    pub const QUIET_WINDOW: Duration = Duration::from_secs(3);

    /// Environment variable overriding the quiet window (milliseconds)
    pub const DELAY_ENV: &str = "AUTOSAVE_DELAY_MS";
}

/// Snapshot schema
pub mod snapshot {
    /// Schema version written by this build
    pub const CURRENT_VERSION: u32 = 1;
}

/// Logging
pub mod logging {
    /// Environment variable selecting the max log level
    pub const LEVEL_ENV: &str = "LOG_LEVEL";
}
