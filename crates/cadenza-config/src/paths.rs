//! Platform-specific configuration paths.
//!
//! - **User config**: `~/.config/cadenza/` (Linux),
//!   `~/Library/Application Support/cadenza/` (macOS), `%APPDATA%\cadenza\` (Windows)
//! - **Engine settings**: `engine.toml` inside the user config directory
//!
//! ```rust,no_run
//! use cadenza_config::paths;
//!
//! println!("settings live at {}", paths::default_config_path().display());
//! ```

use std::path::PathBuf;

/// Application name used for directory paths.
const APP_NAME: &str = "cadenza";

/// File name of the engine settings.
pub const CONFIG_FILE_NAME: &str = "engine.toml";

/// Returns the user-specific configuration directory.
///
/// Falls back to the current directory if the platform config directory
/// cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the default location of the engine settings file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE_NAME)
}

/// Ensure the user config directory exists, creating it if necessary.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_config_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| crate::ConfigError::create_dir(&dir, e))?;
    }

    Ok(dir)
}
