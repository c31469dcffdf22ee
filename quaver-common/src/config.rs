//! Configuration file discovery and data folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_file_key: Option<&str>,
) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Some(key) = config_file_key {
        if let Ok(config_path) = find_config_file() {
            if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
                if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                    if let Some(folder) = config.get(key).and_then(|v| v.as_str()) {
                        return Ok(PathBuf::from(folder));
                    }
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_data_folder())
}

/// Locate the configuration file for the platform
pub fn find_config_file() -> Result<PathBuf> {
    let config_path = if cfg!(target_os = "linux") {
        // Try ~/.config/quaver/config.toml first, then /etc/quaver/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("quaver").join("config.toml"));
        let system_config = PathBuf::from("/etc/quaver/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    } else if cfg!(target_os = "macos") || cfg!(target_os = "windows") {
        dirs::config_dir()
            .map(|d| d.join("quaver").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?
    } else {
        return Err(Error::Config("Unsupported platform".to_string()));
    };

    if config_path.exists() {
        Ok(config_path)
    } else {
        Err(Error::Config(format!(
            "Config file not found: {:?}",
            config_path
        )))
    }
}

/// OS-dependent default data folder path
pub fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/quaver (or /var/lib/quaver for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("quaver"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/quaver"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/quaver
        dirs::data_dir()
            .map(|d| d.join("quaver"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/quaver"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\quaver
        dirs::data_local_dir()
            .map(|d| d.join("quaver"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\quaver"))
    } else {
        PathBuf::from("./quaver_data")
    }
}
