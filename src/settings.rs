//! Code for loading program settings.
use crate::input::read_toml;
use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Program settings from config file
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct Settings {
    /// The program log level (falls back to the default level if not given)
    pub log_level: Option<String>,
    /// Whether to overwrite output files by default
    #[serde(default)]
    pub overwrite: bool,
}

impl Settings {
    /// Read the contents of a settings file from the current working directory.
    ///
    /// If the file is not present, default values for settings will be used
    ///
    /// # Returns
    ///
    /// The program settings as a `Settings` struct or an error if the file is invalid
    pub fn load() -> Result<Settings> {
        Self::load_from_path(Path::new(SETTINGS_FILE_NAME))
    }

    /// Read from the specified path, returning default settings if the file doesn't exist
    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        read_toml(file_path)
    }
}
