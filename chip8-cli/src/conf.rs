//! Application configuration.
use std::{env, fs, path::Path};

use chip8::{prelude::*, Hz};
use serde::Deserialize;

use crate::{error::AppError, keymap::{KeyDef, KeyMap}};

/// Environment variable naming the YAML configuration file.
pub const CONF_ENV: &str = "CHIP8_CONF";

const DEFAULT_CLOCK: Hz = Hz(500);

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CliConf {
    pub vm: Chip8Conf,
    /// Replaces the default key layout when present.
    pub keymap: Option<Vec<KeyDef>>,
    pub pixel_on: char,
    pub pixel_off: char,
}

impl Default for CliConf {
    fn default() -> Self {
        Self {
            vm: Chip8Conf {
                clock_frequency: Some(DEFAULT_CLOCK),
                ..Default::default()
            },
            keymap: None,
            pixel_on: '#',
            pixel_off: ' ',
        }
    }
}

impl CliConf {
    /// Load the file named by [`CONF_ENV`], or the defaults when it is unset.
    pub fn load() -> Result<Self, AppError> {
        match env::var_os(CONF_ENV) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        log::info!("loading configuration from {}", path.display());
        let text =
            fs::read_to_string(path).map_err(|err| AppError::conf_read(path.display(), err))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, AppError> {
        let conf: CliConf = serde_yaml::from_str(text)?;
        log::debug!("configuration: {conf:#?}");
        Ok(conf)
    }

    pub fn keymap(&self) -> KeyMap {
        match &self.keymap {
            Some(defs) => KeyMap::from_defs(defs),
            None => KeyMap::default(),
        }
    }
}
