use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::gesture::{ClassifierConfig, DEFAULT_BAND_FRACTION};
use crate::validate::DEFAULT_MAX_DEPTH;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
    #[serde(default)]
    pub gesture: GestureConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HierarchyConfig {
    /// Deepest level a task may sit at (roots are level 0).
    pub max_depth: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GestureConfig {
    /// Width fraction of each outer band that signals nesting.
    pub band_fraction: Option<f64>,
}

impl Config {
    /// Load config from `~/.tasknest/config.toml`.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(&crate::paths::config_path()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.hierarchy.max_depth == Some(0) {
            bail!(
                "failed to parse {}: hierarchy.max_depth must be at least 1",
                path.display()
            );
        }
        if let Some(fraction) = self.gesture.band_fraction {
            if !(fraction > 0.0 && fraction < 0.5) {
                bail!(
                    "failed to parse {}: gesture.band_fraction must be between 0 and 0.5 (exclusive), got {fraction}",
                    path.display()
                );
            }
        }
        Ok(())
    }

    pub fn max_depth(&self) -> u32 {
        self.hierarchy.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }

    pub fn band_fraction(&self) -> f64 {
        self.gesture.band_fraction.unwrap_or(DEFAULT_BAND_FRACTION)
    }

    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            band_fraction: self.band_fraction(),
            max_depth: self.max_depth(),
        }
    }
}
