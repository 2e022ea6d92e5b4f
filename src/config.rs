use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{HucCode, ProjectType};
use crate::error::RsError;
use crate::identity::WatershedCatalog;

pub const CONFIG_FILE: &str = "rs-ec.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub builtin_catalog: Option<bool>,
    #[serde(default)]
    pub watersheds: Vec<WatershedEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WatershedEntry {
    /// `"Name:HUC"`
    Shorthand(String),
    Detailed(WatershedEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WatershedEntryObject {
    pub name: String,
    pub huc: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub project_type: ProjectType,
    pub product_version: String,
    pub catalog: WatershedCatalog,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            project_type: ProjectType::conductivity(),
            product_version: env!("CARGO_PKG_VERSION").to_string(),
            catalog: WatershedCatalog::columbia_basin(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolves configuration from an explicit path, `./rs-ec.json`, or the user config
    /// directory, in that order. Built-in defaults apply when no file is found.
    pub fn resolve(path: Option<&Utf8Path>) -> Result<ResolvedConfig, RsError> {
        let config_path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(RsError::MissingConfig(path.to_path_buf()));
                }
                Some(path.to_path_buf())
            }
            None => Self::discover(),
        };

        let Some(config_path) = config_path else {
            debug!("no config file found, using built-in defaults");
            return Self::resolve_config(Config::default());
        };

        debug!(path = %config_path, "reading config");
        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| RsError::ConfigRead(config_path.clone()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|err| RsError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    fn discover() -> Option<Utf8PathBuf> {
        let local = Utf8PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.config_dir().join("riverscapes-ec").join(CONFIG_FILE),
                )
                .ok()
            })
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, RsError> {
        let defaults = ResolvedConfig::default();

        let custom = config
            .watersheds
            .into_iter()
            .map(|entry| match entry {
                WatershedEntry::Shorthand(value) => {
                    let (name, huc) = value
                        .rsplit_once(':')
                        .ok_or_else(|| RsError::ConfigParse(format!("invalid watershed: {value}")))?;
                    Ok((name.trim().to_string(), huc.parse::<HucCode>()?))
                }
                WatershedEntry::Detailed(obj) => {
                    Ok((obj.name.trim().to_string(), obj.huc.parse::<HucCode>()?))
                }
            })
            .collect::<Result<Vec<_>, RsError>>()?;

        let catalog = if config.builtin_catalog.unwrap_or(true) {
            defaults.catalog.merged(WatershedCatalog::new(custom))
        } else {
            WatershedCatalog::new(custom)
        };

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(defaults.schema_version),
            project_type: config
                .project_type
                .map(|value| value.parse::<ProjectType>())
                .transpose()?
                .unwrap_or(defaults.project_type),
            product_version: config.product_version.unwrap_or(defaults.product_version),
            catalog,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.project_type.as_str(), "EC");
        assert_eq!(resolved.catalog.resolve("Entiat").unwrap().as_str(), "17020010");
    }

    #[test]
    fn shorthand_watershed() {
        let config = Config {
            watersheds: vec![WatershedEntry::Shorthand("Mad River:18010102".to_string())],
            builtin_catalog: Some(false),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.catalog.len(), 1);
        assert_eq!(
            resolved.catalog.resolve("Mad River").unwrap().as_str(),
            "18010102"
        );
    }
}
