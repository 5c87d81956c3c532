use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::DatasetId;
use crate::error::QmDataError;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub load_in_memory: Option<bool>,
    #[serde(default)]
    pub test_subset: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub name: DatasetId,
    pub cache_dir: Option<Utf8PathBuf>,
    pub url: Option<String>,
    pub load_in_memory: bool,
    pub test_subset: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, QmDataError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("qmdata.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(QmDataError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| QmDataError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| QmDataError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, QmDataError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let test_subset = config.test_subset.unwrap_or(false);

        // The reduced subset is its own dataset identity unless the user
        // pinned a name explicitly.
        let name = match (&config.name, test_subset) {
            (Some(name), _) => name.parse()?,
            (None, true) => "qm9-mini".parse()?,
            (None, false) => "qm9".parse()?,
        };

        Ok(ResolvedConfig {
            schema_version,
            name,
            cache_dir: config.cache_dir.map(Utf8PathBuf::from),
            url: config.url,
            load_in_memory: config.load_in_memory.unwrap_or(true),
            test_subset,
        })
    }
}
