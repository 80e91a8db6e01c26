use std::path::{Path, PathBuf};

use anyhow::Context;
use routerctl_common::files::{
    read_json_file, read_toml_file, read_yaml_file, save_json_file, save_toml_file, save_yaml_file,
};
use serde::{de::DeserializeOwned, Serialize};
use xshell::Shell;

/// Marker for serde types stored as standalone config files.
pub trait FileConfigTrait {}

pub trait FileConfigWithDefaultName {
    const FILE_NAME: &'static str;

    fn get_path_with_base_path(base_path: impl AsRef<Path>) -> PathBuf {
        base_path.as_ref().join(Self::FILE_NAME)
    }
}

/// On-disk encoding, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => anyhow::bail!("Unsupported file extension for config file {path:?}."),
        }
    }
}

/// Parses a config file in the format its extension names.
pub trait ReadConfig: Sized {
    fn read(shell: &Shell, path: impl AsRef<Path>) -> anyhow::Result<Self>;
}

impl<T> ReadConfig for T
where
    T: DeserializeOwned + FileConfigTrait,
{
    fn read(shell: &Shell, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let parsed = match ConfigFormat::from_path(path)? {
            ConfigFormat::Yaml => read_yaml_file(shell, path),
            ConfigFormat::Toml => read_toml_file(shell, path),
            ConfigFormat::Json => read_json_file(shell, path),
        };
        parsed.with_context(|| format!("Failed to parse config file {path:?}."))
    }
}

pub trait ReadConfigWithBasePath: ReadConfig + FileConfigWithDefaultName {
    fn read_with_base_path(shell: &Shell, base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        <Self as ReadConfig>::read(shell, Self::get_path_with_base_path(base_path))
    }
}

impl<T> ReadConfigWithBasePath for T where T: ReadConfig + FileConfigWithDefaultName {}

pub trait SaveConfig {
    fn save(&self, shell: &Shell, path: impl AsRef<Path>) -> anyhow::Result<()>;
}

impl<T: Serialize + FileConfigTrait> SaveConfig for T {
    fn save(&self, shell: &Shell, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        match ConfigFormat::from_path(path)? {
            ConfigFormat::Yaml => save_yaml_file(shell, path, self, ""),
            ConfigFormat::Toml => save_toml_file(shell, path, self, ""),
            ConfigFormat::Json => save_json_file(shell, path, self),
        }
        .with_context(|| format!("Failed to save config file {path:?}."))
    }
}
