use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::diagnostics::DEFAULT_WARNING_SAMPLE;
use crate::format::FormatConfig;

pub const CONFIG_FILE_NAME: &str = "aowtool.toml";
pub const WORK_DIR_ENV: &str = "AOW_WORK_DIR";
pub const WARNING_SAMPLE_ENV: &str = "AOW_WARNING_SAMPLE";
pub const STAGE1_FILE: &str = "AoW-data-1.csv";
pub const STAGE2_FILE: &str = "AoW-data-2.csv";
pub const STAGE3_FILE: &str = "AoW-data-3.csv";
pub const OVERRIDES_FILE: &str = "force_collapse.json";
pub const DEFAULT_MAX_DELTA_LIST: usize = 50;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AowConfig {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub format: FormatSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PathsSection {
    pub work_dir: Option<PathBuf>,
    /// Input table of the stage-2 transform (the extracted attack rows).
    pub input_stage2: Option<PathBuf>,
    pub overrides: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FormatSection {
    pub warning_sample: Option<usize>,
    pub show_phys_attribute: Option<bool>,
    pub max_delta_list: Option<usize>,
}

/// Configuration after applying flag > env > file > default precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub work_dir: PathBuf,
    pub stage1_path: PathBuf,
    pub stage2_path: PathBuf,
    pub stage3_path: PathBuf,
    pub overrides_path: PathBuf,
    pub format: FormatConfig,
    pub max_delta_list: usize,
}

impl AowConfig {
    pub fn resolve(&self, work_dir_flag: Option<&Path>) -> Result<ResolvedConfig> {
        self.resolve_with(work_dir_flag, |name| env::var(name).ok())
    }

    /// Same as [`AowConfig::resolve`] with an injectable environment lookup.
    pub fn resolve_with<F>(&self, work_dir_flag: Option<&Path>, lookup: F) -> Result<ResolvedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let work_dir = work_dir_flag
            .map(Path::to_path_buf)
            .or_else(|| env_value(WORK_DIR_ENV).map(PathBuf::from))
            .or_else(|| self.paths.work_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let warning_sample = match env_value(WARNING_SAMPLE_ENV) {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("invalid {WARNING_SAMPLE_ENV} value '{raw}'"))?,
            None => self
                .format
                .warning_sample
                .unwrap_or(DEFAULT_WARNING_SAMPLE),
        };

        let within = |path: &Option<PathBuf>, default: &str| match path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => work_dir.join(path),
            None => work_dir.join(default),
        };

        Ok(ResolvedConfig {
            stage1_path: within(&self.paths.input_stage2, STAGE1_FILE),
            stage2_path: work_dir.join(STAGE2_FILE),
            stage3_path: work_dir.join(STAGE3_FILE),
            overrides_path: within(&self.paths.overrides, OVERRIDES_FILE),
            format: FormatConfig {
                warning_sample,
                show_phys_attribute: self.format.show_phys_attribute.unwrap_or(false),
                ..FormatConfig::default()
            },
            max_delta_list: self
                .format
                .max_delta_list
                .unwrap_or(DEFAULT_MAX_DELTA_LIST),
            work_dir,
        })
    }
}

impl ResolvedConfig {
    /// The resolved values as a fully populated config file.
    pub fn to_config(&self) -> AowConfig {
        AowConfig {
            paths: PathsSection {
                work_dir: Some(self.work_dir.clone()),
                input_stage2: Some(self.stage1_path.clone()),
                overrides: Some(self.overrides_path.clone()),
            },
            format: FormatSection {
                warning_sample: Some(self.format.warning_sample),
                show_phys_attribute: Some(self.format.show_phys_attribute),
                max_delta_list: Some(self.max_delta_list),
            },
        }
    }
}

/// Config file used when `--config` is absent.
pub fn default_config_path(work_dir_flag: Option<&Path>) -> PathBuf {
    let dir = work_dir_flag
        .map(Path::to_path_buf)
        .or_else(|| {
            env::var(WORK_DIR_ENV)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(CONFIG_FILE_NAME)
}

/// Load and parse an AowConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<AowConfig> {
    if !config_path.exists() {
        return Ok(AowConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: AowConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn render_config(resolved: &ResolvedConfig) -> Result<String> {
    toml::to_string_pretty(&resolved.to_config()).context("failed to serialize config TOML")
}
