// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pipeline configuration via `isp_pipeline.yaml`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{IspError, Result};
use crate::core::pacing::FramePacer;
use crate::core::pipeline::ResolutionPolicy;
use crate::core::processors::CommonParams;

/// One stage of the configured chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Registered plugin type, e.g. `gamma`.
    pub name: String,
    /// Instance name; also names the settings file. Defaults to `name`.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Parameters applied before init, as for a settings surface.
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            settings: serde_json::Value::Null,
        }
    }

    pub fn instance_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

fn default_frame_rate() -> f64 {
    30.0
}

fn default_settings_dir() -> PathBuf {
    PathBuf::from("settings")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum compatible isplib version (e.g. ">=0.3.0").
    #[serde(default)]
    pub isplib_version: Option<String>,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Directory holding `<instance name>.ini` settings files.
    #[serde(default = "default_settings_dir")]
    pub settings_dir: PathBuf,

    #[serde(default)]
    pub resolution_policy: ResolutionPolicy,

    /// Directories scanned for dynamic plugin libraries.
    #[serde(default)]
    pub plugin_dirs: Vec<PathBuf>,

    /// Chain order, source first.
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            isplib_version: None,
            frame_rate: default_frame_rate(),
            settings_dir: default_settings_dir(),
            resolution_policy: ResolutionPolicy::default(),
            plugin_dirs: Vec::new(),
            plugins: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "isp_pipeline.yaml";

    /// Load `isp_pipeline.yaml` from a directory.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(Self::FILE_NAME))
    }

    pub fn load_from_file(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path).map_err(|e| {
            IspError::Configuration(format!("Failed to read {}: {}", config_path.display(), e))
        })?;

        let mut config: Self = serde_yaml::from_str(&content).map_err(|e| {
            IspError::Configuration(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
        config.validate()?;

        // Relative paths are relative to the file.
        if let Some(base) = config_path.parent() {
            config.resolve_relative_paths(base);
        }

        tracing::info!("Loaded pipeline config from {}", config_path.display());
        Ok(config)
    }

    /// Load from a directory, returning defaults if the file is missing or
    /// invalid.
    pub fn load_or_default(dir: &Path) -> Self {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            tracing::debug!(
                "No {} found in {}, using defaults",
                Self::FILE_NAME,
                dir.display()
            );
            return Self::default();
        }

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(IspError::Configuration(format!(
                "frame_rate must be greater than 0, got {}",
                self.frame_rate
            )));
        }
        FramePacer::from_fps(self.frame_rate)?;

        let mut seen = HashSet::new();
        for spec in &self.plugins {
            if spec.name.trim().is_empty() {
                return Err(IspError::Configuration(
                    "plugin entry without a name".to_string(),
                ));
            }
            if !seen.insert(spec.instance_name()) {
                return Err(IspError::Configuration(format!(
                    "duplicate plugin instance '{}'; set display_name to disambiguate",
                    spec.instance_name()
                )));
            }
        }

        self.check_isplib_version_compatibility()
    }

    pub fn common_params(&self) -> CommonParams {
        CommonParams {
            frame_rate: self.frame_rate,
            settings_dir: self.settings_dir.clone(),
        }
    }

    /// Returns an error if `isplib_version` is set and not satisfied by this
    /// build.
    pub fn check_isplib_version_compatibility(&self) -> Result<()> {
        let Some(constraint) = self.isplib_version.as_deref() else {
            return Ok(());
        };

        let runtime_version = env!("CARGO_PKG_VERSION");

        let min_version = constraint
            .strip_prefix(">=")
            .ok_or_else(|| {
                IspError::Configuration(format!(
                    "Unsupported isplib_version constraint '{}' (only >=X.Y.Z is supported)",
                    constraint
                ))
            })?
            .trim();

        if compare_semver(runtime_version, min_version).is_lt() {
            return Err(IspError::Configuration(format!(
                "Pipeline requires isplib {} but running version is {}",
                constraint, runtime_version
            )));
        }

        Ok(())
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        if self.settings_dir.is_relative() {
            self.settings_dir = base.join(&self.settings_dir);
        }
        for dir in &mut self.plugin_dirs {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

fn compare_semver(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| -> Vec<u64> {
        s.split('.')
            .map(|part| part.parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (va, vb) = (parse(a), parse(b));
    let len = va.len().max(vb.len());
    (0..len)
        .map(|i| {
            let pa = va.get(i).copied().unwrap_or(0);
            let pb = vb.get(i).copied().unwrap_or(0);
            pa.cmp(&pb)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(std::cmp::Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_returns_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            PipelineConfig::load(dir.path()),
            Err(IspError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::load_or_default(dir.path());
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join(PipelineConfig::FILE_NAME)).unwrap();
        write!(
            file,
            r#"
frame_rate: 15
settings_dir: state
resolution_policy: first_match
plugin_dirs: [plugins, /opt/isp/plugins]
plugins:
  - name: raw_file_source
    settings:
      path: input.raw
      width: 320
      height: 240
  - name: gamma
    display_name: gamma_main
    settings: {{ gamma: 2.2 }}
  - name: display
"#
        )
        .unwrap();

        let config = PipelineConfig::load(dir.path()).unwrap();
        assert_eq!(config.frame_rate, 15.0);
        assert_eq!(config.resolution_policy, ResolutionPolicy::FirstMatch);
        assert_eq!(config.settings_dir, dir.path().join("state"));
        assert_eq!(
            config.plugin_dirs,
            vec![dir.path().join("plugins"), PathBuf::from("/opt/isp/plugins")]
        );
        assert_eq!(config.plugins.len(), 3);
        assert_eq!(config.plugins[1].instance_name(), "gamma_main");
        assert_eq!(config.plugins[2].instance_name(), "display");
        assert!(config.plugins[2].settings.is_null());
        assert_eq!(config.plugins[0].settings["width"], 320);
        assert_eq!(config.common_params().frame_rate, 15.0);
    }

    #[test]
    fn test_duplicate_instance_names_rejected() {
        let config = PipelineConfig {
            plugins: vec![PluginSpec::new("gain"), PluginSpec::new("gain")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_frame_rate_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PipelineConfig::FILE_NAME), "frame_rate: 0\n").unwrap();
        assert!(PipelineConfig::load(dir.path()).is_err());
        assert_eq!(
            PipelineConfig::load_or_default(dir.path()),
            PipelineConfig::default()
        );
    }

    #[test]
    fn test_tiny_frame_rate_rejected() {
        let config = PipelineConfig {
            frame_rate: 1e-30,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(IspError::Configuration(_))));
    }

    #[test]
    fn test_version_constraint() {
        let mut config = PipelineConfig {
            isplib_version: Some(">=0.0.1".into()),
            ..Default::default()
        };
        assert!(config.check_isplib_version_compatibility().is_ok());

        config.isplib_version = Some(">=999.0.0".into());
        assert!(config.check_isplib_version_compatibility().is_err());

        config.isplib_version = Some("~1.0".into());
        assert!(config.check_isplib_version_compatibility().is_err());
    }

    #[test]
    fn test_compare_semver() {
        use std::cmp::Ordering;
        assert_eq!(compare_semver("0.3.0", "0.3.0"), Ordering::Equal);
        assert_eq!(compare_semver("0.3", "0.3.1"), Ordering::Less);
        assert_eq!(compare_semver("1.0.0", "0.9.9"), Ordering::Greater);
    }
}
