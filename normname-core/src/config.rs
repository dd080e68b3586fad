use crate::normalize::NormalizeRules;
use crate::scanner::ScanOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory holding config and history, relative to the working directory
pub const STATE_DIR_NAME: &str = ".normname";

/// Environment variable overriding the state directory
pub const STATE_DIR_ENV: &str = "NORMNAME_STATE_DIR";

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub rules: NormalizeRules,

    #[serde(default)]
    pub scan: ScanOptions,

    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Records kept after each batch; older ones are pruned
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

fn default_max_records() -> usize {
    50
}

/// Resolve the state directory: explicit override, then the environment,
/// then `.normname` under the working directory
pub fn resolve_state_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(STATE_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(STATE_DIR_NAME))
}

impl Config {
    /// Load config from `<state dir>/config.toml` if it exists
    pub fn load(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Self::load_from_path(&config_path);
        }

        // Return default config if no config file exists
        Ok(Self::default())
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save config to `<state dir>/config.toml`
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        if !state_dir.exists() {
            fs::create_dir_all(state_dir)?;
        }

        self.save_to_path(&state_dir.join(CONFIG_FILE_NAME))
    }

    /// Save config to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.rules.remove_diacritics);
        assert!(config.rules.lowercase);
        assert_eq!(config.rules.placeholder, "unnamed");
        assert!(!config.scan.recursive);
        assert!(!config.scan.include_hidden);
        assert_eq!(config.history.max_records, 50);
    }

    #[test]
    fn test_load_save_config() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path().join(".normname");

        let mut config = Config::default();
        config.rules.lowercase = false;
        config.rules.placeholder = "file".to_string();
        config.scan.recursive = true;
        config.history.max_records = 5;

        config.save(&state_dir).unwrap();

        let loaded = Config::load(&state_dir).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_config_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_config() {
        let toml_content = r#"
[rules]
lowercase = false

[scan]
include_hidden = true
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(!config.rules.lowercase);
        // Other fields should have their defaults
        assert!(config.rules.remove_diacritics);
        assert!(config.rules.preserve_extension);
        assert!(config.scan.include_hidden);
        assert!(!config.scan.recursive);
        assert_eq!(config.history.max_records, 50);
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[rules]\nlowercase = \"yes\"\n").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_explicit_state_dir_wins() {
        let dir = resolve_state_dir(Some(Path::new("/tmp/custom-state"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/custom-state"));
    }
}
