pub mod error;
pub mod model;

pub use error::*;
pub use model::*;

use std::path::{Path, PathBuf};

/// Environment variable pointing straight at a configuration file
pub const CONFIG_ENV: &str = "SKYBRIDGE_CONFIG";

const CONFIG_FILE: &str = "skybridge.yaml";

/// Locate skybridge.yaml
///
/// Search order:
/// 1. `SKYBRIDGE_CONFIG` environment variable
/// 2. `./skybridge.yaml`
/// 3. `./.skybridge/skybridge.yaml`
/// 4. `~/.config/skybridge/skybridge.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at missing file {}", CONFIG_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    let path = current_dir.join(CONFIG_FILE);
    if path.exists() {
        return Ok(path);
    }

    let path = current_dir.join(".skybridge").join(CONFIG_FILE);
    if path.exists() {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("skybridge").join(CONFIG_FILE);
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Parse and validate a configuration file
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: BridgeConfig =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    config.validate()?;

    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Discover, parse and validate
pub fn load() -> Result<BridgeConfig> {
    load_config(&find_config_file()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const MINIMAL: &str = "identity:\n  v2_url: http://k:5000/v2.0\n  v3_url: http://k:5000/v3\n";

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("skybridge.yaml"), MINIMAL).unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("skybridge.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_hidden_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let hidden = temp_dir.path().join(".skybridge");
        fs::create_dir(&hidden).unwrap();
        fs::write(hidden.join("skybridge.yaml"), MINIMAL).unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".skybridge/skybridge.yaml"));
    }

    #[test]
    #[serial]
    fn test_current_dir_wins_over_hidden_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let hidden = temp_dir.path().join(".skybridge");
        fs::create_dir(&hidden).unwrap();
        fs::write(hidden.join("skybridge.yaml"), MINIMAL).unwrap();
        fs::write(temp_dir.path().join("skybridge.yaml"), MINIMAL).unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_ENV, find_config_file).unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(!result.to_string_lossy().contains(".skybridge/"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, MINIMAL).unwrap();

        let result = temp_env::with_var(CONFIG_ENV, Some(config_path.as_os_str()), || {
            find_config_file()
        });

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_load_config_parses_and_validates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("skybridge.yaml");
        fs::write(&path, MINIMAL).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.identity.v3_url, "http://k:5000/v3");
    }

    #[test]
    fn test_load_config_reports_parse_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "identity: [not, a, map]\n").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_config_runs_validation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("skybridge.yaml");
        fs::write(
            &path,
            "identity:\n  v2_url: ''\n  v3_url: http://k:5000/v3\n",
        )
        .unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));
    }
}
