//! Configuration loader.
//!
//! Looks for a configuration file in order:
//! 1. An explicit path (must exist)
//! 2. Local config: `./gardener.toml`
//! 3. User config: `<config dir>/include-gardener/gardener.toml`
//!
//! The first file found is used. Without any file, the built-in rules apply.

use crate::error::ConfigError;
use crate::GardenerConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "gardener.toml";

/// User configuration directory name.
const USER_CONFIG_DIR: &str = "include-gardener";

/// Configuration loader.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// User config directory (e.g., `~/.config/include-gardener`)
    user_config_dir: Option<PathBuf>,

    /// Directory searched for a local config file
    working_dir: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the user config directory.
    pub fn new() -> Self {
        Self {
            user_config_dir: dirs::config_dir().map(|d| d.join(USER_CONFIG_DIR)),
            working_dir: PathBuf::from("."),
        }
    }

    /// Create a loader with a custom user config directory and working directory.
    ///
    /// Useful for testing.
    pub fn with_dirs(user_dir: Option<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_config_dir: user_dir,
            working_dir: working_dir.into(),
        }
    }

    /// Get the user config file path.
    pub fn user_config_path(&self) -> Option<PathBuf> {
        self.user_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path.
    pub fn local_config_path(&self) -> PathBuf {
        self.working_dir.join(CONFIG_FILE_NAME)
    }

    /// Find the config file to use, if any.
    pub fn locate(&self, explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local = self.local_config_path();
        if local.is_file() {
            return Ok(Some(local));
        }
        trace!("Local config not found at {:?}", local);

        match self.user_config_path() {
            Some(user) if user.is_file() => Ok(Some(user)),
            Some(user) => {
                trace!("User config not found at {:?}", user);
                Ok(None)
            }
            None => {
                debug!("No user config directory found, skipping user config");
                Ok(None)
            }
        }
    }

    /// Load the configuration.
    pub fn load(&self, explicit: Option<&Path>) -> Result<GardenerConfig, ConfigError> {
        let builtin = GardenerConfig::builtin()?;

        let Some(path) = self.locate(explicit)? else {
            debug!("Using built-in rules");
            return Ok(builtin);
        };

        debug!("Loading config from {:?}", path);
        let file_config = load_config_file(&path)?;
        merge_configs(builtin, file_config).normalized()
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<GardenerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Merge a config file over the built-in rules.
///
/// A file that defines any language replaces the language table wholesale.
fn merge_configs(base: GardenerConfig, overlay: GardenerConfig) -> GardenerConfig {
    GardenerConfig {
        defaults: overlay.defaults,
        languages: if overlay.languages.is_empty() {
            base.languages
        } else {
            overlay.languages
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const CUSTOM: &str = r#"
[defaults]
threads = 6

[languages.asm]
extensions = ["s", "asm"]

[[languages.asm.statements]]
pattern = '^[ \t]*\.include[ \t]+"([^"]+)"'
kind = "quoted"
"#;

    fn isolated_loader(temp: &TempDir) -> ConfigLoader {
        ConfigLoader::with_dirs(Some(temp.path().join("user")), temp.path().join("work"))
    }

    #[test]
    fn test_load_builtin_when_no_file() {
        let temp = TempDir::new().unwrap();
        let loader = isolated_loader(&temp);

        let config = loader.load(None).unwrap();
        assert!(config.languages.contains_key("c"));
        assert!(config.languages.contains_key("python"));
        assert_eq!(config.defaults.threads, 2);
    }

    #[test]
    fn test_explicit_path_missing() {
        let temp = TempDir::new().unwrap();
        let loader = isolated_loader(&temp);

        let missing = temp.path().join("nope.toml");
        let result = loader.load(Some(&missing));
        assert!(matches!(result, Err(ConfigError::NotFound(p)) if p == missing));
    }

    #[test]
    fn test_explicit_path_replaces_languages() {
        let temp = TempDir::new().unwrap();
        let loader = isolated_loader(&temp);

        let path = temp.path().join("custom.toml");
        std::fs::write(&path, CUSTOM).unwrap();

        let config = loader.load(Some(&path)).unwrap();
        assert!(config.languages.contains_key("asm"));
        assert!(!config.languages.contains_key("c"));
        assert_eq!(config.defaults.threads, 6);
    }

    #[test]
    fn test_defaults_only_file_keeps_builtin_languages() {
        let temp = TempDir::new().unwrap();
        let loader = isolated_loader(&temp);

        let path = temp.path().join("defaults.toml");
        std::fs::write(&path, "[defaults]\nrecursive_limit = 3\n").unwrap();

        let config = loader.load(Some(&path)).unwrap();
        assert!(config.languages.contains_key("c"));
        assert_eq!(config.defaults.recursive_limit, 3);
    }

    #[test]
    fn test_local_config_takes_precedence_over_user() {
        let temp = TempDir::new().unwrap();
        let loader = isolated_loader(&temp);

        std::fs::create_dir_all(temp.path().join("work")).unwrap();
        std::fs::create_dir_all(temp.path().join("user")).unwrap();
        std::fs::write(temp.path().join("work").join(CONFIG_FILE_NAME), CUSTOM).unwrap();
        std::fs::write(
            temp.path().join("user").join(CONFIG_FILE_NAME),
            "[defaults]\nthreads = 9\n",
        )
        .unwrap();

        assert_eq!(
            loader.locate(None).unwrap(),
            Some(temp.path().join("work").join(CONFIG_FILE_NAME))
        );
        let config = loader.load(None).unwrap();
        assert_eq!(config.defaults.threads, 6);
    }

    #[test]
    fn test_user_config_used_without_local() {
        let temp = TempDir::new().unwrap();
        let loader = isolated_loader(&temp);

        std::fs::create_dir_all(temp.path().join("user")).unwrap();
        std::fs::write(
            temp.path().join("user").join(CONFIG_FILE_NAME),
            "[defaults]\nthreads = 9\n",
        )
        .unwrap();

        let config = loader.load(None).unwrap();
        assert_eq!(config.defaults.threads, 9);
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        let loader = isolated_loader(&temp);

        let path = temp.path().join("broken.toml");
        std::fs::write(&path, "[languages.c\nextensions = ").unwrap();

        let err = loader.load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
