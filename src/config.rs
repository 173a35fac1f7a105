//! Configuration: which backends to scan, where the inventory lives, and
//! the classifier rule set.
//!
//! Config is loaded from TOML and passed explicitly to the engine; backend
//! credentials may come from the environment instead of the file.

use crate::backend::ftps::FtpsSettings;
use crate::backend::{DropboxBackend, FtpsBackend, LocalBackend, StorageBackend};
use crate::classify::ClassifierConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_FOLDER: &str = "HCS";
pub const DEFAULT_FTPS_PORT: u16 = 21;
/// Network timeout for remote backends, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One storage backend to include in reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    Local {
        name: String,
        /// Directory the inventory folder is resolved against
        root: PathBuf,
    },
    Dropbox {
        name: String,
        #[serde(default)]
        access_token: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    Ftps {
        name: String,
        #[serde(default)]
        host: String,
        #[serde(default = "default_ftps_port")]
        port: u16,
        #[serde(default)]
        user: String,
        #[serde(default)]
        password: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_ftps_port() -> u16 {
    DEFAULT_FTPS_PORT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl BackendConfig {
    pub fn name(&self) -> &str {
        match self {
            BackendConfig::Local { name, .. }
            | BackendConfig::Dropbox { name, .. }
            | BackendConfig::Ftps { name, .. } => name,
        }
    }

    pub fn build(&self) -> Result<Arc<dyn StorageBackend>> {
        let backend: Arc<dyn StorageBackend> = match self {
            BackendConfig::Local { name, root } => Arc::new(LocalBackend::new(name.clone(), root.clone())),
            BackendConfig::Dropbox {
                name,
                access_token,
                timeout_secs,
            } => Arc::new(DropboxBackend::new(
                name.clone(),
                access_token.clone(),
                Duration::from_secs(*timeout_secs),
            )?),
            BackendConfig::Ftps {
                name,
                host,
                port,
                user,
                password,
                timeout_secs,
            } => Arc::new(FtpsBackend::new(
                name.clone(),
                FtpsSettings {
                    host: host.clone(),
                    port: *port,
                    user: user.clone(),
                    password: password.clone(),
                    timeout: Duration::from_secs(*timeout_secs),
                },
            )),
        };
        Ok(backend)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Folder scanned on every backend
    #[serde(default = "default_base_folder")]
    pub base_folder: String,
    /// Snapshot file for the JSON store
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

fn default_base_folder() -> String {
    DEFAULT_BASE_FOLDER.to_string()
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("nova-inventory"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("inventory.json")
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            base_folder: default_base_folder(),
            store_path: default_store_path(),
            backends: Vec::new(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl InventoryConfig {
    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| Error::Configuration {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config as TOML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| Error::Configuration {
            reason: "could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("nova-inventory").join("config.toml"))
    }

    /// Build the three-backend setup from environment variables.
    ///
    /// Backends with no credentials in the environment are left out.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(folder) = non_empty("INVENTORY_BASE_FOLDER") {
            config.base_folder = folder;
        }
        if let Some(store) = non_empty("INVENTORY_STORE_PATH") {
            config.store_path = PathBuf::from(store);
        }

        config.backends.push(BackendConfig::Local {
            name: "local".to_string(),
            root: non_empty("INVENTORY_LOCAL_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        });

        if let Some(access_token) = non_empty("DROPBOX_ACCESS_TOKEN") {
            config.backends.push(BackendConfig::Dropbox {
                name: "dropbox".to_string(),
                access_token,
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            });
        }

        if let Some(host) = non_empty("FTPS_HOST") {
            let port = match non_empty("FTPS_PORT").map(|p| p.parse::<u16>()) {
                Some(Ok(port)) => port,
                Some(Err(_)) => {
                    warn!("Ignoring invalid FTPS_PORT, using {}", DEFAULT_FTPS_PORT);
                    DEFAULT_FTPS_PORT
                }
                None => DEFAULT_FTPS_PORT,
            };
            config.backends.push(BackendConfig::Ftps {
                name: "ftps".to_string(),
                host,
                port,
                user: non_empty("FTPS_USER").unwrap_or_default(),
                password: non_empty("FTPS_PASSWORD").unwrap_or_default(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            });
        }

        config
    }

    /// Let environment credentials override values from the file
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for backend in &mut self.backends {
            match backend {
                BackendConfig::Local { .. } => {}
                BackendConfig::Dropbox { access_token, .. } => {
                    if let Some(token) = non_empty("DROPBOX_ACCESS_TOKEN") {
                        *access_token = token;
                    }
                }
                BackendConfig::Ftps {
                    host,
                    port,
                    user,
                    password,
                    ..
                } => {
                    if let Some(value) = non_empty("FTPS_HOST") {
                        *host = value;
                    }
                    if let Some(value) = non_empty("FTPS_PORT").and_then(|p| p.parse().ok()) {
                        *port = value;
                    }
                    if let Some(value) = non_empty("FTPS_USER") {
                        *user = value;
                    }
                    if let Some(value) = non_empty("FTPS_PASSWORD") {
                        *password = value;
                    }
                }
            }
        }
    }

    /// Validate config settings
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(Error::Configuration {
                reason: "no backends configured".to_string(),
            });
        }

        let mut names = HashSet::new();
        for backend in &self.backends {
            let name = backend.name();
            if name.trim().is_empty() {
                return Err(Error::Configuration {
                    reason: "backend name must not be empty".to_string(),
                });
            }
            if !names.insert(name) {
                return Err(Error::Configuration {
                    reason: format!("duplicate backend name '{}'", name),
                });
            }

            match backend {
                BackendConfig::Dropbox { timeout_secs: 0, .. } | BackendConfig::Ftps { timeout_secs: 0, .. } => {
                    return Err(Error::Configuration {
                        reason: format!("backend '{}' has a zero timeout", name),
                    });
                }
                BackendConfig::Dropbox { access_token, .. } if access_token.is_empty() => {
                    warn!("Dropbox backend '{}' has no access token; it will be unreachable", name);
                }
                BackendConfig::Ftps { port: 0, .. } => {
                    return Err(Error::Configuration {
                        reason: format!("FTPS backend '{}' has port 0", name),
                    });
                }
                BackendConfig::Ftps { host, .. } if host.is_empty() => {
                    warn!("FTPS backend '{}' has no host; it will be unreachable", name);
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Construct every configured backend, in configured order
    pub fn build_backends(&self) -> Result<Vec<Arc<dyn StorageBackend>>> {
        self.backends.iter().map(BackendConfig::build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_from_env_includes_only_configured_backends() {
        let vars = env(&[("INVENTORY_LOCAL_ROOT", "/srv/data"), ("DROPBOX_ACCESS_TOKEN", "")]);
        let config = InventoryConfig::from_lookup(|k| vars.get(k).cloned());

        assert_eq!(config.base_folder, "HCS");
        assert_eq!(
            config.backends,
            vec![BackendConfig::Local {
                name: "local".to_string(),
                root: PathBuf::from("/srv/data"),
            }]
        );
    }

    #[test]
    fn test_from_env_full_set() -> Result<()> {
        let vars = env(&[
            ("DROPBOX_ACCESS_TOKEN", "tok"),
            ("FTPS_HOST", "ftp.example.com"),
            ("FTPS_USER", "alice"),
            ("FTPS_PASSWORD", "pw"),
            ("FTPS_PORT", "not-a-port"),
        ]);
        let config = InventoryConfig::from_lookup(|k| vars.get(k).cloned());

        let kinds: Vec<BackendKind> = config.build_backends()?.iter().map(|b| b.kind()).collect();
        assert_eq!(kinds, vec![BackendKind::Local, BackendKind::CloudDrive, BackendKind::Ftps]);
        assert!(matches!(
            config.backends[2],
            BackendConfig::Ftps {
                port: 21,
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                ..
            }
        ));
        assert!(config.validate().is_ok());
        Ok(())
    }

    #[test]
    fn test_toml_round_trip_and_overrides() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
base_folder = "Archive"
store_path = "/tmp/inv.json"

[[backends]]
type = "local"
name = "disk"
root = "/home/user"

[[backends]]
type = "ftps"
name = "nas"
host = "nas.local"
user = "backup"

[[backends]]
type = "dropbox"
name = "cloud"
timeout_secs = 5
"#,
        )?;

        let mut config = InventoryConfig::load(&path)?;
        assert_eq!(config.base_folder, "Archive");
        assert_eq!(config.classifier, ClassifierConfig::default());
        assert!(matches!(
            config.backends[1],
            BackendConfig::Ftps {
                port: 21,
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                ..
            }
        ));
        assert!(matches!(config.backends[2], BackendConfig::Dropbox { timeout_secs: 5, .. }));

        let vars = env(&[("FTPS_PASSWORD", "from-env")]);
        config.apply_overrides(|k| vars.get(k).cloned());
        match &config.backends[1] {
            BackendConfig::Ftps { password, host, .. } => {
                assert_eq!(password, "from-env");
                assert_eq!(host, "nas.local");
            }
            other => panic!("unexpected backend {:?}", other),
        }

        let saved = temp_dir.path().join("saved/config.toml");
        config.save(&saved)?;
        assert_eq!(InventoryConfig::load(&saved)?, config);
        Ok(())
    }

    #[test]
    fn test_validation() {
        let mut config = InventoryConfig::default();
        assert!(config.validate().is_err());

        config.backends = vec![
            BackendConfig::Local {
                name: "disk".to_string(),
                root: PathBuf::from("."),
            },
            BackendConfig::Local {
                name: "disk".to_string(),
                root: PathBuf::from("/other"),
            },
        ];
        assert!(config.validate().is_err());

        config.backends = vec![BackendConfig::Ftps {
            name: "nas".to_string(),
            host: "nas.local".to_string(),
            port: 0,
            user: String::new(),
            password: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }];
        assert!(config.validate().is_err());

        config.backends = vec![BackendConfig::Dropbox {
            name: "cloud".to_string(),
            access_token: "tok".to_string(),
            timeout_secs: 0,
        }];
        assert!(config.validate().is_err());
    }
}
