use crate::domain::{
    config::RemoteUartConfig,
    error::{RemoteUartError, RemoteUartResult},
};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = "remote-uart";
const PROJECT_DIR: &str = ".remote-uart";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> RemoteUartResult<Self> {
        let global_config_path = Self::get_global_config_path()?;
        let project_config_path = std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find_project_config_path(&dir));

        Ok(Self {
            global_config_path,
            project_config_path,
        })
    }

    /// Create a manager with explicit paths
    pub fn with_paths(global_config_path: PathBuf, project_config_path: Option<PathBuf>) -> Self {
        Self {
            global_config_path,
            project_config_path,
        }
    }

    /// Load configuration from files
    ///
    /// Defaults are replaced by the global file, which is replaced by the
    /// project file when one is found.
    pub fn load_config(&self) -> RemoteUartResult<RemoteUartConfig> {
        let mut config = RemoteUartConfig::default();

        if self.global_config_path.exists() {
            config = self.load_config_from_path(&self.global_config_path)?;
        }

        if let Some(project_path) = &self.project_config_path {
            if project_path.exists() {
                config = self.load_config_from_path(project_path)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Get global configuration path
    fn get_global_config_path() -> RemoteUartResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| RemoteUartError::Config {
            message: "Could not determine home directory".to_string(),
        })?;

        Ok(home.join(".config").join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up directory tree
    fn find_project_config_path(start: &Path) -> Option<PathBuf> {
        let mut path = start;

        loop {
            let config_path = path.join(PROJECT_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> RemoteUartResult<RemoteUartConfig> {
        let content = fs::read_to_string(path).map_err(|e| RemoteUartError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: RemoteUartConfig = toml::from_str(&content).map_err(|e| RemoteUartError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &RemoteUartConfig) -> RemoteUartResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| RemoteUartError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| RemoteUartError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    /// Create default project configuration
    pub fn init_project_config(&self, path: &Path) -> RemoteUartResult<PathBuf> {
        let config_dir = path.join(PROJECT_DIR);
        let config_file = config_dir.join(CONFIG_FILE);

        if config_file.exists() {
            return Err(RemoteUartError::Config {
                message: "Project configuration already exists".to_string(),
            });
        }

        fs::create_dir_all(&config_dir).map_err(|e| RemoteUartError::Config {
            message: format!("Failed to create {} directory: {}", PROJECT_DIR, e),
        })?;

        self.save_config_to_path(&config_file, &RemoteUartConfig::default())?;

        Ok(config_file)
    }

    /// Get the current project config path (if any)
    pub fn get_project_config_path(&self) -> Option<&PathBuf> {
        self.project_config_path.as_ref()
    }

    /// Get the global config path
    pub fn get_global_config_path_ref(&self) -> &PathBuf {
        &self.global_config_path
    }
}
