use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "TodoTui";
const APP_NAME: &str = "todotui";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Ties the discovered [`ConfigPaths`] to the parsed [`AppConfig`]. On first
/// run the default configuration is serialized out so users have a file to
/// edit.
pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        ConfigPaths::discover().map(|paths| Self { paths })
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        let file = &self.paths.config_file;
        let mut cfg = match fs::read_to_string(file) {
            Ok(raw) => toml::from_str(&raw)
                .with_context(|| format!("parsing config {}", file.display()))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let cfg = AppConfig::default();
                let serialized =
                    toml::to_string_pretty(&cfg).context("serializing default config")?;
                fs::write(file, serialized)
                    .with_context(|| format!("writing default config {}", file.display()))?;
                cfg
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", file.display()))
            }
        };
        cfg.finalize(&self.paths);
        Ok(cfg)
    }
}

/// Every location the application touches, resolved once at startup. Tests
/// build this directly against a temp directory instead of going through
/// `discover`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub media_dir: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl ConfigPaths {
    /// XDG layout by default; TODOTUI_CONFIG may point at either a config
    /// file or a directory holding one, TODOTUI_DATA relocates the data
    /// directory wholesale.
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("no home directory to anchor the XDG directories")?;

        let (config_dir, config_file) = match env::var_os("TODOTUI_CONFIG").map(PathBuf::from) {
            Some(dir) if dir.is_dir() => {
                let file = dir.join(CONFIG_FILE_NAME);
                (dir, file)
            }
            Some(file) => {
                let dir = file
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                (dir, file)
            }
            None => {
                let dir = dirs.config_dir().to_path_buf();
                let file = dir.join(CONFIG_FILE_NAME);
                (dir, file)
            }
        };

        let data_dir = env::var_os("TODOTUI_DATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| dirs.data_dir().to_path_buf());
        let state_dir = dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir.join("state"));

        Ok(Self {
            config_dir,
            config_file,
            database_path: data_dir.join("todos.db"),
            media_dir: data_dir.join("media"),
            log_dir: state_dir.join("logs"),
            data_dir,
            state_dir,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        let dirs = [
            &self.config_dir,
            &self.data_dir,
            &self.media_dir,
            &self.state_dir,
            &self.log_dir,
        ];
        for dir in dirs {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub list: ListOptions,
    pub session: SessionOptions,
    pub storage: StorageOptions,
}

impl AppConfig {
    fn finalize(&mut self, paths: &ConfigPaths) {
        self.storage.resolve(paths);
        // A zero fetch size would spin the retrieval loops forever.
        if self.list.page_size == 0 {
            tracing::warn!("page_size of 0 in config, using the default");
            self.list.page_size = ListOptions::default().page_size;
        }
        if self.list.window_size == 0 {
            tracing::warn!("window_size of 0 in config, using the default");
            self.list.window_size = ListOptions::default().window_size;
        }
    }
}

/// How many rows each browse mode pulls per fetch: `page_size` for the paged
/// view, `window_size` for the endless view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    pub page_size: usize,
    pub window_size: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page_size: 10,
            window_size: 5,
        }
    }
}

/// The signed-in identity, if any. Overridable per invocation with `--user`
/// or the TODOTUI_USER environment variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_paths(root: &TempDir) -> ConfigPaths {
        let base = root.path();
        ConfigPaths {
            config_dir: base.join("config"),
            config_file: base.join("config/config.toml"),
            data_dir: base.join("data"),
            database_path: base.join("data/todos.db"),
            media_dir: base.join("data/media"),
            state_dir: base.join("state"),
            log_dir: base.join("logs"),
        }
    }

    #[test]
    fn first_run_writes_out_the_default_config() -> Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader {
            paths: temp_paths(&temp),
        };

        let cfg = loader.load_or_init()?;
        assert_eq!(cfg.list.page_size, 10);
        assert_eq!(cfg.list.window_size, 5);
        assert!(loader.paths().config_file.is_file());

        // The written file parses back to the same settings.
        let reloaded = loader.load_or_init()?;
        assert_eq!(reloaded.list.page_size, cfg.list.page_size);
        assert_eq!(reloaded.storage.wal_autocheckpoint, 1000);
        Ok(())
    }

    #[test]
    fn partial_config_files_keep_defaults_for_missing_keys() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        fs::write(&paths.config_file, "[list]\npage_size = 25\n")?;

        let cfg = ConfigLoader { paths }.load_or_init()?;
        assert_eq!(cfg.list.page_size, 25);
        assert_eq!(cfg.list.window_size, 5);
        assert!(cfg.session.user.is_none());
        Ok(())
    }

    #[test]
    fn zero_fetch_sizes_fall_back_to_defaults() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[list]\npage_size = 0\nwindow_size = 0\n",
        )?;

        let cfg = ConfigLoader { paths }.load_or_init()?;
        assert_eq!(cfg.list.page_size, 10);
        assert_eq!(cfg.list.window_size, 5);
        Ok(())
    }

    #[test]
    fn finalize_fills_in_the_database_path() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        let mut cfg = AppConfig::default();
        cfg.finalize(&paths);
        assert_eq!(cfg.storage.database_path, paths.database_path);

        let mut explicit = AppConfig::default();
        explicit.storage.database_path = PathBuf::from("/elsewhere/custom.db");
        explicit.finalize(&paths);
        assert_eq!(
            explicit.storage.database_path,
            PathBuf::from("/elsewhere/custom.db")
        );
        Ok(())
    }
}
