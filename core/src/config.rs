use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::cli::GlobalOpts;

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base directory for the database and image files.
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    /// Flat directory holding imported recipe images.
    pub image_dir: PathBuf,
    pub cleanup: CleanupConfig,
    /// Whether info level logging is enabled.
    pub logging_enabled: bool,
}

/// Schedule of the unused image cleanup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupConfig {
    pub interval: Duration,
    pub requires_charging: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    storage: FileStorage,
    #[serde(default)]
    cleanup: FileCleanup,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Deserialize, Default)]
struct FileStorage {
    data_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
struct FileCleanup {
    #[serde(default = "default_interval_hours")]
    interval_hours: u64,
    #[serde(default = "default_requires_charging")]
    requires_charging: bool,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

fn default_interval_hours() -> u64 {
    24
}

fn default_requires_charging() -> bool {
    true
}

fn default_logging() -> bool {
    true
}

impl Default for FileCleanup {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            requires_charging: default_requires_charging(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(opts: &GlobalOpts) -> Result<Self> {
        // built-in defaults
        let mut data_dir: Option<PathBuf> = None;
        let mut interval_hours = default_interval_hours();
        let mut requires_charging = default_requires_charging();
        let mut logging = default_logging();

        // config file path precedence: CLI -> ENV -> default
        let config_path = opts
            .config
            .clone()
            .or_else(|| std::env::var("RECIPEBOX_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/recipebox.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents)
                .with_context(|| format!("invalid config file {}", config_path.display()))?;
            data_dir = file_cfg.storage.data_dir;
            interval_hours = file_cfg.cleanup.interval_hours;
            requires_charging = file_cfg.cleanup.requires_charging;
            logging = file_cfg.logging.enabled;
        }

        // environment overrides
        if let Ok(d) = std::env::var("RECIPEBOX_DATA_DIR") {
            data_dir = Some(PathBuf::from(d));
        }
        if let Some(h) = env_parse("RECIPEBOX_CLEANUP_INTERVAL_HOURS") {
            interval_hours = h;
        }
        if let Some(c) = env_parse("RECIPEBOX_REQUIRES_CHARGING") {
            requires_charging = c;
        }
        if let Some(l) = env_parse("RECIPEBOX_LOGGING") {
            logging = l;
        }

        // CLI overrides
        if let Some(d) = &opts.data_dir {
            data_dir = Some(d.clone());
        }
        if let Some(l) = opts.logging {
            logging = l;
        }

        let interval_secs = match interval_hours.checked_mul(60 * 60) {
            Some(secs) if secs > 0 => secs,
            _ => anyhow::bail!("invalid_cleanup_interval"),
        };

        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        Ok(Self {
            database_path: data_dir.join("recipes.db"),
            image_dir: data_dir.join("files"),
            data_dir,
            cleanup: CleanupConfig {
                interval: Duration::from_secs(interval_secs),
                requires_charging,
            },
            logging_enabled: logging,
        })
    }
}

/// Determine the default data directory.
pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("org", "recipebox", "recipebox")
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./recipebox_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "RECIPEBOX_CONFIG",
            "RECIPEBOX_DATA_DIR",
            "RECIPEBOX_CLEANUP_INTERVAL_HOURS",
            "RECIPEBOX_REQUIRES_CHARGING",
            "RECIPEBOX_LOGGING",
        ] {
            std::env::remove_var(key);
        }
    }

    fn opts_with_file(contents: &str) -> (tempfile::TempDir, GlobalOpts) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, contents).unwrap();
        let opts = GlobalOpts {
            config: Some(path),
            ..Default::default()
        };
        (dir, opts)
    }

    #[test]
    #[serial]
    fn missing_keys_defaults() {
        clear_env();
        let (_dir, opts) = opts_with_file("");
        let cfg = Config::load(&opts).unwrap();
        assert_eq!(cfg.cleanup.interval, Duration::from_secs(24 * 3600));
        assert!(cfg.cleanup.requires_charging);
        assert!(cfg.logging_enabled);
        assert_eq!(cfg.data_dir, default_data_dir());
    }

    #[test]
    #[serial]
    fn file_values_used() {
        clear_env();
        let (_dir, opts) = opts_with_file(
            "[storage]\ndata_dir=\"/srv/recipes\"\n[cleanup]\ninterval_hours=6\nrequires_charging=false\n[logging]\nenabled=false\n",
        );
        let cfg = Config::load(&opts).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/srv/recipes"));
        assert_eq!(cfg.database_path, PathBuf::from("/srv/recipes/recipes.db"));
        assert_eq!(cfg.image_dir, PathBuf::from("/srv/recipes/files"));
        assert_eq!(cfg.cleanup.interval, Duration::from_secs(6 * 3600));
        assert!(!cfg.cleanup.requires_charging);
        assert!(!cfg.logging_enabled);
    }

    #[test]
    #[serial]
    fn precedence_cli_env_file() {
        clear_env();
        let (_dir, mut opts) =
            opts_with_file("[storage]\ndata_dir=\"/from/file\"\n[cleanup]\ninterval_hours=6\n");
        std::env::set_var("RECIPEBOX_DATA_DIR", "/from/env");
        std::env::set_var("RECIPEBOX_CLEANUP_INTERVAL_HOURS", "12");
        let cfg = Config::load(&opts).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/from/env"));
        assert_eq!(cfg.cleanup.interval, Duration::from_secs(12 * 3600));

        opts.data_dir = Some(PathBuf::from("/from/cli"));
        let cfg = Config::load(&opts).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/from/cli"));
        clear_env();
    }

    #[test]
    #[serial]
    fn zero_interval_fails() {
        clear_env();
        let (_dir, opts) = opts_with_file("[cleanup]\ninterval_hours=0\n");
        assert!(Config::load(&opts).is_err());
    }

    #[test]
    #[serial]
    fn huge_interval_fails() {
        clear_env();
        let (_dir, opts) = opts_with_file("[cleanup]\ninterval_hours=9223372036854775807\n");
        let err = Config::load(&opts).unwrap_err();
        assert_eq!(err.to_string(), "invalid_cleanup_interval");

        let (_dir, opts) = opts_with_file("");
        std::env::set_var("RECIPEBOX_CLEANUP_INTERVAL_HOURS", "18446744073709551615");
        let res = Config::load(&opts);
        clear_env();
        assert!(res.is_err());
    }

    #[test]
    #[serial]
    fn malformed_file_fails() {
        clear_env();
        let (_dir, opts) = opts_with_file("[cleanup\n");
        assert!(Config::load(&opts).is_err());
    }

    #[test]
    #[serial]
    fn missing_file_is_fine() {
        clear_env();
        let opts = GlobalOpts {
            config: Some(PathBuf::from("/nonexistent/recipebox.toml")),
            logging: Some(false),
            ..Default::default()
        };
        let cfg = Config::load(&opts).unwrap();
        assert!(!cfg.logging_enabled);
    }
}
