use crate::errors::DbError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = "plp_bookstore";
pub const DEFAULT_COLLECTION: &str = "books";
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Layered application settings. Unset fields fall through to the next source
/// (CLI > env > config files > defaults).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub data_dir: Option<PathBuf>,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_retention: Option<u32>,
}

impl AppConfig {
    /// Fill every unset field from `lower`.
    pub fn fill_from(&mut self, lower: Self) {
        self.data_dir = self.data_dir.take().or(lower.data_dir);
        self.database = self.database.take().or(lower.database);
        self.collection = self.collection.take().or(lower.collection);
        self.seed_file = self.seed_file.take().or(lower.seed_file);
        self.log_dir = self.log_dir.take().or(lower.log_dir);
        self.log_level = self.log_level.take().or(lower.log_level);
        self.log_retention = self.log_retention.take().or(lower.log_retention);
    }

    /// Settings from `BOOKSTORE_*` variables, read through `var`.
    pub fn from_env_with(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            data_dir: var("BOOKSTORE_DATA_DIR").map(PathBuf::from),
            database: var("BOOKSTORE_DATABASE"),
            collection: var("BOOKSTORE_COLLECTION"),
            seed_file: var("BOOKSTORE_SEED_FILE").map(PathBuf::from),
            log_dir: var("BOOKSTORE_LOG_DIR").map(PathBuf::from),
            log_level: var("BOOKSTORE_LOG_LEVEL"),
            log_retention: var("BOOKSTORE_LOG_RETENTION").and_then(|s| s.parse().ok()),
        }
    }

    /// # Errors
    /// Returns `DbError::Config` if the file is unreadable or not valid TOML for this schema.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DbError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| DbError::Config(format!("{}: {e}", path.display())))
    }

    /// Resolve the full configuration. `cli` holds command-line overrides.
    /// Also returns one warning per discovered config file that was skipped,
    /// for the caller to log once logging is configured.
    ///
    /// # Errors
    /// Fails when an explicitly requested config file (`--config` or
    /// `BOOKSTORE_CONFIG`) cannot be loaded.
    pub fn load(cli: Self, explicit: Option<&Path>) -> Result<(Self, Vec<String>), DbError> {
        Self::resolve(cli, explicit, |k| std::env::var(k).ok(), &discovered_config_paths())
    }

    /// [`AppConfig::load`] with the environment and discovery locations supplied by the caller.
    ///
    /// # Errors
    /// Fails when an explicit config file cannot be loaded.
    pub fn resolve(
        cli: Self,
        explicit: Option<&Path>,
        var: impl Fn(&str) -> Option<String>,
        discovered: &[PathBuf],
    ) -> Result<(Self, Vec<String>), DbError> {
        let mut cfg = cli;
        cfg.fill_from(Self::from_env_with(&var));

        let mut explicit_paths: Vec<PathBuf> = explicit.map(Path::to_path_buf).into_iter().collect();
        explicit_paths.extend(var("BOOKSTORE_CONFIG").map(PathBuf::from));
        for p in &explicit_paths {
            cfg.fill_from(Self::from_file(p)?);
        }
        let mut skipped = Vec::new();
        for p in discovered.iter().filter(|p| p.exists()) {
            match Self::from_file(p) {
                Ok(file_cfg) => cfg.fill_from(file_cfg),
                Err(e) => skipped.push(format!("ignoring config file: {e}")),
            }
        }
        Ok((cfg, skipped))
    }

    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    #[must_use]
    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or(DEFAULT_DATABASE)
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(DEFAULT_COLLECTION)
    }
}

fn discovered_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs_next::config_dir() {
        paths.push(dir.join("bookstore.toml"));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join("bookstore.toml"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.database(), "plp_bookstore");
        assert_eq!(cfg.collection(), "books");
        assert_eq!(cfg.data_dir(), PathBuf::from("./data"));
    }

    #[test]
    fn higher_layers_win() {
        let env: HashMap<&str, &str> =
            [("BOOKSTORE_DATABASE", "env_db"), ("BOOKSTORE_LOG_RETENTION", "3")].into_iter().collect();
        let mut cfg = AppConfig { database: Some("cli_db".into()), ..AppConfig::default() };
        cfg.fill_from(AppConfig::from_env_with(|k| env.get(k).map(ToString::to_string)));
        cfg.fill_from(toml::from_str("collection = \"stock\"\ndatabase = \"file_db\"").unwrap());
        assert_eq!(cfg.database(), "cli_db");
        assert_eq!(cfg.collection(), "stock");
        assert_eq!(cfg.log_retention, Some(3));
    }

    #[test]
    fn from_file_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookstore.toml");
        std::fs::write(&path, "data_dir = \"/tmp/x\"\n").unwrap();
        assert_eq!(AppConfig::from_file(&path).unwrap().data_dir, Some(PathBuf::from("/tmp/x")));
        std::fs::write(&path, "db_path = 1\n").unwrap();
        assert!(matches!(AppConfig::from_file(&path), Err(DbError::Config(_))));
    }

    #[test]
    fn broken_discovered_file_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        let good = dir.path().join("bookstore.toml");
        std::fs::write(&broken, "database = [").unwrap();
        std::fs::write(&good, "collection = \"stock\"\n").unwrap();
        let env = |k: &str| (k == "BOOKSTORE_DATABASE").then(|| "env_db".to_string());
        let (cfg, skipped) =
            AppConfig::resolve(AppConfig::default(), None, env, &[broken, good, dir.path().join("absent.toml")]).unwrap();
        assert_eq!(cfg.database(), "env_db");
        assert_eq!(cfg.collection(), "stock");
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].contains("broken.toml"));

        let missing = dir.path().join("missing.toml");
        assert!(AppConfig::resolve(AppConfig::default(), Some(&missing), |_| None, &[]).is_err());
    }
}
