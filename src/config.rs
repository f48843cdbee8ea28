//! Configuration: connection settings and runtime options.
//!
//! Loaded from TOML:
//!
//! ```toml
//! [database]
//! host = "127.0.0.1"
//! port = 3306
//! user = "app"
//! password = "secret"
//! name = "shop"
//!
//! [options]
//! level = "debug"     # "run" (quiet) or "debug" (echo statements)
//! autocommit = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{DbError, DbResult};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG: &str = "dbutil.toml";

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DbConfig {
    #[serde(alias = "HOST", default = "default_host")]
    pub host: String,
    #[serde(alias = "PORT", default = "default_port")]
    pub port: u16,
    #[serde(alias = "USER")]
    pub user: String,
    #[serde(alias = "PASSWORD", default)]
    pub password: String,
    #[serde(alias = "NAME")]
    pub name: String,
    #[serde(default = "default_charset")]
    pub charset: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: "root".to_string(),
            password: String::new(),
            name: String::new(),
            charset: default_charset(),
        }
    }
}

/// Run level: `debug` echoes every statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Run,
    Debug,
}

/// Runtime behavior of the driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Options {
    #[serde(default)]
    pub level: Level,
    #[serde(default = "default_true")]
    pub autocommit: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Options {
    fn default() -> Self {
        Self {
            level: Level::Run,
            autocommit: true,
        }
    }
}

impl Options {
    /// Whether statements and params are echoed at info level.
    pub fn echo(&self) -> bool {
        self.level == Level::Debug
    }
}

/// Full configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DbConfig,
    #[serde(default)]
    pub options: Options,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> DbResult<Self> {
        toml::from_str(text).map_err(|e| DbError::Config(e.to_string()))
    }

    /// Read and parse the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DbError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Load `./dbutil.toml`, then the user config file, whichever exists first.
    pub fn discover() -> DbResult<Self> {
        match Self::candidates().into_iter().find(|p| p.exists()) {
            Some(path) => Self::load(path),
            None => Err(DbError::Config(format!(
                "no {} found in the working directory or user config dir",
                LOCAL_CONFIG
            ))),
        }
    }

    fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("dbutil").join("config.toml"));
        }
        paths
    }
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.database.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.database.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.database.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.database.password = password.into();
        self
    }

    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.config.database.name = name.into();
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.config.options.level = level;
        self
    }

    pub fn autocommit(mut self, flag: bool) -> Self {
        self.config.options.autocommit = flag;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lowercase_keys() {
        let config = Config::from_toml(
            r#"
            [database]
            host = "db.internal"
            port = 3307
            user = "app"
            password = "pw"
            name = "shop"

            [options]
            level = "debug"
            autocommit = false
            "#,
        )
        .unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 3307);
        assert_eq!(config.database.charset, "utf8mb4");
        assert!(config.options.echo());
        assert!(!config.options.autocommit);
    }

    #[test]
    fn test_parse_uppercase_aliases() {
        let config = Config::from_toml(
            r#"
            [database]
            HOST = "localhost"
            PORT = 3306
            USER = "root"
            PASSWORD = ""
            NAME = "test"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.name, "test");
        assert_eq!(config.options, Options::default());
    }

    #[test]
    fn test_bad_level() {
        let err = Config::from_toml("[options]\nlevel = \"loud\"\n").unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }

    #[test]
    fn test_builder() {
        let config = Config::builder()
            .host("h")
            .port(1)
            .user("u")
            .database("d")
            .autocommit(false)
            .build();
        assert_eq!(config.database.host, "h");
        assert_eq!(config.database.name, "d");
        assert!(!config.options.autocommit);
        assert!(!config.options.echo());
    }
}
