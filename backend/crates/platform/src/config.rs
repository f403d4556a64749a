//! Runtime Configuration
//!
//! Values come from command-line flags or from a JSON file whose keys match
//! the historical `config.json` layout (`DatabaseType`, `HTTPPort`, ...).

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use kernel::error::app_error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Supported persistence backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// Process-local store, contents are lost on exit
    None = 0,
    MySql = 1,
}

impl TryFrom<i64> for DatabaseType {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DatabaseType::None),
            1 => Ok(DatabaseType::MySql),
            other => Err(AppError::config(format!("Unknown database type {}", other))
                .with_action("Use 0 (None) or 1 (MySQL)")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Configuration {
    pub database_type: i64,
    pub database_host: String,
    pub database_port: u16,
    pub database_schema: String,
    pub database_user: String,
    pub database_password: String,
    /// 0-9, lower numbers display more messages
    pub debug_level: u8,
    #[serde(rename = "HTTPHost")]
    pub http_host: String,
    #[serde(rename = "HTTPPort")]
    pub http_port: u16,
    pub session_directory: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            database_type: DatabaseType::MySql as i64,
            database_host: String::new(),
            database_port: 3306,
            database_schema: String::new(),
            database_user: String::new(),
            database_password: String::new(),
            debug_level: 3,
            http_host: "0.0.0.0".to_string(),
            http_port: 5000,
            session_directory: PathBuf::from("sessions"),
        }
    }
}

impl Configuration {
    /// Parse a JSON configuration file
    pub fn from_json_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read config file {}", path.display()))
                .with_source(e)
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Validated database backend
    pub fn database_type(&self) -> AppResult<DatabaseType> {
        DatabaseType::try_from(self.database_type)
    }

    /// Socket address for the HTTP listener
    pub fn bind_address(&self) -> AppResult<SocketAddr> {
        let ip: IpAddr = self.http_host.parse().map_err(|e| {
            AppError::config(format!("Invalid HTTP host {:?}", self.http_host)).with_source(e)
        })?;
        Ok(SocketAddr::new(ip, self.http_port))
    }

    /// `tracing` level directive for the configured debug level
    pub fn log_level(&self) -> &'static str {
        match self.debug_level {
            0 => "trace",
            1 => "debug",
            2 => "info",
            3 => "warn",
            _ => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::error::kind::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_database_type_values() {
        assert_eq!(DatabaseType::try_from(0).unwrap(), DatabaseType::None);
        assert_eq!(DatabaseType::try_from(1).unwrap(), DatabaseType::MySql);

        let err = DatabaseType::try_from(7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "DatabaseType": 1,
                "DatabaseHost": "db.local",
                "DatabasePort": 3307,
                "DatabaseSchema": "eveauth",
                "DatabaseUser": "eveauth",
                "DatabasePassword": "secret",
                "DebugLevel": 2,
                "HTTPHost": "127.0.0.1",
                "HTTPPort": 8080
            }}"#
        )
        .unwrap();

        let config = Configuration::from_json_file(file.path()).unwrap();
        assert_eq!(config.database_host, "db.local");
        assert_eq!(config.database_port, 3307);
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.bind_address().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.session_directory, PathBuf::from("sessions"));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = Configuration::from_json_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Configuration::from_json_file(Path::new("/nonexistent/config.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_unknown_database_type_in_config() {
        let config = Configuration {
            database_type: 9,
            ..Default::default()
        };
        assert_eq!(config.database_type().unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_debug_level_mapping() {
        let mut config = Configuration::default();
        assert_eq!(config.log_level(), "warn");
        config.debug_level = 0;
        assert_eq!(config.log_level(), "trace");
        config.debug_level = 9;
        assert_eq!(config.log_level(), "error");
    }
}
