use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use super::error::{ConfigError, Result};

/// Raw connection record as it appears in a JSON file.
///
/// Every field is optional so that a missing or out-of-range value is
/// reported as a [`ConfigError`] by [`ConnectionConfig::try_from`] instead of
/// as an opaque parse failure. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConfigRecord {
    /// Parse a record from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a record from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        let record = Self::from_json_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded connection config");
        Ok(record)
    }
}

/// Validated, immutable connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    user: String,
    password: String,
}

impl ConnectionConfig {
    /// Build a config from explicit values.
    ///
    /// The host must be non-empty and the port non-zero. User and password
    /// are passed to the server as given.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let host = host.into().trim().to_string();
        let user = user.into();

        if host.is_empty() {
            return Err(ConfigError::Validation("host cannot be empty".to_string()));
        }
        if port == 0 {
            return Err(ConfigError::Validation(
                "port must be between 1 and 65535, got 0".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            user,
            password: password.into(),
        })
    }

    /// Parse and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::try_from(ConfigRecord::from_json_file(path)?)
    }

    /// Parse and validate JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::try_from(ConfigRecord::from_json_str(text)?)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// `user@host`, for display and log fields only.
    pub fn user_host(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Convert back into a raw record, e.g. to write a config file.
    pub fn to_record(&self) -> ConfigRecord {
        ConfigRecord {
            host: Some(self.host.clone()),
            port: Some(i64::from(self.port)),
            user: Some(self.user.clone()),
            password: Some(self.password.clone()),
        }
    }
}

impl TryFrom<ConfigRecord> for ConnectionConfig {
    type Error = ConfigError;

    fn try_from(record: ConfigRecord) -> Result<Self> {
        let host = record.host.ok_or(ConfigError::MissingField("host"))?;
        let port = record.port.ok_or(ConfigError::MissingField("port"))?;
        let user = record.user.ok_or(ConfigError::MissingField("user"))?;

        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                ConfigError::Validation(format!("port must be between 1 and 65535, got {port}"))
            })?;

        Self::new(host, port, user, record.password.unwrap_or_default())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_credentials_build_config() {
        let config = ConnectionConfig::new("test.local", 22, "alice", "secret").unwrap();
        assert_eq!(config.host(), "test.local");
        assert_eq!(config.port(), 22);
        assert_eq!(config.user(), "alice");
        assert_eq!(config.password(), "secret");
        assert_eq!(config.user_host(), "alice@test.local");
        assert_eq!(config.to_string(), "alice@test.local:22");
    }

    #[test]
    fn empty_password_is_allowed() {
        let config = ConnectionConfig::new("host", 2222, "bob", "").unwrap();
        assert_eq!(config.password(), "");
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = ConnectionConfig::new("   ", 22, "alice", "x").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("host")));
    }

    #[test]
    fn zero_port_is_rejected() {
        let err = ConnectionConfig::new("host", 0, "alice", "x").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("port")));
    }

    #[test]
    fn empty_user_is_passed_through() {
        let config = ConnectionConfig::new("host", 22, "", "x").unwrap();
        assert_eq!(config.user(), "");

        let config =
            ConnectionConfig::from_json_str(r#"{"host": "h", "port": 22, "user": ""}"#).unwrap();
        assert_eq!(config.user(), "");
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = ConnectionConfig::new("host", 22, "alice", "hunter2").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn record_with_all_fields_converts() {
        let config = ConnectionConfig::from_json_str(
            r#"{"host": "10.0.0.5", "port": 2200, "user": "deploy", "password": "pw"}"#,
        )
        .unwrap();
        assert_eq!(config.host(), "10.0.0.5");
        assert_eq!(config.port(), 2200);
        assert_eq!(config.user(), "deploy");
        assert_eq!(config.password(), "pw");
    }

    #[test]
    fn record_without_password_defaults_to_empty() {
        let config =
            ConnectionConfig::from_json_str(r#"{"host": "h", "port": 22, "user": "u"}"#).unwrap();
        assert_eq!(config.password(), "");
    }

    #[test]
    fn record_ignores_unknown_fields() {
        let config = ConnectionConfig::from_json_str(
            r#"{"host": "h", "port": 22, "user": "u", "comment": "staging box"}"#,
        )
        .unwrap();
        assert_eq!(config.host(), "h");
    }

    #[test]
    fn record_missing_host_is_reported() {
        let err = ConnectionConfig::from_json_str(r#"{"port": 22, "user": "u"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("host")));
    }

    #[test]
    fn record_missing_port_is_reported() {
        let err = ConnectionConfig::from_json_str(r#"{"host": "h", "user": "u"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("port")));
    }

    #[test]
    fn record_port_out_of_range_is_rejected() {
        for port in ["0", "-1", "65536", "100000"] {
            let json = format!(r#"{{"host": "h", "port": {port}, "user": "u"}}"#);
            let err = ConnectionConfig::from_json_str(&json).unwrap_err();
            assert!(
                matches!(err, ConfigError::Validation(ref m) if m.contains("port")),
                "port {port} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = ConnectionConfig::from_json_str("{ host: ").unwrap_err();
        assert!(matches!(err, ConfigError::JsonParse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.json");
        let err = ConnectionConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(ref p, _) if p == &path));
    }

    #[test]
    fn config_written_as_record_loads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ssh.json");
        let config = ConnectionConfig::new("example.com", 22, "root", "pw").unwrap();
        fs::write(&path, serde_json::to_string_pretty(&config.to_record()).unwrap()).unwrap();

        let loaded = ConnectionConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
