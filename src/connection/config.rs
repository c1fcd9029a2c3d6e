use crate::core::Version;
use serde::{Deserialize, Serialize};

/// Administrative account every sandbox is created with.
pub const SANDBOX_USER: &str = "root";
pub const SANDBOX_PASSWORD: &str = "msandbox";
pub const SANDBOX_DATABASE: &str = "test";
pub const SANDBOX_HOST: &str = "127.0.0.1";

/// Connection parameters handed to verification actions
///
/// Similar to a MySQL DSN; the port is always derived from the version
/// of the instance currently running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,
}

impl ConnectionParams {
    /// Parameters for the sandbox running `version`, using the default
    /// sandbox credentials.
    pub fn for_version(version: &Version) -> Self {
        Self {
            host: SANDBOX_HOST.to_string(),
            port: version.port(),
            database: SANDBOX_DATABASE.to_string(),
            username: SANDBOX_USER.to_string(),
            password: SANDBOX_PASSWORD.to_string(),
        }
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    /// Set the host
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the credentials
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.username,
            "***", // Don't expose password
            self.host,
            self.port,
            self.database
        )
    }
}

/// Credentials and target database shared by every instance in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Credentials {
    /// Resolve the parameters for the instance running `version`.
    pub fn params_for(&self, version: &Version) -> ConnectionParams {
        ConnectionParams::for_version(version)
            .host(&self.host)
            .credentials(&self.username, &self.password)
            .database(&self.database)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }

        if self.username.is_empty() {
            return Err("Username cannot be empty".to_string());
        }

        if self.database.is_empty() {
            return Err("Database cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            host: SANDBOX_HOST.to_string(),
            username: SANDBOX_USER.to_string(),
            password: SANDBOX_PASSWORD.to_string(),
            database: SANDBOX_DATABASE.to_string(),
        }
    }
}
