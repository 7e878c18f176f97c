use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

pub const DEFAULT_JWT_SECRET: &str = "dev-secret-key-change-in-production";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub auth: AuthConfig,
    pub uploads: UploadConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Empty when DATABASE_URL is not set; the pool is then unusable but the server still starts.
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub default_page_size: i64,
    pub max_page_size: i64,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
    pub jwt_expiry_hours: u64,
    pub refresh_expiry_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mock_auth_enabled: bool,
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub clerk_secret_key: Option<String>,
    pub clerk_publishable_key: Option<String>,
    pub cognito_user_pool_id: Option<String>,
    pub cognito_client_id: Option<String>,
    pub cognito_client_secret: Option<String>,
    pub aws_region: String,
}

impl AuthConfig {
    pub fn clerk_configured(&self) -> bool {
        self.clerk_secret_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn cognito_configured(&self) -> bool {
        self.cognito_user_pool_id.as_deref().is_some_and(|v| !v.is_empty())
            && self.cognito_client_id.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub upload_dir: String,
    pub max_file_size_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    MissingInProduction(&'static str),

    #[error("JWT_SECRET must be changed from the default value in production")]
    DefaultJwtSecret,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("ENVIRONMENT").or_else(|_| env::var("APP_ENV")).as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("LOG_LEVEL") {
            self.log_level = v.to_lowercase();
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }

        // API overrides
        if let Some(v) = env::var("API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = env::var("JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        // Auth overrides
        if let Ok(v) = env::var("MOCK_AUTH_ENABLED") {
            self.auth.mock_auth_enabled = v.parse().unwrap_or(self.auth.mock_auth_enabled);
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        self.auth.clerk_secret_key = non_empty_var("CLERK_SECRET_KEY").or(self.auth.clerk_secret_key);
        self.auth.clerk_publishable_key = non_empty_var("CLERK_PUBLISHABLE_KEY").or(self.auth.clerk_publishable_key);
        self.auth.cognito_user_pool_id = non_empty_var("COGNITO_USER_POOL_ID").or(self.auth.cognito_user_pool_id);
        self.auth.cognito_client_id = non_empty_var("COGNITO_CLIENT_ID").or(self.auth.cognito_client_id);
        self.auth.cognito_client_secret = non_empty_var("COGNITO_CLIENT_SECRET").or(self.auth.cognito_client_secret);
        if let Ok(v) = env::var("AWS_REGION") {
            self.auth.aws_region = v;
        }

        // Upload overrides
        if let Ok(v) = env::var("UPLOAD_DIR") {
            self.uploads.upload_dir = v;
        }
        if let Ok(v) = env::var("UPLOAD_MAX_FILE_SIZE_BYTES") {
            self.uploads.max_file_size_bytes = v.parse().unwrap_or(self.uploads.max_file_size_bytes);
        }

        self
    }

    /// Refuse to start a production deployment that is missing required settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment != Environment::Production {
            return Ok(());
        }
        if self.database.url.is_empty() {
            return Err(ConfigError::MissingInProduction("DATABASE_URL"));
        }
        if self.auth.jwt_secret.is_empty() || self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            return Err(ConfigError::DefaultJwtSecret);
        }
        if !self.auth.mock_auth_enabled && !self.auth.clerk_configured() && !self.auth.cognito_configured() {
            return Err(ConfigError::MissingInProduction(
                "CLERK_SECRET_KEY, COGNITO_USER_POOL_ID/COGNITO_CLIENT_ID or MOCK_AUTH_ENABLED",
            ));
        }
        Ok(())
    }

    fn base(environment: Environment) -> Self {
        Self {
            environment,
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 10,
                connection_timeout: 30,
                run_migrations: true,
            },
            api: ApiConfig {
                port: 8000,
                default_page_size: 20,
                max_page_size: 100,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                cors_origins: vec![],
                jwt_expiry_hours: 24,
                refresh_expiry_days: 30,
            },
            auth: AuthConfig {
                mock_auth_enabled: false,
                jwt_secret: DEFAULT_JWT_SECRET.to_string(),
                jwt_algorithm: "HS256".to_string(),
                clerk_secret_key: None,
                clerk_publishable_key: None,
                cognito_user_pool_id: None,
                cognito_client_id: None,
                cognito_client_secret: None,
                aws_region: "us-west-2".to_string(),
            },
            uploads: UploadConfig {
                upload_dir: "uploads".to_string(),
                max_file_size_bytes: 100 * 1024 * 1024, // 100MB
            },
            log_level: "info".to_string(),
        }
    }

    fn development() -> Self {
        let mut config = Self::base(Environment::Development);
        config.security.cors_origins = [3000, 3001, 3002, 8080, 8081]
            .iter()
            .map(|port| format!("http://localhost:{}", port))
            .collect();
        config.log_level = "debug".to_string();
        config
    }

    fn staging() -> Self {
        let mut config = Self::base(Environment::Staging);
        config.database.max_connections = 20;
        config.database.connection_timeout = 10;
        config
    }

    fn production() -> Self {
        let mut config = Self::base(Environment::Production);
        config.database.max_connections = 50;
        config.database.connection_timeout = 5;
        config.database.run_migrations = false;
        config.api.max_request_size_bytes = 2 * 1024 * 1024; // 2MB
        config.security.jwt_expiry_hours = 4;
        config
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.api.max_page_size, 100);
        assert!(config.security.cors_origins.contains(&"http://localhost:3000".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.database.run_migrations);
        assert_eq!(config.security.jwt_expiry_hours, 4);
        assert!(config.security.cors_origins.is_empty());
    }

    #[test]
    fn production_requires_database_secret_and_provider() {
        let mut config = AppConfig::production();
        assert!(matches!(config.validate(), Err(ConfigError::MissingInProduction("DATABASE_URL"))));

        config.database.url = "postgres://localhost/nema".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::DefaultJwtSecret)));

        config.auth.jwt_secret = "a-real-secret".to_string();
        assert!(config.validate().is_err());

        config.auth.clerk_secret_key = Some("sk_live_123".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cognito_requires_pool_and_client() {
        let mut auth = AppConfig::development().auth;
        auth.cognito_user_pool_id = Some("us-west-2_abc".to_string());
        assert!(!auth.cognito_configured());
        auth.cognito_client_id = Some("client".to_string());
        assert!(auth.cognito_configured());
    }
}
