use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DEV_JWT_SECRET: &str = "development-only-jwt-secret";
const CRM_ACCOUNTS: [&str; 2] = ["minimal", "hoomy"];

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub auth: AuthConfig,
    pub crm: CrmConfig,
    pub sheets: Option<SheetsConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            auth: AuthConfig::load(environment)?,
            crm: CrmConfig::load()?,
            sheets: SheetsConfig::load(),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn number_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidNumber { key }),
        None => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Admin token signing and the optional bootstrap account.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("admin_email", &self.admin_email)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    fn load(environment: AppEnvironment) -> Result<Self, ConfigError> {
        let jwt_secret = match (non_empty_var("JWT_SECRET"), environment) {
            (Some(secret), _) => secret,
            (None, AppEnvironment::Production) => return Err(ConfigError::MissingJwtSecret),
            (None, _) => DEV_JWT_SECRET.to_string(),
        };

        Ok(Self {
            jwt_secret,
            token_ttl_hours: number_var("JWT_EXPIRES_IN_HOURS", 168)?,
            admin_email: non_empty_var("ADMIN_EMAIL"),
            admin_password: non_empty_var("ADMIN_PASSWORD"),
        })
    }

    /// Bootstrap credentials when both halves are set.
    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        Some((self.admin_email.as_deref()?, self.admin_password.as_deref()?))
    }
}

/// Per-account HubSpot private-app tokens.
#[derive(Clone)]
pub struct CrmAccountConfig {
    pub name: String,
    pub base_url: String,
    pub contacts_token: String,
    pub deals_token: String,
    pub search_token: String,
}

impl fmt::Debug for CrmAccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmAccountConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}

impl CrmAccountConfig {
    fn load(name: &str, base_url: &str) -> Self {
        let token = |kind: &str| {
            non_empty_var(&format!("HUBSPOT_{}_TOKEN_{kind}", name.to_ascii_uppercase()))
                .unwrap_or_default()
        };
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            contacts_token: token("CONTACTS"),
            deals_token: token("DEALS"),
            search_token: token("SEARCH"),
        }
    }

    pub fn is_configured(&self) -> bool {
        !(self.contacts_token.is_empty()
            && self.deals_token.is_empty()
            && self.search_token.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub accounts: Vec<CrmAccountConfig>,
    pub property_cache_ttl: Duration,
}

impl CrmConfig {
    fn load() -> Result<Self, ConfigError> {
        let base_url =
            non_empty_var("HUBSPOT_BASE_URL").unwrap_or_else(|| "https://api.hubapi.com".to_string());
        Ok(Self {
            accounts: CRM_ACCOUNTS
                .iter()
                .map(|name| CrmAccountConfig::load(name, &base_url))
                .collect(),
            property_cache_ttl: Duration::from_secs(number_var(
                "HUBSPOT_PROPERTY_CACHE_TTL_SECS",
                300,
            )?),
        })
    }
}

/// Spreadsheet receiving one row per synced submission.
#[derive(Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub range: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
    pub api_base: String,
}

impl fmt::Debug for SheetsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsConfig")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl SheetsConfig {
    /// `None` unless the sheet id and all OAuth credentials are present.
    fn load() -> Option<Self> {
        Some(Self {
            spreadsheet_id: non_empty_var("GOOGLE_SHEET_ID")?,
            range: non_empty_var("GOOGLE_SHEET_RANGE").unwrap_or_else(|| "Sheet1!A:Z".to_string()),
            client_id: non_empty_var("GOOGLE_CLIENT_ID")?,
            client_secret: non_empty_var("GOOGLE_CLIENT_SECRET")?,
            refresh_token: non_empty_var("GOOGLE_REFRESH_TOKEN")?,
            token_url: non_empty_var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|| "https://oauth2.googleapis.com/token".to_string()),
            api_base: non_empty_var("GOOGLE_SHEETS_API_BASE")
                .unwrap_or_else(|| "https://sheets.googleapis.com".to_string()),
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    MissingJwtSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => write!(f, "{key} must be a whole number"),
            ConfigError::MissingJwtSecret => {
                write!(f, "JWT_SECRET must be set in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::MissingJwtSecret => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    const VARS: [&str; 19] = [
        "APP_ENV",
        "APP_HOST",
        "APP_PORT",
        "APP_LOG_LEVEL",
        "JWT_SECRET",
        "JWT_EXPIRES_IN_HOURS",
        "ADMIN_EMAIL",
        "ADMIN_PASSWORD",
        "HUBSPOT_BASE_URL",
        "HUBSPOT_MINIMAL_TOKEN_CONTACTS",
        "HUBSPOT_MINIMAL_TOKEN_DEALS",
        "HUBSPOT_MINIMAL_TOKEN_SEARCH",
        "HUBSPOT_PROPERTY_CACHE_TTL_SECS",
        "GOOGLE_SHEET_ID",
        "GOOGLE_SHEET_RANGE",
        "GOOGLE_CLIENT_ID",
        "GOOGLE_CLIENT_SECRET",
        "GOOGLE_REFRESH_TOKEN",
        "GOOGLE_TOKEN_URL",
    ];

    fn reset_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.auth.token_ttl_hours, 168);
        assert!(config.auth.bootstrap_admin().is_none());
        assert_eq!(config.crm.property_cache_ttl, Duration::from_secs(300));
        assert!(config.crm.accounts.iter().all(|account| !account.is_configured()));
        assert!(config.sheets.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn production_requires_jwt_secret() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::MissingJwtSecret)
        ));
        env::set_var("JWT_SECRET", "prod-secret");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.auth.jwt_secret, "prod-secret");
        reset_env();
    }

    #[test]
    fn reads_crm_tokens_and_sheet_credentials() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HUBSPOT_MINIMAL_TOKEN_CONTACTS", "pat-contacts");
        env::set_var("HUBSPOT_PROPERTY_CACHE_TTL_SECS", "60");
        env::set_var("GOOGLE_SHEET_ID", "sheet-1");
        env::set_var("GOOGLE_CLIENT_ID", "client");
        env::set_var("GOOGLE_CLIENT_SECRET", "secret");
        env::set_var("GOOGLE_REFRESH_TOKEN", "refresh");

        let config = AppConfig::load().expect("config loads");
        let minimal = &config.crm.accounts[0];
        assert_eq!(minimal.name, "minimal");
        assert!(minimal.is_configured());
        assert!(!config.crm.accounts[1].is_configured());
        assert_eq!(config.crm.property_cache_ttl, Duration::from_secs(60));
        let sheets = config.sheets.expect("sheets configured");
        assert_eq!(sheets.range, "Sheet1!A:Z");
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_ttl() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("JWT_EXPIRES_IN_HOURS", "a week");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                key: "JWT_EXPIRES_IN_HOURS"
            })
        ));
        reset_env();
    }
}
