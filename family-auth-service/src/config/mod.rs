use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreConfig,
    pub families: FamilyConfig,
    pub session: SessionConfig,
    pub google: GoogleOAuthConfig,
    pub smtp: SmtpConfig,
    pub verification: VerificationConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct FamilyConfig {
    /// Closed set of family identifiers, e.g. `bull,north,klingenberg,herrman`.
    pub names: Vec<String>,
    /// Static archive host; each family lives at `{site_base_url}/{family}`.
    pub site_base_url: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: SecretString,
    /// Parent domain shared by the archive sites, e.g. `.futurelink.zip`.
    pub cookie_domain: Option<String>,
    pub ttl_hours: i64,
    pub pending_ttl_minutes: i64,
    pub issuer: String,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    /// The one canonical callback URL registered with Google.
    pub redirect_uri: String,
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub timeout_seconds: u64,
    pub state_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_email: String,
    pub from_name: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub code_ttl_minutes: i64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub admin_api_key: SecretString,
    pub admin_session_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwaggerMode {
    Public,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub oauth_start_attempts: u32,
    pub oauth_start_window_seconds: u64,
    pub verify_attempts: u32,
    pub verify_window_seconds: u64,
    pub admin_attempts: u32,
    pub admin_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub token_retention_minutes: i64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let backend: StoreBackend = get_env("STORE_BACKEND", Some("postgres"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let database = match backend {
            StoreBackend::Postgres => Some(DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
                acquire_timeout_seconds: parse_env("DATABASE_ACQUIRE_TIMEOUT_SECONDS", "10", is_prod)?,
            }),
            StoreBackend::Memory => None,
        };

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("family-auth-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: optional_env("OTEL_EXPORTER_OTLP_ENDPOINT"),
            store: StoreConfig { backend, database },
            families: FamilyConfig {
                names: split_list(&get_env(
                    "FAMILY_NAMES",
                    Some("bull,north,klingenberg,herrman"),
                    false,
                )?),
                site_base_url: get_env(
                    "FAMILY_SITE_BASE_URL",
                    Some("http://localhost:3000"),
                    is_prod,
                )?,
            },
            session: SessionConfig {
                secret: SecretString::new(get_env("SESSION_SECRET", None, is_prod)?),
                cookie_domain: if is_prod {
                    Some(get_env("SESSION_COOKIE_DOMAIN", None, true)?)
                } else {
                    optional_env("SESSION_COOKIE_DOMAIN")
                },
                ttl_hours: parse_env("SESSION_TTL_HOURS", "24", false)?,
                pending_ttl_minutes: parse_env("PENDING_VERIFICATION_TTL_MINUTES", "30", false)?,
                issuer: get_env("SESSION_ISSUER", Some("family-genealogy-platform"), false)?,
            },
            google: GoogleOAuthConfig {
                client_id: get_env("GOOGLE_CLIENT_ID", None, is_prod)?,
                client_secret: SecretString::new(get_env("GOOGLE_CLIENT_SECRET", None, is_prod)?),
                redirect_uri: get_env("GOOGLE_REDIRECT_URI", None, is_prod)?,
                auth_endpoint: get_env(
                    "GOOGLE_AUTH_ENDPOINT",
                    Some("https://accounts.google.com/o/oauth2/v2/auth"),
                    false,
                )?,
                token_endpoint: get_env(
                    "GOOGLE_TOKEN_ENDPOINT",
                    Some("https://oauth2.googleapis.com/token"),
                    false,
                )?,
                timeout_seconds: parse_env("GOOGLE_TIMEOUT_SECONDS", "10", false)?,
                state_ttl_minutes: parse_env("OAUTH_STATE_TTL_MINUTES", "10", false)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), false)?,
                port: parse_env("SMTP_PORT", "587", false)?,
                username: get_env("SMTP_USERNAME", None, is_prod)?,
                password: SecretString::new(get_env("SMTP_PASSWORD", None, is_prod)?),
                from_email: get_env("EMAIL_FROM", None, is_prod)?,
                from_name: get_env("EMAIL_FROM_NAME", Some("Family Archives"), false)?,
                timeout_seconds: parse_env("SMTP_TIMEOUT_SECONDS", "10", false)?,
            },
            verification: VerificationConfig {
                code_ttl_minutes: parse_env("VERIFICATION_CODE_TTL_MINUTES", "30", false)?,
                max_attempts: parse_env("VERIFICATION_MAX_ATTEMPTS", "5", false)?,
            },
            security: SecurityConfig {
                allowed_origins: split_list(&get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?),
                admin_api_key: SecretString::new(get_env("ADMIN_API_KEY", None, true)?),
                admin_session_minutes: parse_env("ADMIN_SESSION_MINUTES", "60", false)?,
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), false)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                oauth_start_attempts: parse_env("RATE_LIMIT_OAUTH_START_ATTEMPTS", "20", false)?,
                oauth_start_window_seconds: parse_env(
                    "RATE_LIMIT_OAUTH_START_WINDOW_SECONDS",
                    "60",
                    false,
                )?,
                verify_attempts: parse_env("RATE_LIMIT_VERIFY_ATTEMPTS", "10", false)?,
                verify_window_seconds: parse_env("RATE_LIMIT_VERIFY_WINDOW_SECONDS", "300", false)?,
                admin_attempts: parse_env("RATE_LIMIT_ADMIN_ATTEMPTS", "5", false)?,
                admin_window_seconds: parse_env("RATE_LIMIT_ADMIN_WINDOW_SECONDS", "900", false)?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", false)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    false,
                )?,
            },
            sweeper: SweeperConfig {
                enabled: parse_env("SWEEPER_ENABLED", "true", false)?,
                interval_seconds: parse_env("SWEEPER_INTERVAL_SECONDS", "300", false)?,
                token_retention_minutes: parse_env("SWEEPER_TOKEN_RETENTION_MINUTES", "60", false)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.session.secret.expose_secret().len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_SECRET must be at least 32 bytes"
            )));
        }

        if self.session.ttl_hours <= 0 || self.session.pending_ttl_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Session lifetimes must be positive"
            )));
        }

        if self.verification.code_ttl_minutes <= 0 || self.verification.max_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "VERIFICATION_CODE_TTL_MINUTES and VERIFICATION_MAX_ATTEMPTS must be positive"
            )));
        }

        if self.google.state_ttl_minutes <= 0 || self.google.timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OAuth state lifetime and provider timeout must be positive"
            )));
        }

        if !self.google.redirect_uri.starts_with("http") {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GOOGLE_REDIRECT_URI must be an absolute URL"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.store.backend == StoreBackend::Memory {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "STORE_BACKEND=memory is not allowed in production"
                )));
            }

            // Family sites are sibling subdomains; host-only cookies would not reach them.
            if self
                .session
                .cookie_domain
                .as_deref()
                .map_or(true, |d| d.trim().trim_start_matches('.').is_empty())
            {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "SESSION_COOKIE_DOMAIN is required in production"
                )));
            }

            if !self.google.redirect_uri.starts_with("https://") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "GOOGLE_REDIRECT_URI must use https in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::warn!("Swagger UI is publicly accessible in production");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), is_prod)?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

impl FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
