use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Yaml},
};
use mailbridge_types::{BridgeError, IdentityProvider};
use serde::{Deserialize, Serialize};

/// Mail backend (identity exchange, emails, newsletters, dashboard, campaigns).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the mail backend, e.g. `https://mailapi.example.com`.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Auxiliary services reached through the same request wrapper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL serving `/api/ai/*`.
    #[serde(default)]
    pub ai_url: Option<String>,
    /// Base URL serving `/api/emails/send`.
    #[serde(default)]
    pub mail_url: Option<String>,
}

fn default_google_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}
fn default_google_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}
fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_google_userinfo_url() -> String {
    "https://openidconnect.googleapis.com/v1/userinfo".to_string()
}
fn default_google_revoke_url() -> String {
    "https://oauth2.googleapis.com/revoke".to_string()
}

/// Google OAuth application and endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Calendar REST root (`.../calendar/v3`).
    #[serde(default = "default_google_api_base")]
    pub api_base: String,
    #[serde(default = "default_google_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_google_token_url")]
    pub token_url: String,
    #[serde(default = "default_google_userinfo_url")]
    pub userinfo_url: String,
    #[serde(default = "default_google_revoke_url")]
    pub revoke_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base: default_google_api_base(),
            auth_url: default_google_auth_url(),
            token_url: default_google_token_url(),
            userinfo_url: default_google_userinfo_url(),
            revoke_url: default_google_revoke_url(),
        }
    }
}

fn default_identity_provider() -> IdentityProvider {
    IdentityProvider::Clerk
}
fn default_clerk_api_base() -> String {
    "https://api.clerk.com".to_string()
}

/// Which upstream identity system signs users in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// `clerk` or `google` (defaults to `clerk`).
    #[serde(default = "default_identity_provider")]
    pub provider: IdentityProvider,
    /// Clerk backend API secret (`sk_...`). Required when `provider: clerk`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clerk_secret_key: Option<String>,
    #[serde(default = "default_clerk_api_base")]
    pub clerk_api_base: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: default_identity_provider(),
            clerk_secret_key: None,
            clerk_api_base: default_clerk_api_base(),
        }
    }
}

/// Where the calendar proxy takes the caller's Google access token from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarTokenSource {
    /// `Authorization: Bearer <google access token>` on each request.
    #[default]
    Header,
    /// A Google grant previously stored for the caller's session.
    Session,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub token_source: CalendarTokenSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_port() -> u16 {
    8020
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen port (defaults to 8020).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    /// Browser origins allowed by CORS.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            backend: BackendConfig::default(),
            services: ServicesConfig::default(),
            google: GoogleConfig::default(),
            auth: AuthConfig::default(),
            calendar: CalendarConfig::default(),
            cors_origins: default_cors_origins(),
            log: LogConfig::default(),
        }
    }
}

/// Environment names used by earlier deployments, mapped onto config keys.
fn legacy_env_key(name: &str) -> Option<&'static str> {
    match name.to_ascii_uppercase().as_str() {
        "BACKEND_URL" | "NEXT_PUBLIC_BACKEND_URL" => Some("backend.base_url"),
        "AI_SERVICE_URL" => Some("services.ai_url"),
        "MAIL_SERVICE_URL" => Some("services.mail_url"),
        "GOOGLE_CLIENT_ID" => Some("google.client_id"),
        "GOOGLE_CLIENT_SECRET" => Some("google.client_secret"),
        "CLERK_SECRET_KEY" => Some("auth.clerk_secret_key"),
        _ => None,
    }
}

/// Layer environment providers on top of `figment`.
///
/// `MAILBRIDGE_<SECTION>__<KEY>` wins over the bare legacy names.
fn with_env(figment: Figment) -> Figment {
    figment
        .merge(Env::raw().filter_map(|key| legacy_env_key(key.as_str()).map(Into::into)))
        .merge(Env::prefixed("MAILBRIDGE_").split("__"))
}

fn required_url<'a>(value: Option<&'a String>, key: &str) -> Result<&'a str, BridgeError> {
    let raw = value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BridgeError::Config(format!("missing required setting `{key}`")))?;
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return Err(BridgeError::Config(format!(
            "`{key}` must be an http(s) URL, got `{raw}`"
        )));
    }
    Ok(raw.trim_end_matches('/'))
}

fn is_blank(value: Option<&String>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from a file path, merged with defaults and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &std::path::Path) -> Result<Self, figment::Error> {
        with_env(Figment::from(Serialized::defaults(Config::default())).merge(Yaml::file(path)))
            .extract()
    }

    /// Loads configuration from defaults and the environment only.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if an environment value has the wrong type.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self, figment::Error> {
        with_env(Figment::from(Serialized::defaults(Config::default()))).extract()
    }

    /// Base URL of the mail backend, without a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if unset or not an http(s) URL.
    pub fn backend_url(&self) -> Result<&str, BridgeError> {
        required_url(self.backend.base_url.as_ref(), "backend.base_url")
    }

    /// Base URL of the AI service.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if unset or not an http(s) URL.
    pub fn ai_url(&self) -> Result<&str, BridgeError> {
        required_url(self.services.ai_url.as_ref(), "services.ai_url")
    }

    /// Base URL of the mail-sending service.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if unset or not an http(s) URL.
    pub fn mail_url(&self) -> Result<&str, BridgeError> {
        required_url(self.services.mail_url.as_ref(), "services.mail_url")
    }

    /// Google OAuth client id and secret.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if either is unset.
    pub fn google_client(&self) -> Result<(&str, &str), BridgeError> {
        match (&self.google.client_id, &self.google.client_secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Ok((id.trim(), secret.trim()))
            }
            _ => Err(BridgeError::Config(
                "missing required setting `google.client_id` / `google.client_secret`".into(),
            )),
        }
    }

    /// Every setting `serve` needs that is absent, by config key.
    #[must_use]
    pub fn missing_for_serve(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(self.backend.base_url.as_ref()) {
            missing.push("backend.base_url");
        }
        if is_blank(self.services.ai_url.as_ref()) {
            missing.push("services.ai_url");
        }
        if is_blank(self.services.mail_url.as_ref()) {
            missing.push("services.mail_url");
        }
        if is_blank(self.google.client_id.as_ref()) {
            missing.push("google.client_id");
        }
        if is_blank(self.google.client_secret.as_ref()) {
            missing.push("google.client_secret");
        }
        if self.auth.provider == IdentityProvider::Clerk
            && is_blank(self.auth.clerk_secret_key.as_ref())
        {
            missing.push("auth.clerk_secret_key");
        }
        missing
    }

    /// Checks that the proxy can reach every collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] naming all missing settings, or the
    /// first malformed URL.
    pub fn validate_for_serve(&self) -> Result<(), BridgeError> {
        let missing = self.missing_for_serve();
        if !missing.is_empty() {
            return Err(BridgeError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        self.backend_url()?;
        self.ai_url()?;
        self.mail_url()?;
        Ok(())
    }
}
