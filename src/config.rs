use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::core::models::UpstreamAppConfig;
use crate::upstream::UpstreamSettings;
use crate::util::crypto::EncryptionKey;

const DEFAULT_ACCESS_TOKEN_TTL: i64 = 3600;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "dcr-brokerd",
    version = env!("CARGO_PKG_VERSION"),
    about = "Dynamic Client Registration broker"
)]
pub struct Config {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
    #[arg(long, env = "BIND_ADDRESS", default_value = "127.0.0.1:8001")]
    pub bind_address: SocketAddr,
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8001")]
    pub public_url: Url,
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: EncryptionKey,

    #[command(flatten)]
    pub upstream: UpstreamOptions,

    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value_t = DEFAULT_ACCESS_TOKEN_TTL)]
    pub access_token_ttl_secs: i64,
    #[arg(long, env = "REFRESH_TOKEN_TTL_SECS", default_value_t = 30 * 24 * 3600)]
    pub refresh_token_ttl_secs: i64,
    #[arg(long, env = "AUTHORIZATION_CODE_TTL_SECS", default_value_t = 600)]
    pub authorization_code_ttl_secs: i64,
    #[arg(long, env = "UPSTREAM_REFRESH_MARGIN_SECS", default_value_t = 300)]
    pub upstream_refresh_margin_secs: i64,
    /// Comma separated email domains allowed to log in. Empty allows everyone.
    #[arg(long, env = "ALLOWED_DOMAINS", value_delimiter = ',', default_value = "")]
    pub allowed_domains: Vec<String>,
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 300)]
    pub sweep_interval_secs: u64,
    #[arg(long, env = "STALE_CLIENT_HOURS", default_value_t = 24)]
    pub stale_client_hours: i64,
}

#[derive(Debug, Clone, clap::Args)]
pub struct UpstreamOptions {
    #[arg(long = "upstream-client-id", env = "UPSTREAM_CLIENT_ID")]
    pub client_id: String,
    #[arg(long = "upstream-client-secret", env = "UPSTREAM_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,
    #[arg(long = "upstream-tenant-id", env = "UPSTREAM_TENANT_ID", default_value = "common")]
    pub tenant_id: String,
    /// Defaults to `{PUBLIC_URL}/oauth/callback`.
    #[arg(long = "upstream-redirect-uri", env = "UPSTREAM_REDIRECT_URI")]
    pub redirect_uri: Option<String>,
    #[arg(
        long = "upstream-authority",
        env = "UPSTREAM_AUTHORITY",
        default_value = "https://login.microsoftonline.com"
    )]
    pub authority: Url,
    #[arg(
        long = "upstream-userinfo-url",
        env = "UPSTREAM_USERINFO_URL",
        default_value = "https://graph.microsoft.com/v1.0/me"
    )]
    pub userinfo_url: Url,
    #[arg(
        long = "upstream-scope",
        env = "UPSTREAM_SCOPE",
        default_value = "offline_access User.Read Mail.Read"
    )]
    pub scope: String,
    #[arg(long = "upstream-timeout-secs", env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

/// `{base}/{path}` without doubling the slash.
pub fn join_url(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl UpstreamOptions {
    pub fn app_config(&self, public_url: &Url) -> UpstreamAppConfig {
        let redirect_uri = self
            .redirect_uri
            .clone()
            .filter(|uri| !uri.trim().is_empty())
            .unwrap_or_else(|| join_url(public_url, "oauth/callback"));

        UpstreamAppConfig {
            application_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            tenant_id: self.tenant_id.clone(),
            redirect_uri,
        }
    }

    pub fn settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            authority: self.authority.clone(),
            userinfo_url: self.userinfo_url.clone(),
            scope: self.scope.clone(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}

impl Config {
    pub fn access_token_ttl(&self) -> i64 {
        if self.access_token_ttl_secs > 0 {
            self.access_token_ttl_secs
        } else {
            DEFAULT_ACCESS_TOKEN_TTL
        }
    }

    pub fn allowed_domains(&self) -> Vec<String> {
        self.allowed_domains
            .iter()
            .map(|d| d.trim().trim_start_matches('@').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect()
    }
}
