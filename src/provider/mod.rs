pub mod access_token;
pub mod authorization;
pub mod discovery;
pub mod error;
pub mod registration;
pub mod revocation;
pub mod rotation;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use tracing::{event, Level};
use url::Url;

use crate::auth::{ClientCredentials, Store};
use crate::capability::{profile::ProfileCapability, CapabilityRegistry};
use crate::config::Config;
use crate::core::models::{AppRotation, Client, SweepReport, UpstreamApp};
use crate::core::types::unix_now;
use crate::db::DbStore;
use crate::http::server::Server;
use crate::upstream::UpstreamClient;
use crate::util::{crypto::Encrypter, hash::HashingService};

use self::error::Error;

/// Lifetimes and policy knobs of the broker.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub public_url: Url,
    pub access_token_ttl: i64,
    pub refresh_token_ttl: i64,
    pub authorization_code_ttl: i64,
    pub upstream_refresh_margin: i64,
    pub allowed_domains: Vec<String>,
    pub stale_client_after: i64,
}

impl BrokerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            public_url: config.public_url.clone(),
            access_token_ttl: config.access_token_ttl(),
            refresh_token_ttl: config.refresh_token_ttl_secs.max(1),
            authorization_code_ttl: config.authorization_code_ttl_secs.max(1),
            upstream_refresh_margin: config.upstream_refresh_margin_secs.max(0),
            allowed_domains: config.allowed_domains(),
            stale_client_after: config.stale_client_hours.max(1) * 3600,
        }
    }

    /// Whether `email` may complete a login. An empty allow-list admits everyone.
    pub fn is_email_allowed(&self, email: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_ascii_lowercase())
            .is_some_and(|domain| self.allowed_domains.iter().any(|d| *d == domain))
    }
}

/// Orchestrates registration, the authorization-code grant, refresh,
/// validation and revocation over the store and the upstream.
#[derive(Debug)]
pub struct TokenBroker {
    store: DbStore,
    hasher: HashingService,
    sealer: Encrypter,
    upstream: UpstreamClient,
    settings: BrokerSettings,
}

impl TokenBroker {
    pub fn new(
        store: DbStore,
        sealer: Encrypter,
        upstream: UpstreamClient,
        settings: BrokerSettings,
    ) -> Self {
        Self {
            store,
            hasher: HashingService::new(),
            sealer,
            upstream,
            settings,
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn store(&self) -> &DbStore {
        &self.store
    }

    fn upstream_app(&self) -> Result<UpstreamApp, Error> {
        self.store.get_upstream_app()?.ok_or(Error::NotConfigured)
    }

    fn check_client_authentication(&self, cred: &ClientCredentials) -> Result<Client, Error> {
        let client = self.store.get_client(&cred.client_id)?;

        match client {
            Some(c) if self.hasher.verify_secret(&cred.client_secret, &c.secret) => Ok(c),
            Some(_) => {
                event!(Level::WARN, client_id = %cred.client_id, "Client secret mismatch");
                Err(Error::InvalidClient)
            }
            None => {
                event!(Level::WARN, client_id = %cred.client_id, "Unknown client");
                Err(Error::InvalidClient)
            }
        }
    }

    #[tracing::instrument(skip_all)]
    pub fn sweep(&self) -> Result<SweepReport, Error> {
        let now = unix_now();
        let report = self
            .store
            .sweep(now, now - self.settings.stale_client_after)?;
        if report != SweepReport::default() {
            event!(
                Level::INFO,
                expired_tokens = report.expired_tokens,
                removed_clients = report.removed_clients,
                "Swept token ledger"
            );
        }
        Ok(report)
    }

    async fn start_sweep_worker(&self, period: Duration) {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;
            if let Err(e) = self.sweep() {
                event!(Level::ERROR, error = %e, "Sweep failed");
            }
        }
    }
}

async fn dcr_brokerd(config: Config) -> Result<(), Error> {
    let sealer = Encrypter::new(&config.encryption_key);
    let store = DbStore::acquire(&config.database_url, sealer.clone())?;
    store.migrate()?;

    let upstream = UpstreamClient::new(config.upstream.settings())?;
    let provider = Arc::new(TokenBroker::new(
        store,
        sealer,
        upstream,
        BrokerSettings::from_config(&config),
    ));

    let app = config.upstream.app_config(&config.public_url);
    match provider.rotate_upstream_app(&app)? {
        AppRotation::Created => event!(Level::INFO, application_id = %app.application_id, "Stored upstream application"),
        AppRotation::Unchanged => event!(Level::DEBUG, "Upstream application unchanged"),
        AppRotation::Rotated { .. } => {}
    }

    let _sweep = {
        let provider = Arc::clone(&provider);
        let period = Duration::from_secs(config.sweep_interval_secs.max(1));
        tokio::spawn(async move { provider.start_sweep_worker(period).await })
    };

    let mut registry = CapabilityRegistry::new(Arc::clone(&provider));
    registry.register(Arc::new(ProfileCapability));

    event!(Level::INFO, address = %config.bind_address, public_url = %config.public_url, "Starting broker");
    let server = Server::new(provider, Arc::new(registry));
    server.serve(config.bind_address).await;
    Ok(())
}

pub async fn main() -> Result<(), Error> {
    use clap::Parser;
    use tracing_subscriber::EnvFilter;

    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    dcr_brokerd(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(domains: &[&str]) -> BrokerSettings {
        BrokerSettings {
            public_url: Url::parse("http://localhost:8001").unwrap(),
            access_token_ttl: 3600,
            refresh_token_ttl: 3600,
            authorization_code_ttl: 600,
            upstream_refresh_margin: 300,
            allowed_domains: domains.iter().map(|d| d.to_string()).collect(),
            stale_client_after: 3600,
        }
    }

    #[test]
    fn empty_allow_list_admits_everyone() {
        assert!(settings(&[]).is_email_allowed("anyone@anywhere.example"));
    }

    #[test]
    fn allow_list_matches_domain_case_insensitively() {
        let s = settings(&["contoso.com"]);
        assert!(s.is_email_allowed("Alice@Contoso.COM"));
        assert!(!s.is_email_allowed("mallory@contoso.com.evil.example"));
        assert!(!s.is_email_allowed("no-at-sign"));
    }
}
