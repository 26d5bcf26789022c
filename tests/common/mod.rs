#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dcr_broker::auth::pkce::{Transformation, Verifier};
use dcr_broker::auth::{
    AccessTokenResponse, AuthorizationError, AuthorizationRequest, AuthorizationResponse,
    CallbackRequest, ClientCredentials, Redirect, RegistrationRequest, RegistrationResponse,
};
use dcr_broker::core::models::UpstreamAppConfig;
use dcr_broker::core::types::{AuthCode, RedirectUri};
use dcr_broker::db::DbStore;
use dcr_broker::provider::error::Error;
use dcr_broker::provider::{BrokerSettings, TokenBroker};
use dcr_broker::upstream::{UpstreamClient, UpstreamSettings};
use dcr_broker::util::crypto::{EncryptionKey, Encrypter};

pub const TENANT: &str = "contoso";
pub const PLATFORM_CALLBACK: &str = "https://platform.example/callback";
pub const OTHER_PLATFORM_CALLBACK: &str = "https://other-platform.example/oauth/cb";
pub const PLATFORM_STATE: &str = "platform-state";

// RFC 7636 appendix B
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

/// How the mocked upstream answers for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Ok,
    Unavailable,
    Rejected,
}

#[derive(Debug, Clone, Copy)]
pub struct User {
    pub name: &'static str,
    pub email: &'static str,
    pub refresh: Upstream,
    pub profile: Upstream,
}

impl User {
    pub const fn new(name: &'static str, email: &'static str) -> Self {
        Self {
            name,
            email,
            refresh: Upstream::Ok,
            profile: Upstream::Ok,
        }
    }

    pub fn subject(&self) -> String {
        format!("sub-{}", self.name)
    }

    pub fn code(&self) -> String {
        format!("code-{}", self.name)
    }

    pub fn access_token(&self) -> String {
        format!("at-{}", self.name)
    }

    pub fn renewed_access_token(&self) -> String {
        format!("at-{}-renewed", self.name)
    }

    pub fn refresh_token(&self) -> String {
        format!("rt-{}", self.name)
    }
}

pub const ALICE: User = User::new("alice", "alice@contoso.com");
pub const BOB: User = User::new("bob", "bob@contoso.com");
pub const CAROL: User = User {
    refresh: Upstream::Unavailable,
    ..User::new("carol", "carol@contoso.com")
};
pub const DAVE: User = User {
    refresh: Upstream::Rejected,
    ..User::new("dave", "dave@contoso.com")
};
pub const EVE: User = User::new("eve", "eve@fabrikam.example");
pub const FRANK: User = User {
    profile: Upstream::Rejected,
    ..User::new("frank", "frank@contoso.com")
};
pub const GRACE: User = User {
    profile: Upstream::Unavailable,
    ..User::new("grace", "grace@contoso.com")
};

pub const USERS: [User; 7] = [ALICE, BOB, CAROL, DAVE, EVE, FRANK, GRACE];

fn failure(behaviour: Upstream, rejected_status: u16) -> ResponseTemplate {
    match behaviour {
        Upstream::Unavailable => ResponseTemplate::new(503),
        _ => ResponseTemplate::new(rejected_status).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS70000: the grant is expired",
        })),
    }
}

async fn mount_user(server: &MockServer, user: &User) {
    let token_path = format!("/{TENANT}/oauth2/v2.0/token");

    Mock::given(method("POST"))
        .and(path(token_path.as_str()))
        .and(body_string_contains(format!("code={}", user.code())))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": user.access_token(),
            "refresh_token": user.refresh_token(),
            "expires_in": 3600,
            "scope": "offline_access User.Read",
        })))
        .mount(server)
        .await;

    let refreshed = match user.refresh {
        Upstream::Ok => ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": user.renewed_access_token(),
            "expires_in": 3600,
        })),
        other => failure(other, 400),
    };
    Mock::given(method("POST"))
        .and(path(token_path.as_str()))
        .and(body_string_contains(format!("refresh_token={}", user.refresh_token())))
        .respond_with(refreshed)
        .mount(server)
        .await;

    let profile = match user.profile {
        Upstream::Ok => ResponseTemplate::new(200).set_body_json(json!({
            "id": user.subject(),
            "mail": user.email,
            "userPrincipalName": user.email,
            "displayName": user.name,
        })),
        other => failure(other, 401),
    };
    for token in [user.access_token(), user.renewed_access_token()] {
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(profile.clone())
            .mount(server)
            .await;
    }
}

pub fn app_config() -> UpstreamAppConfig {
    UpstreamAppConfig {
        application_id: "broker-app".to_string(),
        client_secret: "broker-app-secret".to_string(),
        tenant_id: TENANT.to_string(),
        redirect_uri: "http://localhost:8001/oauth/callback".to_string(),
    }
}

pub fn default_settings() -> BrokerSettings {
    BrokerSettings {
        public_url: Url::parse("http://localhost:8001").unwrap(),
        access_token_ttl: 3600,
        refresh_token_ttl: 30 * 24 * 3600,
        authorization_code_ttl: 600,
        upstream_refresh_margin: 300,
        allowed_domains: Vec::new(),
        stale_client_after: 24 * 3600,
    }
}

pub struct Harness {
    pub broker: Arc<TokenBroker>,
    pub upstream: MockServer,
    _dir: TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_settings(|_| {}).await
    }

    pub async fn with_settings(tweak: impl FnOnce(&mut BrokerSettings)) -> Self {
        let upstream = MockServer::start().await;
        for user in USERS.iter() {
            mount_user(&upstream, user).await;
        }

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("broker.db");

        let sealer = Encrypter::new(&EncryptionKey::from([7u8; 32]));
        let store = DbStore::acquire(db_path.to_str().unwrap(), sealer.clone()).unwrap();
        store.migrate().unwrap();

        let client = UpstreamClient::new(UpstreamSettings {
            authority: Url::parse(&upstream.uri()).unwrap(),
            userinfo_url: Url::parse(&format!("{}/me", upstream.uri())).unwrap(),
            scope: "offline_access User.Read".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let mut settings = default_settings();
        tweak(&mut settings);

        let broker = Arc::new(TokenBroker::new(store, sealer, client, settings));
        broker.rotate_upstream_app(&app_config()).unwrap();

        Self {
            broker,
            upstream,
            _dir: dir,
        }
    }

    pub async fn register_at(&self, redirect_uri: &str, hint: Option<&str>) -> RegistrationResponse {
        let req = RegistrationRequest {
            client_name: Some("Test Platform".to_string()),
            redirect_uris: vec![redirect_uri.to_string()],
            ..Default::default()
        };
        self.broker
            .register(req, hint.map(str::to_string))
            .await
            .unwrap()
    }

    pub async fn register(&self) -> RegistrationResponse {
        self.register_at(PLATFORM_CALLBACK, None).await
    }

    /// Runs authorize and the upstream round trip, returning the callback outcome.
    pub async fn login(
        &self,
        client: &RegistrationResponse,
        user: &User,
    ) -> Result<Redirect<AuthorizationResponse>, AuthorizationError> {
        let state = self.upstream_state(client).await;
        self.broker
            .callback(CallbackRequest {
                code: Some(user.code()),
                state: Some(state),
                ..Default::default()
            })
            .await
    }

    /// Sealed state the broker hands to the upstream for `client`.
    pub async fn upstream_state(&self, client: &RegistrationResponse) -> String {
        let url = self
            .broker
            .authorize(authorization_request(client))
            .await
            .unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    pub async fn code_for(&self, client: &RegistrationResponse, user: &User) -> AuthCode {
        self.login(client, user).await.unwrap().params.code
    }

    pub async fn exchange(
        &self,
        client: &RegistrationResponse,
        code: AuthCode,
    ) -> Result<AccessTokenResponse, Error> {
        self.broker
            .exchange_token(&credentials(client), code, Verifier::new(VERIFIER), None)
            .await
    }

    /// Registration, login and code exchange for `user` on the default platform.
    pub async fn session(&self, user: &User) -> (RegistrationResponse, AccessTokenResponse) {
        self.session_at(PLATFORM_CALLBACK, user).await
    }

    pub async fn session_at(
        &self,
        redirect_uri: &str,
        user: &User,
    ) -> (RegistrationResponse, AccessTokenResponse) {
        let client = self.register_at(redirect_uri, None).await;
        let code = self.code_for(&client, user).await;
        let tokens = self.exchange(&client, code).await.unwrap();
        (client, tokens)
    }
}

pub fn authorization_request(client: &RegistrationResponse) -> AuthorizationRequest {
    AuthorizationRequest {
        response_type: Some("code".to_string()),
        client_id: client.client_id.clone(),
        redirect_uri: client.redirect_uris[0].clone(),
        scope: None,
        state: Some(PLATFORM_STATE.to_string()),
        code_challenge: Some(CHALLENGE.to_string()),
        code_challenge_method: Some(Transformation::S256),
    }
}

pub fn credentials(client: &RegistrationResponse) -> ClientCredentials {
    ClientCredentials {
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
    }
}

pub fn redirect_uri(uri: &str) -> RedirectUri {
    RedirectUri(uri.to_string())
}
