//! HTTP client for the single upstream identity provider.
//!
//! Endpoints follow the Microsoft identity platform layout:
//! `{authority}/{tenant}/oauth2/v2.0/{authorize,token}` plus a Graph-style
//! profile endpoint. Every call is bounded by the configured timeout.

use std::time::Duration;

use tracing::{event, Level};
use url::Url;

use crate::core::models::UpstreamApp;
use crate::core::types::{expires_in, SubjectId};
use crate::provider::error::Error;

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub authority: Url,
    pub userinfo_url: Url,
    pub scope: String,
    pub timeout: Duration,
}

/// Tokens granted by the upstream for one user.
#[derive(Clone)]
pub struct UpstreamTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: i64,
    pub scope: Option<String>,
}

impl std::fmt::Debug for UpstreamTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamTokens")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamProfile {
    pub subject_id: SubjectId,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(serde::Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    id: Option<String>,
    mail: Option<String>,
    user_principal_name: Option<String>,
    display_name: Option<String>,
}

impl ProfileResponse {
    fn into_profile(self) -> Option<UpstreamProfile> {
        let subject_id = self.id.filter(|id| !id.is_empty())?;
        let email = self
            .mail
            .filter(|m| !m.is_empty())
            .or(self.user_principal_name)
            .filter(|m| !m.is_empty())?;

        Some(UpstreamProfile {
            subject_id: SubjectId(subject_id),
            email,
            display_name: self.display_name,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    settings: UpstreamSettings,
}

const DEFAULT_EXPIRES_IN: i64 = 3600;

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        Error::UpstreamUnavailable(e.to_string())
    } else {
        Error::UpstreamAuthFailed(e.to_string())
    }
}

impl UpstreamClient {
    pub fn new(settings: UpstreamSettings) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { http, settings })
    }

    pub fn scope(&self) -> &str {
        &self.settings.scope
    }

    fn endpoint(&self, app: &UpstreamApp, leaf: &str) -> Result<Url, Error> {
        let mut url = self.settings.authority.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Http("upstream authority cannot be a base url".to_string()))?
            .pop_if_empty()
            .extend([app.config.tenant_id.as_str(), "oauth2", "v2.0", leaf]);
        Ok(url)
    }

    /// Upstream login URL carrying the sealed pending request as `state`.
    pub fn authorize_url(&self, app: &UpstreamApp, state: &str) -> Result<Url, Error> {
        let mut url = self.endpoint(app, "authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &app.config.application_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &app.config.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.settings.scope)
            .append_pair("state", state);
        Ok(url)
    }

    #[tracing::instrument(skip_all)]
    pub async fn exchange_code(&self, app: &UpstreamApp, code: &str) -> Result<UpstreamTokens, Error> {
        let form = [
            ("client_id", app.config.application_id.as_str()),
            ("client_secret", app.config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", app.config.redirect_uri.as_str()),
            ("scope", self.settings.scope.as_str()),
        ];
        self.token_request(app, &form).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn refresh(
        &self,
        app: &UpstreamApp,
        refresh_token: &str,
        scope: &str,
    ) -> Result<UpstreamTokens, Error> {
        let scope = if scope.trim().is_empty() {
            self.settings.scope.as_str()
        } else {
            scope
        };
        let form = [
            ("client_id", app.config.application_id.as_str()),
            ("client_secret", app.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope),
        ];
        self.token_request(app, &form).await
    }

    async fn token_request(
        &self,
        app: &UpstreamApp,
        form: &[(&str, &str)],
    ) -> Result<UpstreamTokens, Error> {
        let url = self.endpoint(app, "token")?;
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            event!(Level::WARN, %status, "Upstream token endpoint unavailable");
            return Err(Error::UpstreamUnavailable(format!("token endpoint returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            event!(Level::WARN, %status, body = %body, "Upstream rejected token request");
            return Err(Error::UpstreamAuthFailed(format!("token endpoint returned {status}")));
        }

        let body: TokenEndpointResponse = response.json().await.map_err(transport_error)?;
        let lifetime = body
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_EXPIRES_IN);

        Ok(UpstreamTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at: expires_in(lifetime),
            scope: body.scope,
        })
    }

    /// Resolves the stable subject id and email behind an upstream access token.
    #[tracing::instrument(skip_all)]
    pub async fn fetch_profile(&self, access_token: &str) -> Result<UpstreamProfile, Error> {
        let response = self
            .http
            .get(self.settings.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::UpstreamUnavailable(format!("profile endpoint returned {status}")));
        }
        if !status.is_success() {
            return Err(Error::UpstreamAuthFailed(format!("profile endpoint returned {status}")));
        }

        let profile: ProfileResponse = response.json().await.map_err(transport_error)?;
        profile
            .into_profile()
            .ok_or_else(|| Error::UpstreamAuthFailed("profile is missing id or email".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::UpstreamAppConfig;

    fn client(authority: &str) -> UpstreamClient {
        UpstreamClient::new(UpstreamSettings {
            authority: Url::parse(authority).unwrap(),
            userinfo_url: Url::parse("https://graph.microsoft.com/v1.0/me").unwrap(),
            scope: "offline_access User.Read".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn app() -> UpstreamApp {
        UpstreamApp {
            config: UpstreamAppConfig {
                application_id: "app-id".to_string(),
                client_secret: "app-secret".to_string(),
                tenant_id: "contoso".to_string(),
                redirect_uri: "http://localhost:8001/oauth/callback".to_string(),
            },
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn authorize_url_targets_tenant() {
        let url = client("https://login.microsoftonline.com/")
            .authorize_url(&app(), "sealed")
            .unwrap();
        assert_eq!(url.path(), "/contoso/oauth2/v2.0/authorize");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "app-id");
        assert_eq!(pairs["response_mode"], "query");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8001/oauth/callback");
        assert_eq!(pairs["scope"], "offline_access User.Read");
        assert_eq!(pairs["state"], "sealed");
    }

    #[test]
    fn authority_may_carry_a_path() {
        let url = client("http://127.0.0.1:9999/idp")
            .endpoint(&app(), "token")
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9999/idp/contoso/oauth2/v2.0/token");
    }

    #[test]
    fn profile_falls_back_to_principal_name() {
        let profile = ProfileResponse {
            id: Some("u1".into()),
            mail: None,
            user_principal_name: Some("alice@contoso.com".into()),
            display_name: Some("Alice".into()),
        };
        let profile = profile.into_profile().unwrap();
        assert_eq!(profile.email, "alice@contoso.com");

        let anonymous = ProfileResponse {
            id: Some("u1".into()),
            mail: None,
            user_principal_name: None,
            display_name: None,
        };
        assert!(anonymous.into_profile().is_none());
    }
}
