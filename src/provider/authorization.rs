use tracing::{event, Level};
use url::Url;

use crate::auth::error::{ErrorKind, OAuthError};
use crate::auth::{
    pkce, AuthorizationError, AuthorizationRequest, AuthorizationResponse, CallbackRequest,
    PendingAuthorization, Redirect, Store, WithState,
};
use crate::core::models::{CompletedLogin, TokenMetadata, TokenRecord, UpstreamUser};
use crate::core::types::{unix_now, AuthCode, TokenStatus, TokenType};
use crate::util::random::FromRandom;

use super::error::{Error, ResultExt};
use super::TokenBroker;

impl TokenBroker {
    fn seal_pending(&self, pending: &PendingAuthorization) -> Result<String, Error> {
        let json = serde_json::to_string(pending)?;
        Ok(self.sealer.seal(&json)?)
    }

    fn open_pending(&self, state: &str) -> Option<PendingAuthorization> {
        let json = self.sealer.open(state).ok()?;
        serde_json::from_str(&json).ok()
    }

    /// Validates the platform's request and returns the upstream login URL.
    ///
    /// Nothing is persisted: the pending request travels sealed in the upstream
    /// `state` and only becomes an authorization code after the upstream returns.
    #[tracing::instrument(skip_all, fields(client_id = ?req.client_id))]
    pub async fn authorize(&self, req: AuthorizationRequest) -> Result<Url, Error> {
        if let Some(response_type) = req.response_type.as_deref() {
            if response_type != "code" {
                return Err(Error::InvalidRequest(format!(
                    "unsupported response_type {response_type}"
                )));
            }
        }

        let client = self
            .store
            .get_client(&req.client_id)?
            .ok_or(Error::InvalidClient)?;

        if !client.has_redirect_uri(&req.redirect_uri) {
            event!(Level::WARN, redirect_uri = %req.redirect_uri.0, "Redirect uri not registered for client");
            return Err(Error::InvalidRequest(
                "redirect_uri is not registered for this client".to_string(),
            ));
        }

        let challenge = match req.code_challenge {
            Some(code) if !code.trim().is_empty() => pkce::Challenge {
                code,
                method: req.code_challenge_method.unwrap_or_default(),
            },
            _ => return Err(Error::InvalidRequest("code_challenge is required".to_string())),
        };

        let scope = req
            .scope
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| client.scope.clone());

        let pending = PendingAuthorization {
            client_id: client.id,
            redirect_uri: req.redirect_uri,
            scope,
            state: req.state,
            challenge,
            issued_at: unix_now(),
        };

        let app = self.upstream_app()?;
        let state = self.seal_pending(&pending)?;
        event!(Level::DEBUG, "Redirecting to upstream login");
        self.upstream.authorize_url(&app, &state)
    }

    /// Completes the upstream login: resolves the subject, binds the client to it
    /// and redirects back to the platform with a fresh authorization code.
    #[tracing::instrument(skip_all)]
    pub async fn callback(
        &self,
        req: CallbackRequest,
    ) -> Result<Redirect<AuthorizationResponse>, AuthorizationError> {
        let pending = req
            .state
            .as_deref()
            .and_then(|state| self.open_pending(state))
            .ok_or_else(|| Error::InvalidRequest("unknown or tampered state".to_string()))
            .without_redirect::<WithState<OAuthError>>()?;

        let state = pending.state.clone();
        let uri = pending.redirect_uri.clone();

        self.complete_callback(req, pending)
            .await
            .map_err(|e| {
                event!(Level::WARN, error = %e, "Authorization attempt aborted");
                match e {
                    Error::UpstreamAuthFailed(_) => OAuthError::describe(
                        ErrorKind::AccessDenied,
                        "upstream authentication failed",
                    ),
                    e => OAuthError::from(&e),
                }
            })
            .add_state_context(&state)
            .add_redirect_context(&uri)
    }

    async fn complete_callback(
        &self,
        req: CallbackRequest,
        pending: PendingAuthorization,
    ) -> Result<Redirect<AuthorizationResponse>, Error> {
        if let Some(error) = req.error {
            event!(
                Level::INFO,
                error = %error,
                description = ?req.error_description,
                "Upstream login did not complete"
            );
            return Err(Error::AccessDenied);
        }

        let now = unix_now();
        if pending.issued_at + self.settings.authorization_code_ttl <= now {
            return Err(Error::InvalidRequest("authorization request expired".to_string()));
        }

        let code = req
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::InvalidRequest("missing upstream code".to_string()))?;

        let app = self.upstream_app()?;
        let tokens = self.upstream.exchange_code(&app, &code).await?;
        let profile = self.upstream.fetch_profile(&tokens.access_token).await?;

        if !self.settings.is_email_allowed(&profile.email) {
            event!(Level::WARN, subject_id = %profile.subject_id, "Login from a domain that is not allowed");
            return Err(Error::AccessDenied);
        }

        let user = UpstreamUser {
            subject_id: profile.subject_id.clone(),
            application_id: app.config.application_id.clone(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            scope: tokens
                .scope
                .unwrap_or_else(|| self.upstream.scope().to_string()),
            email: Some(profile.email),
            display_name: profile.display_name,
            created_at: now,
            updated_at: now,
        };

        let code = AuthCode::from_random();
        let record = TokenRecord {
            hash: self.hasher.hash_without_salt(&code),
            client_id: pending.client_id.clone(),
            token_type: TokenType::AuthorizationCode,
            status: TokenStatus::Active,
            subject_id: Some(profile.subject_id.clone()),
            expires_at: now + self.settings.authorization_code_ttl,
            issued_at: now,
            metadata: TokenMetadata {
                redirect_uri: Some(pending.redirect_uri.clone()),
                state: pending.state.clone(),
                scope: Some(pending.scope.clone()),
                pkce: Some(pending.challenge.clone()),
            },
        };

        let effective = self.store.complete_login(&CompletedLogin {
            user,
            client_id: pending.client_id.clone(),
            redirect_uri: pending.redirect_uri.clone(),
            code: record,
        })?;

        event!(
            Level::INFO,
            client_id = %effective,
            subject_id = %profile.subject_id,
            "Issued authorization code"
        );

        Ok(Redirect::new(
            pending.redirect_uri,
            AuthorizationResponse {
                code,
                state: pending.state,
            },
        ))
    }
}

impl From<&Error> for OAuthError {
    fn from(e: &Error) -> Self {
        match e {
            Error::InvalidRequest(d) => OAuthError::describe(ErrorKind::InvalidRequest, d.clone()),
            Error::InvalidRedirectUri(d) => {
                OAuthError::describe(ErrorKind::InvalidRedirectUri, d.clone())
            }
            Error::InvalidClientMetadata(d) => {
                OAuthError::describe(ErrorKind::InvalidClientMetadata, d.clone())
            }
            Error::InvalidClient => ErrorKind::InvalidClient.into(),
            Error::InvalidGrant => ErrorKind::InvalidGrant.into(),
            Error::UnsupportedGrantType => ErrorKind::UnsupportedGrantType.into(),
            Error::InvalidScope => ErrorKind::InvalidScope.into(),
            Error::AccessDenied => ErrorKind::AccessDenied.into(),
            Error::UpstreamUnavailable(_) => OAuthError::describe(
                ErrorKind::TemporarilyUnavailable,
                "upstream identity provider unavailable",
            ),
            Error::UpstreamAuthFailed(_) => OAuthError::describe(
                ErrorKind::InvalidGrant,
                "upstream_reauthentication_required",
            ),
            Error::Rejected(_) => ErrorKind::InvalidToken.into(),
            _ => ErrorKind::ServerError.into(),
        }
    }
}
