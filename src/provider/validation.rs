use tracing::{event, Level};

use crate::auth::Store;
use crate::core::models::{SubjectContext, UpstreamUser};
use crate::core::types::{unix_now, BearerToken, TokenStatus, TokenType};

use super::error::{Error, Rejection};
use super::TokenBroker;

impl TokenBroker {
    /// Resolves a bearer token to its subject and a live upstream access token.
    ///
    /// The subject is taken from the ledger row of the presented token only, so a
    /// caller can never reach another subject's upstream session.
    #[tracing::instrument(skip_all)]
    pub async fn validate(&self, token: &BearerToken) -> Result<SubjectContext, Error> {
        let hash = self.hasher.hash_without_salt(token);

        let record = match self.store.get_token(&hash)? {
            Some(record) if record.token_type == TokenType::Bearer => record,
            _ => return Err(Error::Rejected(Rejection::Unknown)),
        };

        match record.status {
            TokenStatus::Active => {}
            TokenStatus::Expired => return Err(Error::Rejected(Rejection::Expired)),
            TokenStatus::Revoked => return Err(Error::Rejected(Rejection::Revoked)),
        }

        if record.is_expired_at(unix_now()) {
            self.store
                .transition_token(&hash, TokenStatus::Active, TokenStatus::Expired)?;
            event!(Level::DEBUG, client_id = %record.client_id, "Bearer token expired");
            return Err(Error::Rejected(Rejection::Expired));
        }

        let subject = record
            .subject_id
            .ok_or(Error::Rejected(Rejection::Unassigned))?;
        let user = self
            .store
            .get_upstream_user(&subject)?
            .ok_or(Error::Rejected(Rejection::UnknownSubject))?;
        let user = self.ensure_fresh_upstream(user).await?;

        Ok(SubjectContext {
            subject_id: user.subject_id,
            client_id: record.client_id,
            email: user.email,
            display_name: user.display_name,
            upstream_access_token: user.access_token,
        })
    }

    /// Renews the user's upstream access token when it is inside the refresh margin.
    pub(crate) async fn ensure_fresh_upstream(&self, user: UpstreamUser) -> Result<UpstreamUser, Error> {
        let now = unix_now();
        if user.expires_at - self.settings.upstream_refresh_margin > now {
            return Ok(user);
        }

        let refresh_token = user.refresh_token.clone().ok_or_else(|| {
            Error::UpstreamAuthFailed("upstream session has no refresh token".to_string())
        })?;

        let app = self.upstream_app()?;
        let tokens = self
            .upstream
            .refresh(&app, &refresh_token, &user.scope)
            .await
            .inspect_err(|e| {
                event!(Level::WARN, subject_id = %user.subject_id, error = %e, "Upstream refresh failed");
            })?;

        let renewed = UpstreamUser {
            application_id: app.config.application_id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.or(Some(refresh_token)),
            expires_at: tokens.expires_at,
            scope: tokens.scope.unwrap_or(user.scope),
            updated_at: now,
            ..user
        };
        self.store.upsert_upstream_user(&renewed)?;

        event!(Level::DEBUG, subject_id = %renewed.subject_id, "Renewed upstream session");
        Ok(renewed)
    }
}
