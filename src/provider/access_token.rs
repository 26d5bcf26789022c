use tracing::{event, Level};

use crate::auth::pkce;
use crate::auth::{AccessTokenResponse, ClientCredentials, Store, TokenRequest, TokenType};
use crate::core::models::{Client, TokenMetadata, TokenRecord};
use crate::core::types::{
    unix_now, AuthCode, BearerToken, HashedToken, RedirectUri, RefreshToken, Scope, SubjectId,
    TokenStatus, TokenType as LedgerType,
};
use crate::util::random::FromRandom;

use super::error::Error;
use super::TokenBroker;

impl TokenBroker {
    /// Token endpoint entry point.
    #[tracing::instrument(skip_all, fields(client_id = ?credentials.client_id, grant_type = %req.grant_type))]
    pub async fn access_token_request(
        &self,
        credentials: ClientCredentials,
        req: TokenRequest,
    ) -> Result<AccessTokenResponse, Error> {
        match req.grant_type.as_str() {
            "authorization_code" => {
                let code = req
                    .code
                    .ok_or_else(|| Error::InvalidRequest("code is required".to_string()))?;
                let verifier = req.code_verifier.ok_or_else(|| {
                    Error::InvalidRequest("code_verifier is required".to_string())
                })?;
                self.exchange_token(
                    &credentials,
                    AuthCode(code),
                    pkce::Verifier::new(verifier),
                    req.redirect_uri.map(RedirectUri),
                )
                .await
            }
            "refresh_token" => {
                let token = req.refresh_token.ok_or_else(|| {
                    Error::InvalidRequest("refresh_token is required".to_string())
                })?;
                self.refresh(&credentials, RefreshToken(token), req.scope)
                    .await
            }
            _ => Err(Error::UnsupportedGrantType),
        }
    }

    /// Looks up an active, unexpired token of `kind` owned by `client`.
    /// Failures are logged here and surface as an opaque `InvalidGrant`.
    fn presented_token(
        &self,
        hash: &HashedToken,
        kind: LedgerType,
        client: &Client,
    ) -> Result<TokenRecord, Error> {
        let record = match self.store.get_token(hash)? {
            Some(record) if record.token_type == kind => record,
            _ => {
                event!(Level::WARN, kind = kind.as_str(), "Unknown token presented");
                return Err(Error::InvalidGrant);
            }
        };

        if record.client_id != client.id {
            event!(Level::WARN, owner = %record.client_id, "Token presented by another client");
            return Err(Error::InvalidGrant);
        }

        if record.status != TokenStatus::Active {
            event!(Level::WARN, status = record.status.as_str(), "Inactive token presented");
            return Err(Error::InvalidGrant);
        }

        if record.is_expired_at(unix_now()) {
            self.store
                .transition_token(hash, TokenStatus::Active, TokenStatus::Expired)?;
            event!(Level::DEBUG, "Expired token presented");
            return Err(Error::InvalidGrant);
        }

        Ok(record)
    }

    /// Mints a bearer token, plus a refresh token when the client registered that grant.
    fn mint_session(
        &self,
        client: &Client,
        subject: &SubjectId,
        scope: Scope,
    ) -> (AccessTokenResponse, Vec<TokenRecord>) {
        let now = unix_now();
        let metadata = TokenMetadata {
            scope: Some(scope.clone()),
            ..Default::default()
        };

        let access_token = BearerToken::from_random();
        let mut records = vec![TokenRecord {
            hash: self.hasher.hash_without_salt(&access_token),
            client_id: client.id.clone(),
            token_type: LedgerType::Bearer,
            status: TokenStatus::Active,
            subject_id: Some(subject.clone()),
            expires_at: now + self.settings.access_token_ttl,
            issued_at: now,
            metadata: metadata.clone(),
        }];

        let refresh_token = client.allows_refresh().then(|| {
            let token = RefreshToken::from_random();
            records.push(TokenRecord {
                hash: self.hasher.hash_without_salt(&token),
                client_id: client.id.clone(),
                token_type: LedgerType::Refresh,
                status: TokenStatus::Active,
                subject_id: Some(subject.clone()),
                expires_at: now + self.settings.refresh_token_ttl,
                issued_at: now,
                metadata,
            });
            token
        });

        let response = AccessTokenResponse {
            access_token,
            token_type: TokenType::Bearer,
            expires_in: self.settings.access_token_ttl,
            refresh_token,
            scope,
        };

        (response, records)
    }

    /// Exchanges a single-use authorization code for a bearer (and refresh) token.
    pub async fn exchange_token(
        &self,
        credentials: &ClientCredentials,
        code: AuthCode,
        verifier: pkce::Verifier,
        redirect_uri: Option<RedirectUri>,
    ) -> Result<AccessTokenResponse, Error> {
        let client = self.check_client_authentication(credentials)?;
        let hash = self.hasher.hash_without_salt(&code);
        let record = self.presented_token(&hash, LedgerType::AuthorizationCode, &client)?;

        let verified = record
            .metadata
            .pkce
            .as_ref()
            .is_some_and(|challenge| pkce::verify(challenge, &verifier));
        if !verified {
            event!(Level::WARN, "PKCE verification failed");
            return Err(Error::InvalidGrant);
        }

        if let Some(uri) = &redirect_uri {
            if record.metadata.redirect_uri.as_ref() != Some(uri) {
                event!(Level::WARN, "Redirect uri differs from authorization request");
                return Err(Error::InvalidGrant);
            }
        }

        let subject = match (&record.subject_id, &client.subject_id) {
            (Some(code_subject), Some(client_subject)) if code_subject == client_subject => {
                code_subject.clone()
            }
            _ => {
                event!(Level::WARN, "Code subject does not match client assignment");
                return Err(Error::InvalidGrant);
            }
        };

        let scope = record
            .metadata
            .scope
            .clone()
            .unwrap_or_else(|| client.scope.clone());
        let (response, records) = self.mint_session(&client, &subject, scope);

        if !self
            .store
            .redeem_token(&hash, LedgerType::AuthorizationCode, TokenStatus::Expired, &records)?
        {
            event!(Level::WARN, "Authorization code already redeemed");
            return Err(Error::InvalidGrant);
        }

        event!(Level::INFO, subject_id = %subject, "Exchanged authorization code");
        Ok(response)
    }

    /// Rotates a refresh token. The upstream session is renewed first so an
    /// upstream failure leaves the presented refresh token untouched.
    pub async fn refresh(
        &self,
        credentials: &ClientCredentials,
        token: RefreshToken,
        scope: Option<Scope>,
    ) -> Result<AccessTokenResponse, Error> {
        let client = self.check_client_authentication(credentials)?;
        let hash = self.hasher.hash_without_salt(&token);
        let record = self.presented_token(&hash, LedgerType::Refresh, &client)?;

        let subject = record.subject_id.clone().ok_or_else(|| {
            event!(Level::WARN, "Refresh token without subject");
            Error::InvalidGrant
        })?;

        let user = self.store.get_upstream_user(&subject)?.ok_or_else(|| {
            Error::UpstreamAuthFailed("no upstream session for subject".to_string())
        })?;
        self.ensure_fresh_upstream(user).await?;

        let granted = record
            .metadata
            .scope
            .clone()
            .unwrap_or_else(|| client.scope.clone());
        let scope = match scope.filter(|s| !s.is_empty()) {
            Some(requested) => {
                if requested.as_parts().iter().any(|s| !granted.contains(s)) {
                    return Err(Error::InvalidScope);
                }
                requested
            }
            None => granted,
        };

        let (response, records) = self.mint_session(&client, &subject, scope);

        if !self
            .store
            .redeem_token(&hash, LedgerType::Refresh, TokenStatus::Revoked, &records)?
        {
            event!(Level::WARN, "Refresh token already rotated");
            return Err(Error::InvalidGrant);
        }

        event!(Level::INFO, subject_id = %subject, "Rotated refresh token");
        Ok(response)
    }
}
