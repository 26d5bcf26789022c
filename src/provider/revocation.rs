use tracing::{event, Level};

use crate::auth::{RevocationRequest, Store};
use crate::core::types::{ClientId, TokenStatus};

use super::error::Error;
use super::TokenBroker;

impl TokenBroker {
    /// Revokes one token, or with `revoke_session` every bearer and refresh token
    /// of the owning client. Unknown tokens are ignored.
    #[tracing::instrument(skip_all, fields(hint = ?req.token_type_hint))]
    pub async fn revoke(&self, req: RevocationRequest) -> Result<(), Error> {
        let hash = self.hasher.hash_without_salt(req.token.as_str());

        if req.revokes_session() {
            if let Some(record) = self.store.get_token(&hash)? {
                self.revoke_client_session(&record.client_id)?;
            }
            return Ok(());
        }

        if self
            .store
            .transition_token(&hash, TokenStatus::Active, TokenStatus::Revoked)?
        {
            event!(Level::INFO, "Revoked token");
        }
        Ok(())
    }

    pub fn revoke_client_session(&self, client_id: &ClientId) -> Result<usize, Error> {
        let revoked = self.store.revoke_client_tokens(client_id)?;
        event!(Level::INFO, client_id = %client_id, revoked, "Revoked client session");
        Ok(revoked)
    }
}
