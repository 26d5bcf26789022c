use tracing::{event, Level};

use crate::auth::Store;
use crate::core::models::{AppRotation, UpstreamAppConfig};

use super::error::Error;
use super::TokenBroker;

impl TokenBroker {
    /// Stores the operator's upstream credentials. Any difference from the stored
    /// row revokes every active bearer and refresh token.
    #[tracing::instrument(skip_all, fields(application_id = %config.application_id))]
    pub fn rotate_upstream_app(&self, config: &UpstreamAppConfig) -> Result<AppRotation, Error> {
        let outcome = self.store.rotate_upstream_app(config)?;
        log_rotation(&outcome);
        Ok(outcome)
    }
}

pub fn log_rotation(outcome: &AppRotation) {
    if let AppRotation::Rotated { changed, revoked } = outcome {
        event!(
            Level::WARN,
            changed = ?changed,
            revoked,
            "Upstream application changed, revoked all active sessions"
        );
    }
}
