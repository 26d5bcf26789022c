use crate::auth::pkce;
use crate::core::types::{AuthCode, ClientId, RedirectUri, Scope};

use super::error::OAuthError;
use super::{MaybeRedirect, WithState};
use crate::provider::error::Error;

pub type AuthorizationError = MaybeRedirect<WithState<OAuthError>, Error>;

#[derive(Debug, Clone)]
#[derive(serde::Deserialize)]
pub struct AuthorizationRequest {
    pub response_type: Option<String>,
    pub client_id: ClientId,
    pub redirect_uri: RedirectUri,
    pub scope: Option<Scope>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<pkce::Transformation>,
}

/// What the upstream sends back to the broker's callback.
#[derive(Debug, Clone, Default)]
#[derive(serde::Deserialize)]
pub struct CallbackRequest {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// An authorization request in flight through the upstream login,
/// sealed into the upstream `state` parameter.
#[derive(Debug, Clone)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct PendingAuthorization {
    pub client_id: ClientId,
    pub redirect_uri: RedirectUri,
    pub scope: Scope,
    pub state: Option<String>,
    pub challenge: pkce::Challenge,
    pub issued_at: i64,
}

#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
pub struct AuthorizationResponse {
    pub code: AuthCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}
