use url::Url;

use crate::auth::{ServerMetadata, DEFAULT_SCOPE};
use crate::core::types::Scope;

use super::error::Error;
use super::TokenBroker;

fn endpoint(base: &Url, path: &str) -> Result<Url, Error> {
    base.join(path)
        .map_err(|e| Error::InvalidRequest(format!("cannot build {path}: {e}")))
}

impl TokenBroker {
    pub fn metadata(&self) -> Result<ServerMetadata, Error> {
        let base = &self.settings.public_url;
        Ok(ServerMetadata {
            issuer: base.clone(),
            authorization_endpoint: endpoint(base, "oauth/authorize")?,
            token_endpoint: endpoint(base, "oauth/token")?,
            registration_endpoint: endpoint(base, "oauth/register")?,
            revocation_endpoint: endpoint(base, "oauth/revoke")?,
            response_types_supported: &["code"],
            grant_types_supported: &["authorization_code", "refresh_token"],
            token_endpoint_auth_methods_supported: &["client_secret_basic", "client_secret_post"],
            code_challenge_methods_supported: &["S256", "plain"],
            scopes_supported: Scope::from_delimited_parts(DEFAULT_SCOPE).as_parts(),
        })
    }
}
