use url::Url;

/// RFC 8414 authorization server metadata.
#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
pub struct ServerMetadata {
    pub issuer: Url,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub registration_endpoint: Url,
    pub revocation_endpoint: Url,
    pub response_types_supported: &'static [&'static str],
    pub grant_types_supported: &'static [&'static str],
    pub token_endpoint_auth_methods_supported: &'static [&'static str],
    pub code_challenge_methods_supported: &'static [&'static str],
    pub scopes_supported: Vec<String>,
}
