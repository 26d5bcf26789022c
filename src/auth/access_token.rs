use crate::core::types::{BearerToken, RefreshToken, Scope};

#[derive(Debug, Clone, Copy)]
#[derive(serde::Serialize)]
pub enum TokenType {
    Bearer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

/// Form body of the token endpoint. Grant-specific fields are checked by the broker
/// so an unknown `grant_type` can be reported as such.
#[derive(Debug, Clone, Default)]
#[derive(serde::Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
pub struct AccessTokenResponse {
    pub access_token: BearerToken,
    pub token_type: TokenType,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
    pub scope: Scope,
}
