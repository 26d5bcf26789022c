use super::TokenTypeHint;

#[derive(Debug, Clone)]
#[derive(serde::Deserialize)]
pub struct RevocationRequest {
    pub token: String,
    pub token_type_hint: Option<TokenTypeHint>,
    #[serde(default)]
    pub revoke_session: Option<String>,
}

impl RevocationRequest {
    /// `revoke_session=true` asks for every bearer and refresh token of the client.
    pub fn revokes_session(&self) -> bool {
        matches!(self.revoke_session.as_deref(), Some("true") | Some("1"))
    }
}
