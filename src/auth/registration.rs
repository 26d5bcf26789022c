use crate::core::models::Client;
use crate::core::types::{ClientId, ClientSecret, GrantType, RedirectUri, Scope};

pub const DEFAULT_CLIENT_NAME: &str = "MCP Connector";
pub const DEFAULT_SCOPE: &str = "Mail.Read Mail.Send Calendars.ReadWrite User.Read";

#[derive(Debug, Clone, Default)]
#[derive(serde::Deserialize)]
pub struct RegistrationRequest {
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub grant_types: Option<Vec<String>>,
    pub scope: Option<String>,
    pub token_endpoint_auth_method: Option<String>,
}

#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
pub struct RegistrationResponse {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub client_id_issued_at: i64,
    pub client_secret_expires_at: i64,
    pub client_name: String,
    pub redirect_uris: Vec<RedirectUri>,
    pub grant_types: Vec<GrantType>,
    pub scope: Scope,
    pub token_endpoint_auth_method: &'static str,
}

impl From<Client> for RegistrationResponse {
    fn from(client: Client) -> Self {
        Self {
            client_id: client.id,
            client_secret: client.secret,
            client_id_issued_at: client.created_at,
            client_secret_expires_at: 0,
            client_name: client.name,
            redirect_uris: client.redirect_uris,
            grant_types: client.grant_types,
            scope: client.scope,
            token_endpoint_auth_method: "client_secret_basic",
        }
    }
}

/// Registration metadata as read back by the client itself, without the secret.
#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub client_id_issued_at: i64,
    pub client_name: String,
    pub redirect_uris: Vec<RedirectUri>,
    pub grant_types: Vec<GrantType>,
    pub scope: Scope,
    pub assigned: bool,
}

impl From<Client> for ClientInfo {
    fn from(client: Client) -> Self {
        Self {
            assigned: client.is_assigned(),
            client_id: client.id,
            client_id_issued_at: client.created_at,
            client_name: client.name,
            redirect_uris: client.redirect_uris,
            grant_types: client.grant_types,
            scope: client.scope,
        }
    }
}
