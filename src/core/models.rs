use std::fmt;

use crate::auth::pkce;

use super::types::*;

/// Operator-supplied upstream application credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamAppConfig {
    pub application_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub redirect_uri: String,
}

impl UpstreamAppConfig {
    /// Names of the fields that differ from `other`, after trimming whitespace.
    pub fn changed_fields(&self, other: &UpstreamAppConfig) -> Vec<&'static str> {
        let pairs = [
            ("application_id", &self.application_id, &other.application_id),
            ("client_secret", &self.client_secret, &other.client_secret),
            ("tenant_id", &self.tenant_id, &other.tenant_id),
            ("redirect_uri", &self.redirect_uri, &other.redirect_uri),
        ];

        pairs
            .into_iter()
            .filter(|(_, a, b)| a.trim() != b.trim())
            .map(|(name, _, _)| name)
            .collect()
    }
}

impl fmt::Debug for UpstreamAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamAppConfig")
            .field("application_id", &self.application_id)
            .field("tenant_id", &self.tenant_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamApp {
    pub config: UpstreamAppConfig,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppRotation {
    Created,
    Unchanged,
    Rotated {
        changed: Vec<&'static str>,
        revoked: usize,
    },
}

#[derive(Clone)]
pub struct UpstreamUser {
    pub subject_id: SubjectId,
    pub application_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: i64,
    pub scope: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl fmt::Debug for UpstreamUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamUser")
            .field("subject_id", &self.subject_id)
            .field("application_id", &self.application_id)
            .field("expires_at", &self.expires_at)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub secret: ClientSecret,
    pub name: String,
    pub redirect_uris: Vec<RedirectUri>,
    pub grant_types: Vec<GrantType>,
    pub scope: Scope,
    pub owner_application_id: String,
    pub subject_id: Option<SubjectId>,
    pub owner_email: Option<String>,
    pub session_hint: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Client {
    pub fn is_assigned(&self) -> bool {
        self.subject_id.is_some()
    }

    pub fn has_redirect_uri(&self, uri: &RedirectUri) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    pub fn allows_refresh(&self) -> bool {
        self.grant_types.contains(&GrantType::RefreshToken)
    }
}

/// A registration that has passed validation and awaits a registry lookup or insert.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub id: ClientId,
    pub secret: ClientSecret,
    pub name: String,
    pub redirect_uris: Vec<RedirectUri>,
    pub grant_types: Vec<GrantType>,
    pub scope: Scope,
    pub session_hint: Option<String>,
}

impl NewClient {
    pub fn primary_redirect_uri(&self) -> Option<&RedirectUri> {
        self.redirect_uris.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct TokenMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<RedirectUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(flatten)]
    pub pkce: Option<pkce::Challenge>,
}

#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub hash: HashedToken,
    pub client_id: ClientId,
    pub token_type: TokenType,
    pub status: TokenStatus,
    pub subject_id: Option<SubjectId>,
    pub expires_at: i64,
    pub issued_at: i64,
    pub metadata: TokenMetadata,
}

impl TokenRecord {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Result of one login through a client, applied in a single transaction.
#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub user: UpstreamUser,
    pub client_id: ClientId,
    pub redirect_uri: RedirectUri,
    pub code: TokenRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_tokens: usize,
    pub removed_clients: usize,
}

/// The identity a validated bearer token resolves to.
#[derive(Clone)]
pub struct SubjectContext {
    pub subject_id: SubjectId,
    pub client_id: ClientId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub upstream_access_token: String,
}

impl fmt::Debug for SubjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectContext")
            .field("subject_id", &self.subject_id)
            .field("client_id", &self.client_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UpstreamAppConfig {
        UpstreamAppConfig {
            application_id: "app".into(),
            client_secret: "secret".into(),
            tenant_id: "common".into(),
            redirect_uri: "http://localhost:8001/oauth/callback".into(),
        }
    }

    #[test]
    fn whitespace_is_not_a_change() {
        let mut other = config();
        other.tenant_id = " common ".into();
        assert!(config().changed_fields(&other).is_empty());
    }

    #[test]
    fn changed_fields_are_named() {
        let mut other = config();
        other.client_secret = "rotated".into();
        other.tenant_id = "contoso".into();
        assert_eq!(config().changed_fields(&other), vec!["client_secret", "tenant_id"]);
    }

    #[test]
    fn metadata_survives_json() {
        let metadata = TokenMetadata {
            redirect_uri: Some(RedirectUri("https://platform.example/cb".into())),
            state: Some("xyz".into()),
            scope: Some(Scope::from_delimited_parts("User.Read")),
            pkce: Some(pkce::Challenge {
                code: "challenge".into(),
                method: pkce::Transformation::S256,
            }),
        };
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains(r#""code_challenge_method":"S256""#));
        let back: TokenMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);

        let empty: TokenMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, TokenMetadata::default());
    }
}
