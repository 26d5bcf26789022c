use crate::core::models::{
    AppRotation, Client, CompletedLogin, NewClient, SweepReport, TokenRecord, UpstreamApp,
    UpstreamAppConfig, UpstreamUser,
};
use crate::core::types::{
    ClientId, ClientSecret, HashedToken, RedirectUri, SubjectId, TokenStatus,
    TokenType as LedgerType,
};

pub mod access_token;
pub mod authorization;
pub mod discovery;
pub mod error;
pub mod pkce;
pub mod registration;
pub mod revocation;

pub use access_token::*;
pub use authorization::*;
pub use discovery::*;
pub use registration::*;
pub use revocation::*;

use crate::provider::error::Error;

#[derive(Debug)]
pub enum MaybeRedirect<R, D> {
    Redirected(Redirect<R>),
    Direct(D),
}

#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
pub struct WithState<T> {
    #[serde(flatten)]
    pub inner: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl<T> From<(T, Option<String>)> for WithState<T> {
    fn from((t, state): (T, Option<String>)) -> Self {
        Self { inner: t, state }
    }
}

#[derive(Debug, Clone)]
#[derive(serde::Deserialize)]
pub struct ClientCredentials {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
}

#[derive(Debug, Clone)]
pub struct Redirect<T> {
    pub uri: RedirectUri,
    pub params: T,
}

impl<T> Redirect<T> {
    pub fn new(uri: RedirectUri, params: T) -> Self {
        Redirect { uri, params }
    }
}

/// Durable state behind the broker: the upstream app row, upstream users,
/// the client registry and the token ledger.
pub trait Store {
    fn get_upstream_app(&self) -> Result<Option<UpstreamApp>, Error>;
    fn rotate_upstream_app(&self, config: &UpstreamAppConfig) -> Result<AppRotation, Error>;

    fn upsert_upstream_user(&self, user: &UpstreamUser) -> Result<(), Error>;
    fn get_upstream_user(&self, subject: &SubjectId) -> Result<Option<UpstreamUser>, Error>;

    fn register_client(&self, new: &NewClient) -> Result<Client, Error>;
    fn get_client(&self, client_id: &ClientId) -> Result<Option<Client>, Error>;
    fn list_clients(&self) -> Result<Vec<Client>, Error>;
    fn delete_client(&self, client_id: &ClientId) -> Result<bool, Error>;
    fn assign_user(
        &self,
        client_id: &ClientId,
        subject: &SubjectId,
        email: Option<&str>,
        redirect_uri: &RedirectUri,
    ) -> Result<ClientId, Error>;

    /// Upserts the user, assigns the client and stores the new code atomically.
    fn complete_login(&self, login: &CompletedLogin) -> Result<ClientId, Error>;

    fn get_token(&self, hash: &HashedToken) -> Result<Option<TokenRecord>, Error>;
    fn transition_token(
        &self,
        hash: &HashedToken,
        from: TokenStatus,
        to: TokenStatus,
    ) -> Result<bool, Error>;
    /// Moves an active, unexpired token of `token_type` to `to` and inserts `issue`
    /// in the same transaction. Returns false when another caller got there first.
    fn redeem_token(
        &self,
        hash: &HashedToken,
        token_type: LedgerType,
        to: TokenStatus,
        issue: &[TokenRecord],
    ) -> Result<bool, Error>;
    fn revoke_client_tokens(&self, client_id: &ClientId) -> Result<usize, Error>;
    fn sweep(&self, now: i64, stale_before: i64) -> Result<SweepReport, Error>;
}
