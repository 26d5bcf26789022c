pub mod error;
pub mod reply;

use crate::auth::ClientCredentials;
use crate::core::types::{BearerToken, ClientId, ClientSecret};
use crate::provider::error::{Error, Rejection as TokenRejection};
use http_basic_auth::Credential as BasicCredentials;
use warp::{Filter, Rejection};

use self::error::AuthRejection;

#[derive(serde::Deserialize)]
pub struct WithCredentials<T> {
    #[serde(flatten)]
    credentials: ClientCredentials,
    #[serde(flatten)]
    body: T,
}

impl From<BasicCredentials> for ClientCredentials {
    fn from(credentials: BasicCredentials) -> Self {
        ClientCredentials {
            client_id: ClientId(credentials.user_id),
            client_secret: ClientSecret(credentials.password),
        }
    }
}

impl<T> From<(BasicCredentials, T)> for WithCredentials<T> {
    fn from((credentials, value): (BasicCredentials, T)) -> Self {
        Self::join(credentials.into(), value)
    }
}

impl<T> WithCredentials<T> {
    pub fn join(credentials: ClientCredentials, body: T) -> Self {
        Self { credentials, body }
    }
    pub fn split(self) -> (ClientCredentials, T) {
        (self.credentials, self.body)
    }
}

/// Form body plus client credentials, taken from HTTP Basic or from the
/// `client_id`/`client_secret` form fields.
pub fn body_with_credentials<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = ((ClientCredentials, T),), Error = Rejection> + Clone {
    let basic = warp::header::<BasicCredentials>("authorization")
        .and(warp::body::form::<T>())
        .map(|c, b| (c, b).into());
    let body = warp::body::form::<WithCredentials<T>>();
    basic
        .or(body)
        .unify()
        .or_else(|_| async move { Err(warp::reject::custom(AuthRejection::Unauthorized)) })
        .map(|w: WithCredentials<T>| w.split())
}

/// Client credentials for requests without a meaningful body.
pub fn credentials() -> impl Filter<Extract = (ClientCredentials,), Error = Rejection> + Clone {
    let basic = warp::header::<BasicCredentials>("authorization").map(ClientCredentials::from);
    let body = warp::body::form::<ClientCredentials>();
    basic
        .or(body)
        .unify()
        .or_else(|_| async move { Err(warp::reject::custom(AuthRejection::Unauthorized)) })
}

pub fn bearer() -> impl Filter<Extract = (BearerToken,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(|header: Option<String>| async move {
        let token = header
            .as_deref()
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| BearerToken(t.to_string()))
            .ok_or(Error::Rejected(TokenRejection::Missing));
        reply::accept(token)
    })
}

/// Optional `Mcp-Session-Id` header sent by platforms on registration.
pub fn session_hint() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("mcp-session-id")
}
