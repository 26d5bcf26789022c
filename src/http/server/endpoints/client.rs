use std::sync::Arc;

use warp::http::StatusCode;
use warp::Filter;

use crate::auth::ClientCredentials;
use crate::core::types::ClientId;
use crate::http::encoding::{self, reply};
use crate::provider::TokenBroker;

/// Client configuration endpoint, authenticated with the client's own credentials.
pub fn client_endpoint(
    provider: Arc<TokenBroker>,
) -> impl warp::Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_provider = warp::any().map(move || provider.clone());

    let get = warp::path!(ClientId)
        .and(warp::get())
        .and(with_provider.clone())
        .and(encoding::credentials())
        .and_then(
            |id, provider: Arc<TokenBroker>, credentials: ClientCredentials| async move {
                reply::json_encode(provider.client_info(credentials, id).await)
            },
        );

    let delete = warp::path!(ClientId)
        .and(warp::delete())
        .and(with_provider.clone())
        .and(encoding::credentials())
        .and_then(
            |id, provider: Arc<TokenBroker>, credentials: ClientCredentials| async move {
                reply::accept(provider.delete_client(credentials, id).await)?;
                Ok::<_, warp::Rejection>(StatusCode::NO_CONTENT)
            },
        );

    warp::path("clients").and(get.or(delete))
}
