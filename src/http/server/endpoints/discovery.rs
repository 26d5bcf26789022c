use std::sync::Arc;

use warp::Filter;

use crate::http::encoding::reply;
use crate::provider::TokenBroker;

pub fn discovery_endpoint(
    provider: Arc<TokenBroker>,
) -> impl warp::Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_provider = warp::any().map(move || provider.clone());

    warp::path!(".well-known" / "oauth-authorization-server")
        .and(warp::get())
        .and(with_provider)
        .and_then(|provider: Arc<TokenBroker>| async move { reply::json_encode(provider.metadata()) })
}
