use std::sync::Arc;

use warp::http::StatusCode;
use warp::Filter;

use crate::auth::{AuthorizationRequest, CallbackRequest, RegistrationRequest, RevocationRequest, TokenRequest};
use crate::http::encoding::{self, reply};
use crate::http::response::redirect_to;
use crate::provider::TokenBroker;

pub fn oauth_endpoint(
    provider: Arc<TokenBroker>,
) -> impl warp::Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_provider = warp::any().map(move || provider.clone());

    let register = warp::path!("register")
        .and(warp::post())
        .and(with_provider.clone())
        .and(encoding::session_hint())
        .and(warp::body::json::<RegistrationRequest>())
        .and_then(
            |provider: Arc<TokenBroker>, hint: Option<String>, req| async move {
                let result = provider.register(req, hint).await;
                reply::json_with_status(result, StatusCode::CREATED)
            },
        );

    // The platform's user agent goes to the upstream login page.
    let authorize = warp::path!("authorize")
        .and(warp::get())
        .and(with_provider.clone())
        .and(warp::query::<AuthorizationRequest>())
        .and_then(|provider: Arc<TokenBroker>, req| async move {
            let url = reply::accept(provider.authorize(req).await)?;
            Ok::<_, warp::Rejection>(redirect_to(&url, StatusCode::FOUND))
        });

    // Either a redirect back to the platform or a direct error
    let callback = warp::path!("callback")
        .and(warp::get())
        .and(with_provider.clone())
        .and(warp::query::<CallbackRequest>())
        .and_then(|provider: Arc<TokenBroker>, req| async move {
            reply::reply(provider.callback(req).await)
        });

    let token = warp::path!("token")
        .and(warp::post())
        .and(with_provider.clone())
        .and(encoding::body_with_credentials::<TokenRequest>())
        .and_then(
            |provider: Arc<TokenBroker>, (credentials, req)| async move {
                reply::no_store(provider.access_token_request(credentials, req).await)
            },
        );

    let revoke = warp::path!("revoke")
        .and(warp::post())
        .and(with_provider.clone())
        .and(warp::body::form::<RevocationRequest>())
        .and_then(|provider: Arc<TokenBroker>, req| async move {
            reply::accept(provider.revoke(req).await)?;
            Ok::<_, warp::Rejection>(warp::reply())
        });

    register
        .or(authorize)
        .or(callback)
        .or(token)
        .or(revoke)
}
