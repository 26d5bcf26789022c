use super::error::AuthRejection;
use warp::http::header::{HeaderValue, CACHE_CONTROL, PRAGMA};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};
use warp::Rejection;

pub fn json_encode(
    value: Result<impl serde::Serialize, impl Into<AuthRejection>>,
) -> Result<Response, Rejection> {
    json_with_status(value, StatusCode::OK)
}

pub fn json_with_status(
    value: Result<impl serde::Serialize, impl Into<AuthRejection>>,
    status: StatusCode,
) -> Result<Response, Rejection> {
    value
        .map(|v| warp::reply::with_status(warp::reply::json(&v), status).into_response())
        .map_err(|e| warp::reject::custom::<AuthRejection>(e.into()))
}

/// Token responses must not be cached by the client or intermediaries.
pub fn no_store(
    value: Result<impl serde::Serialize, impl Into<AuthRejection>>,
) -> Result<Response, Rejection> {
    json_encode(value).map(|mut response| {
        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        response
    })
}

pub fn accept<T, E>(result: Result<T, E>) -> Result<T, Rejection>
where
    E: Into<AuthRejection>,
{
    result.map_err(|e| warp::reject::custom(e.into()))
}

pub fn reply<T, E>(result: Result<T, E>) -> Result<Response, Rejection>
where
    T: Reply,
    E: Into<AuthRejection>,
{
    result
        .map(|t| t.into_response())
        .map_err(|e| warp::reject::custom(e.into()))
}
