use crate::auth::error::{ErrorKind, OAuthError};
use crate::auth::{MaybeRedirect, Redirect, WithState};
use crate::capability::CapabilityError;
use crate::provider::error::Error;
use tracing::{event, Level};
use warp::http::header::{HeaderValue, CACHE_CONTROL, WWW_AUTHENTICATE};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};
use warp::Rejection;

#[derive(Debug)]
pub enum AuthRejection {
    Broker(Error),
    Callback(Redirect<WithState<OAuthError>>),
    Capability(CapabilityError),
    Unauthorized,
}

impl warp::reject::Reject for AuthRejection {}

impl From<Error> for AuthRejection {
    fn from(error: Error) -> Self {
        Self::Broker(error)
    }
}

impl From<MaybeRedirect<WithState<OAuthError>, Error>> for AuthRejection {
    fn from(error: MaybeRedirect<WithState<OAuthError>, Error>) -> Self {
        match error {
            MaybeRedirect::Redirected(r) => Self::Callback(r),
            MaybeRedirect::Direct(d) => Self::Broker(d),
        }
    }
}

impl From<CapabilityError> for AuthRejection {
    fn from(error: CapabilityError) -> Self {
        match error {
            CapabilityError::Unauthorized(e) => Self::Broker(e),
            e => Self::Capability(e),
        }
    }
}

fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidClient | ErrorKind::InvalidToken => StatusCode::UNAUTHORIZED,
        ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
        ErrorKind::TemporarilyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// JSON error body with the status and challenge header matching its kind.
pub fn oauth_error_reply(error: &OAuthError) -> Response {
    let mut response =
        warp::reply::with_status(warp::reply::json(error), status_of(error.kind)).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    match error.kind {
        ErrorKind::InvalidClient => {
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"dcr-broker\""));
        }
        ErrorKind::InvalidToken => {
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer error=\"invalid_token\""));
        }
        _ => {}
    }
    response
}

fn broker_error_reply(error: &Error) -> Response {
    if error.is_internal() {
        event!(Level::ERROR, error = %error, "Request failed");
    } else {
        event!(Level::DEBUG, error = %error, "Request rejected");
    }
    oauth_error_reply(&OAuthError::from(error))
}

fn capability_error_reply(error: &CapabilityError) -> Response {
    let (kind, status) = match error {
        CapabilityError::UnknownCapability(_) | CapabilityError::UnknownOperation(_) => {
            ("not_found", StatusCode::NOT_FOUND)
        }
        CapabilityError::InvalidArguments(_) => ("invalid_request", StatusCode::BAD_REQUEST),
        CapabilityError::Unauthorized(e) => return broker_error_reply(e),
        CapabilityError::Failed(_) => ("upstream_error", StatusCode::BAD_GATEWAY),
    };
    let body = serde_json::json!({
        "error": kind,
        "error_description": error.to_string(),
    });
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

pub async fn handle_reject(err: Rejection) -> Result<Response, Rejection> {
    if let Some(e) = err.find::<AuthRejection>() {
        let response = match e {
            AuthRejection::Broker(e) => broker_error_reply(e),
            AuthRejection::Callback(r) => r.clone().into_response(),
            AuthRejection::Capability(e) => capability_error_reply(e),
            AuthRejection::Unauthorized => broker_error_reply(&Error::InvalidClient),
        };
        return Ok(response);
    }

    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        let error = OAuthError::describe(ErrorKind::InvalidRequest, e.to_string());
        return Ok(oauth_error_reply(&error));
    }

    if err.find::<warp::reject::InvalidQuery>().is_some() {
        let error = OAuthError::describe(ErrorKind::InvalidRequest, "malformed query string");
        return Ok(oauth_error_reply(&error));
    }

    Err(err)
}
