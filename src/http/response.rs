use url::Url;
use warp::http::header::{HeaderValue, LOCATION};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

use crate::auth::Redirect;
use crate::core::types::RedirectUri;

fn append_params(uri: &RedirectUri, params: impl serde::Serialize) -> Option<Url> {
    let mut url = Url::parse(&uri.0).ok()?;
    let encoded = serde_urlencoded::to_string(params).ok()?;
    if !encoded.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(form_urlencoded::parse(encoded.as_bytes()));
    }
    Some(url)
}

/// Redirect to `location` with `status`; an unencodable location becomes a 500.
pub fn redirect_to(location: &Url, status: StatusCode) -> Response {
    match HeaderValue::from_str(location.as_str()) {
        Ok(value) => {
            let mut response = status.into_response();
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

impl<T: serde::Serialize + Send> Reply for Redirect<T> {
    fn into_response(self) -> Response {
        match append_params(&self.uri, &self.params) {
            Some(url) => redirect_to(&url, StatusCode::TEMPORARY_REDIRECT),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
