use crate::auth::{MaybeRedirect, Redirect, WithState};
use crate::core::types::RedirectUri;
use crate::util::crypto::{DecryptError, EncryptError};

/// Why a bearer token did not resolve to a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Missing,
    Unknown,
    Expired,
    Revoked,
    Unassigned,
    UnknownSubject,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Unknown => "unknown",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Unassigned => "unassigned",
            Self::UnknownSubject => "unknown_subject",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid redirect uri: {0}")]
    InvalidRedirectUri(String),
    #[error("invalid client metadata: {0}")]
    InvalidClientMetadata(String),
    #[error("invalid client")]
    InvalidClient,
    #[error("invalid grant")]
    InvalidGrant,
    #[error("requested scope exceeds the original grant")]
    InvalidScope,
    #[error("unsupported grant type")]
    UnsupportedGrantType,
    #[error("access denied")]
    AccessDenied,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("upstream authentication failed: {0}")]
    UpstreamAuthFailed(String),
    #[error("no upstream application is configured")]
    NotConfigured,
    #[error("bearer token rejected: {}", .0.as_str())]
    Rejected(Rejection),
    #[error("database error: {0}")]
    Db(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("stored secret could not be decrypted: {0}")]
    Decrypt(#[from] DecryptError),
    #[error(transparent)]
    Encrypt(#[from] EncryptError),
    #[error("http client error: {0}")]
    Http(String),
}

impl Error {
    /// Failures of the broker itself rather than of the caller.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured
                | Self::Db(_)
                | Self::Pool(_)
                | Self::Migration(_)
                | Self::Serde(_)
                | Self::Decrypt(_)
                | Self::Encrypt(_)
                | Self::Http(_)
        )
    }
}

pub trait ResultExt<T, E> {
    fn without_redirect<R>(self) -> Result<T, MaybeRedirect<R, E>>;
    fn add_redirect_context<D>(self, uri: &RedirectUri) -> Result<T, MaybeRedirect<E, D>>;
    fn add_state_context(self, state: &Option<String>) -> Result<T, WithState<E>>;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn without_redirect<R>(self) -> Result<T, MaybeRedirect<R, E>> {
        self.map_err(MaybeRedirect::Direct)
    }

    fn add_redirect_context<D>(self, uri: &RedirectUri) -> Result<T, MaybeRedirect<E, D>> {
        self.map_err(|e| MaybeRedirect::Redirected(Redirect::new(uri.clone(), e)))
    }

    fn add_state_context(self, state: &Option<String>) -> Result<T, WithState<E>> {
        self.map_err(|e| WithState {
            state: state.clone(),
            inner: e,
        })
    }
}
