use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::core::types::{AuthCode, BearerToken, ClientSecret, HashedToken, RefreshToken};

/// Values that are looked up by their digest rather than stored.
pub trait HashTo: AsRef<str> {}

impl HashTo for AuthCode {}
impl HashTo for BearerToken {}
impl HashTo for RefreshToken {}
impl HashTo for str {}
impl HashTo for String {}

#[derive(Debug, Default, Clone)]
pub struct HashingService;

impl HashingService {
    pub fn new() -> Self {
        Self
    }

    /// Ledger key for a token value: base64url(SHA-512).
    pub fn hash_without_salt<T>(&self, to_hash: &T) -> HashedToken
    where
        T: HashTo + ?Sized,
    {
        let digest = Sha512::digest(to_hash.as_ref().as_bytes());
        URL_SAFE_NO_PAD.encode(digest).into()
    }

    /// Compares SHA-256 digests so the comparison time does not depend on the secret.
    pub fn verify_secret(&self, presented: &ClientSecret, stored: &ClientSecret) -> bool {
        let lhs = Sha256::digest(presented.as_ref().as_bytes());
        let rhs = Sha256::digest(stored.as_ref().as_bytes());
        lhs.as_slice().ct_eq(rhs.as_slice()).into()
    }
}
