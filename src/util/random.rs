use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use crate::core::types::{AuthCode, BearerToken, ClientId, ClientSecret, RefreshToken};

pub trait FromRandom {
    fn from_random() -> Self;
}

impl FromRandom for ClientId {
    fn from_random() -> Self {
        ClientId(format!("dcr_{}", random_string(16)))
    }
}

impl FromRandom for ClientSecret {
    fn from_random() -> Self {
        ClientSecret(random_string(32))
    }
}

impl FromRandom for AuthCode {
    fn from_random() -> Self {
        AuthCode(random_string(32))
    }
}

impl FromRandom for BearerToken {
    fn from_random() -> Self {
        BearerToken(random_string(32))
    }
}

impl FromRandom for RefreshToken {
    fn from_random() -> Self {
        RefreshToken(random_string(48))
    }
}

/// `size` random bytes, base64url encoded.
pub fn random_string(size: usize) -> String {
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
