use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Transformation {
    #[serde(rename = "plain")]
    #[default]
    Plain,
    S256,
}

impl Transformation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Challenge {
    #[serde(rename = "code_challenge")]
    pub code: String,
    #[serde(rename = "code_challenge_method")]
    #[serde(default)]
    pub method: Transformation,
}

#[derive(Debug, Clone)]
#[derive(serde::Deserialize)]
#[serde(transparent)]
pub struct Verifier {
    pub value: String,
}

impl Verifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// RFC 7636 section 4.1: 43 to 128 characters from the unreserved set.
    fn is_well_formed(&self) -> bool {
        let len = self.value.len();
        (43..=128).contains(&len)
            && self
                .value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
    }

    fn transform(&self, method: Transformation) -> String {
        match method {
            Transformation::Plain => self.value.clone(),
            Transformation::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(self.value.as_bytes())),
        }
    }
}

/// Checks a presented verifier against the challenge recorded at authorization time.
pub fn verify(challenge: &Challenge, verifier: &Verifier) -> bool {
    if !verifier.is_well_formed() {
        return false;
    }

    let derived = verifier.transform(challenge.method);
    derived.as_bytes().ct_eq(challenge.code.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    fn challenge(code: &str, method: Transformation) -> Challenge {
        Challenge {
            code: code.to_string(),
            method,
        }
    }

    #[test]
    fn s256_matches_rfc_vector() {
        let c = challenge(CHALLENGE, Transformation::S256);
        assert!(verify(&c, &Verifier::new(VERIFIER)));
    }

    #[test]
    fn s256_rejects_other_verifier() {
        let c = challenge(CHALLENGE, Transformation::S256);
        let other = "eBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert!(!verify(&c, &Verifier::new(other)));
    }

    #[test]
    fn plain_compares_verbatim() {
        let c = challenge(VERIFIER, Transformation::Plain);
        assert!(verify(&c, &Verifier::new(VERIFIER)));
        assert!(!verify(&c, &Verifier::new(CHALLENGE)));
    }

    #[test]
    fn plain_rejects_prefix_of_challenge() {
        let long = format!("{VERIFIER}abc");
        let c = challenge(&long, Transformation::Plain);
        assert!(!verify(&c, &Verifier::new(VERIFIER)));
        assert!(verify(&c, &Verifier::new(long.clone())));
    }

    #[test]
    fn malformed_verifier_is_rejected() {
        let short = challenge("short", Transformation::Plain);
        assert!(!verify(&short, &Verifier::new("short")));

        let spaced = format!("{} ", &VERIFIER[..43]);
        let c = challenge(&spaced, Transformation::Plain);
        assert!(!verify(&c, &Verifier::new(spaced.clone())));
    }

    #[test]
    fn method_defaults_to_plain() {
        let parsed: Challenge =
            serde_json::from_str(r#"{"code_challenge":"abc"}"#).unwrap();
        assert_eq!(parsed.method, Transformation::Plain);

        let parsed: Challenge =
            serde_json::from_str(r#"{"code_challenge":"abc","code_challenge_method":"S256"}"#)
                .unwrap();
        assert_eq!(parsed.method, Transformation::S256);
    }
}
