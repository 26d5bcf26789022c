use std::{
    fmt,
    str::FromStr,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "refresh_token" => Ok(Self::RefreshToken),
            other => Err(format!("unsupported grant type {other}")),
        }
    }
}

/// Space-delimited OAuth scope. Order of first appearance is kept, duplicates dropped.
#[derive(Debug, Clone, Default, Eq)]
pub struct Scope(Vec<String>);

impl Scope {
    pub fn from_parts(parts: Vec<String>) -> Self {
        let mut scope = Self::default();
        for part in parts {
            scope.push(part);
        }
        scope
    }

    pub fn from_delimited_parts(parts: &str) -> Self {
        let parts = parts
            .split_whitespace()
            .map(ToString::to_string)
            .collect();
        Self::from_parts(parts)
    }

    fn push(&mut self, part: String) {
        if !part.is_empty() && !self.0.contains(&part) {
            self.0.push(part);
        }
    }

    pub fn as_joined(&self) -> String {
        self.0.join(" ")
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    pub fn as_parts(&self) -> Vec<String> {
        self.0.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        let mut lhs = self.as_parts();
        let mut rhs = other.as_parts();
        lhs.sort();
        rhs.sort();
        lhs == rhs
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parts = String::deserialize(deserializer)?;
        Ok(Self::from_delimited_parts(&parts))
    }
}

impl Serialize for Scope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_joined())
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl FromStr for ClientId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct RedirectUri(pub String);

impl RedirectUri {
    /// Registered redirect URIs must be absolute URLs without a fragment.
    pub fn is_valid(&self) -> bool {
        match url::Url::parse(&self.0) {
            Ok(url) => url.has_host() && url.fragment().is_none(),
            Err(_) => false,
        }
    }
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct ClientSecret(pub String);

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(..)")
    }
}

impl AsRef<str> for ClientSecret {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct AuthCode(pub String);

impl AsRef<str> for AuthCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct BearerToken(pub String);

impl AsRef<str> for BearerToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct RefreshToken(pub String);

impl AsRef<str> for RefreshToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ledger key of a token: the token value is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashedToken(pub String);

impl From<String> for HashedToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    AuthorizationCode,
    Bearer,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Bearer => "bearer",
            Self::Refresh => "refresh",
        }
    }
}

impl FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "bearer" => Ok(Self::Bearer),
            "refresh" => Ok(Self::Refresh),
            other => Err(format!("unknown token type {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Active,
    Expired,
    Revoked,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

impl FromStr for TokenStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            other => Err(format!("unknown token status {other}")),
        }
    }
}

/// Seconds since the unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
        .try_into()
        .unwrap_or(0)
}

pub fn expires_in(secs: i64) -> i64 {
    unix_now().saturating_add(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_keeps_order_and_drops_duplicates() {
        let scope = Scope::from_delimited_parts("User.Read  Mail.Read User.Read");
        assert_eq!(scope.as_joined(), "User.Read Mail.Read");
        assert!(scope.contains("Mail.Read"));
        assert!(!scope.contains("Mail.Send"));
    }

    #[test]
    fn scope_equality_ignores_order() {
        assert_eq!(
            Scope::from_delimited_parts("a b"),
            Scope::from_delimited_parts("b a")
        );
    }

    #[test]
    fn redirect_uri_must_be_absolute() {
        assert!(RedirectUri("https://platform.example/cb".into()).is_valid());
        assert!(RedirectUri("http://localhost:3000/callback".into()).is_valid());
        assert!(!RedirectUri("/relative".into()).is_valid());
        assert!(!RedirectUri("https://platform.example/cb#frag".into()).is_valid());
    }

    #[test]
    fn ledger_enums_parse_their_own_names() {
        for t in [TokenType::AuthorizationCode, TokenType::Bearer, TokenType::Refresh] {
            assert_eq!(t.as_str().parse::<TokenType>(), Ok(t));
        }
        for s in [TokenStatus::Active, TokenStatus::Expired, TokenStatus::Revoked] {
            assert_eq!(s.as_str().parse::<TokenStatus>(), Ok(s));
        }
        assert!("password".parse::<GrantType>().is_err());
    }
}
