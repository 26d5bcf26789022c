use tracing::{event, Level};

use crate::auth::{
    ClientCredentials, ClientInfo, RegistrationRequest, RegistrationResponse, Store,
    DEFAULT_CLIENT_NAME, DEFAULT_SCOPE,
};
use crate::core::models::NewClient;
use crate::core::types::{ClientId, ClientSecret, GrantType, RedirectUri, Scope};
use crate::util::random::FromRandom;

use super::error::Error;
use super::TokenBroker;

const MAX_SESSION_HINT_LEN: usize = 256;

/// Turns platform-declared metadata into a registrable client, applying defaults.
fn validate_metadata(
    req: RegistrationRequest,
    session_hint: Option<String>,
) -> Result<NewClient, Error> {
    if req.redirect_uris.is_empty() {
        return Err(Error::InvalidRedirectUri(
            "at least one redirect uri is required".to_string(),
        ));
    }

    let redirect_uris = req
        .redirect_uris
        .into_iter()
        .map(|uri| RedirectUri(uri.trim().to_string()))
        .collect::<Vec<_>>();
    if let Some(bad) = redirect_uris.iter().find(|uri| !uri.is_valid()) {
        return Err(Error::InvalidRedirectUri(format!("{} is not an absolute url", bad.0)));
    }

    let grant_types = match req.grant_types {
        None => vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        Some(requested) => {
            let mut grant_types = Vec::new();
            for grant in requested {
                let grant = grant
                    .parse::<GrantType>()
                    .map_err(Error::InvalidClientMetadata)?;
                if !grant_types.contains(&grant) {
                    grant_types.push(grant);
                }
            }
            if !grant_types.contains(&GrantType::AuthorizationCode) {
                return Err(Error::InvalidClientMetadata(
                    "authorization_code grant is required".to_string(),
                ));
            }
            grant_types
        }
    };

    if let Some(method) = req.token_endpoint_auth_method.as_deref() {
        if !matches!(method, "client_secret_basic" | "client_secret_post") {
            return Err(Error::InvalidClientMetadata(format!(
                "unsupported token_endpoint_auth_method {method}"
            )));
        }
    }

    let name = req
        .client_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string());

    let scope = req
        .scope
        .map(|s| Scope::from_delimited_parts(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Scope::from_delimited_parts(DEFAULT_SCOPE));

    let session_hint = session_hint
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty() && h.len() <= MAX_SESSION_HINT_LEN);

    Ok(NewClient {
        id: ClientId::from_random(),
        secret: ClientSecret::from_random(),
        name,
        redirect_uris,
        grant_types,
        scope,
        session_hint,
    })
}

impl TokenBroker {
    /// Registers a platform, returning an existing pending client where one matches.
    #[tracing::instrument(skip_all, fields(session = session_hint.is_some()))]
    pub async fn register(
        &self,
        req: RegistrationRequest,
        session_hint: Option<String>,
    ) -> Result<RegistrationResponse, Error> {
        let new = validate_metadata(req, session_hint)?;
        let client = self.store.register_client(&new)?;

        if client.id == new.id {
            event!(Level::INFO, client_id = %client.id, name = %client.name, "Registered client");
        } else {
            event!(Level::INFO, client_id = %client.id, "Returned existing client for registration");
        }

        Ok(client.into())
    }

    #[tracing::instrument(skip_all, fields(client_id = ?credentials.client_id))]
    pub async fn client_info(
        &self,
        credentials: ClientCredentials,
        client_id: ClientId,
    ) -> Result<ClientInfo, Error> {
        if credentials.client_id != client_id {
            return Err(Error::InvalidClient);
        }
        let client = self.check_client_authentication(&credentials)?;
        Ok(client.into())
    }

    #[tracing::instrument(skip_all, fields(client_id = ?credentials.client_id))]
    pub async fn delete_client(
        &self,
        credentials: ClientCredentials,
        client_id: ClientId,
    ) -> Result<(), Error> {
        if credentials.client_id != client_id {
            return Err(Error::InvalidClient);
        }
        let client = self.check_client_authentication(&credentials)?;
        self.store.delete_client(&client.id)?;
        event!(Level::INFO, client_id = %client.id, "Deleted client");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uris: &[&str]) -> RegistrationRequest {
        RegistrationRequest {
            redirect_uris: uris.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_are_applied() {
        let new = validate_metadata(request(&["https://platform.example/cb"]), None).unwrap();
        assert_eq!(new.name, DEFAULT_CLIENT_NAME);
        assert_eq!(new.scope, Scope::from_delimited_parts(DEFAULT_SCOPE));
        assert_eq!(
            new.grant_types,
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
        );
        assert!(new.id.0.starts_with("dcr_"));
    }

    #[test]
    fn redirect_uris_are_required_and_absolute() {
        assert!(matches!(
            validate_metadata(request(&[]), None),
            Err(Error::InvalidRedirectUri(_))
        ));
        assert!(matches!(
            validate_metadata(request(&["https://ok.example/cb", "relative/cb"]), None),
            Err(Error::InvalidRedirectUri(_))
        ));
    }

    #[test]
    fn only_supported_grants_are_accepted() {
        let mut req = request(&["https://platform.example/cb"]);
        req.grant_types = Some(vec!["client_credentials".to_string()]);
        assert!(matches!(
            validate_metadata(req, None),
            Err(Error::InvalidClientMetadata(_))
        ));

        let mut req = request(&["https://platform.example/cb"]);
        req.grant_types = Some(vec!["authorization_code".to_string()]);
        let new = validate_metadata(req, None).unwrap();
        assert_eq!(new.grant_types, vec![GrantType::AuthorizationCode]);
    }

    #[test]
    fn blank_session_hint_is_ignored() {
        let new =
            validate_metadata(request(&["https://platform.example/cb"]), Some("  ".into())).unwrap();
        assert!(new.session_hint.is_none());
    }
}
