mod common;

use common::*;

use dcr_broker::auth::error::{ErrorKind, OAuthError};
use dcr_broker::auth::{CallbackRequest, MaybeRedirect, Store};
use dcr_broker::core::models::AppRotation;
use dcr_broker::core::types::{SubjectId, TokenStatus};
use dcr_broker::provider::error::{Error, Rejection};
use dcr_broker::util::hash::HashingService;

/// Forces every use of an upstream session through an upstream refresh.
fn always_refresh(settings: &mut dcr_broker::provider::BrokerSettings) {
    settings.upstream_refresh_margin = 7200;
}

#[tokio::test(flavor = "multi_thread")]
async fn rotating_the_upstream_app_revokes_all_sessions() {
    let h = Harness::start().await;
    let (_, alice) = h.session(&ALICE).await;
    let (_, bob) = h.session_at(OTHER_PLATFORM_CALLBACK, &BOB).await;

    let unchanged = h.broker.rotate_upstream_app(&app_config()).unwrap();
    assert_eq!(unchanged, AppRotation::Unchanged);

    let mut config = app_config();
    config.client_secret = "rotated-secret".to_string();
    let rotated = h.broker.rotate_upstream_app(&config).unwrap();
    assert_eq!(
        rotated,
        AppRotation::Rotated {
            changed: vec!["client_secret"],
            revoked: 4,
        }
    );

    for token in [&alice.access_token, &bob.access_token] {
        let result = h.broker.validate(token).await;
        assert!(matches!(result, Err(Error::Rejected(Rejection::Revoked))));
    }

    let stored = h.broker.store().get_upstream_app().unwrap().unwrap();
    assert_eq!(stored.config.client_secret, "rotated-secret");
}

#[tokio::test(flavor = "multi_thread")]
async fn new_application_id_carries_clients_and_users_along() {
    let h = Harness::start().await;
    let (client, tokens) = h.session(&ALICE).await;

    let mut config = app_config();
    config.application_id = "new-app-id".to_string();
    let rotated = h.broker.rotate_upstream_app(&config).unwrap();
    assert_eq!(
        rotated,
        AppRotation::Rotated {
            changed: vec!["application_id"],
            revoked: 2,
        }
    );

    let result = h.broker.validate(&tokens.access_token).await;
    assert!(matches!(result, Err(Error::Rejected(Rejection::Revoked))));

    let store = h.broker.store();
    let stored = store.get_client(&client.client_id).unwrap().unwrap();
    assert_eq!(stored.owner_application_id, "new-app-id");
    let user = store
        .get_upstream_user(&SubjectId(ALICE.subject()))
        .unwrap()
        .unwrap();
    assert_eq!(user.application_id, "new-app-id");

    // Logging in again under the new application converges on the same client.
    let (again, fresh) = h.session(&ALICE).await;
    let ctx = h.broker.validate(&fresh.access_token).await.unwrap();
    assert_eq!(ctx.client_id, again.client_id);
    assert_eq!(store.list_clients().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_upstream_session_is_renewed_on_validation() {
    let h = Harness::with_settings(always_refresh).await;
    let (_, tokens) = h.session(&ALICE).await;

    let ctx = h.broker.validate(&tokens.access_token).await.unwrap();
    assert_eq!(ctx.upstream_access_token, ALICE.renewed_access_token());

    let user = h
        .broker
        .store()
        .get_upstream_user(&SubjectId(ALICE.subject()))
        .unwrap()
        .unwrap();
    assert_eq!(user.access_token, ALICE.renewed_access_token());
    // The upstream did not rotate its refresh token, so the old one is kept.
    assert_eq!(user.refresh_token, Some(ALICE.refresh_token()));
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_upstream_leaves_the_ledger_untouched() {
    let h = Harness::with_settings(always_refresh).await;
    let (client, tokens) = h.session(&CAROL).await;
    let refresh = tokens.refresh_token.clone().unwrap();

    let result = h
        .broker
        .refresh(&credentials(&client), refresh.clone(), None)
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable(_)));
    assert_eq!(OAuthError::from(&err).kind, ErrorKind::TemporarilyUnavailable);

    let hash = HashingService::new().hash_without_salt(&refresh);
    let record = h.broker.store().get_token(&hash).unwrap().unwrap();
    assert_eq!(record.status, TokenStatus::Active);

    let validation = h.broker.validate(&tokens.access_token).await;
    assert!(matches!(validation, Err(Error::UpstreamUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_upstream_refresh_asks_for_reauthentication() {
    let h = Harness::with_settings(always_refresh).await;
    let (client, tokens) = h.session(&DAVE).await;
    let refresh = tokens.refresh_token.clone().unwrap();

    let err = h
        .broker
        .refresh(&credentials(&client), refresh.clone(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpstreamAuthFailed(_)));

    let wire = OAuthError::from(&err);
    assert_eq!(wire.kind, ErrorKind::InvalidGrant);
    assert_eq!(
        wire.description.as_deref(),
        Some("upstream_reauthentication_required")
    );

    let hash = HashingService::new().hash_without_salt(&refresh);
    let record = h.broker.store().get_token(&hash).unwrap().unwrap();
    assert_eq!(record.status, TokenStatus::Active);
}

#[tokio::test(flavor = "multi_thread")]
async fn disallowed_domain_cannot_complete_login() {
    let h = Harness::with_settings(|s| s.allowed_domains = vec!["contoso.com".to_string()]).await;
    let client = h.register().await;

    let err = h.login(&client, &EVE).await.unwrap_err();
    match err {
        MaybeRedirect::Redirected(r) => {
            assert_eq!(r.uri, redirect_uri(PLATFORM_CALLBACK));
            assert_eq!(r.params.inner.kind, ErrorKind::AccessDenied);
            assert_eq!(r.params.state.as_deref(), Some(PLATFORM_STATE));
        }
        MaybeRedirect::Direct(e) => panic!("expected a redirect, got {e:?}"),
    }

    let store = h.broker.store();
    assert!(store
        .get_upstream_user(&SubjectId(EVE.subject()))
        .unwrap()
        .is_none());
    assert!(!store.get_client(&client.client_id).unwrap().unwrap().is_assigned());

    assert!(h.login(&client, &ALICE).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_profile_lookup_aborts_the_attempt() {
    let h = Harness::start().await;
    let client = h.register().await;

    let rejected = h.login(&client, &FRANK).await.unwrap_err();
    assert!(matches!(
        rejected,
        MaybeRedirect::Redirected(ref r) if r.params.inner.kind == ErrorKind::AccessDenied
    ));

    let unavailable = h.login(&client, &GRACE).await.unwrap_err();
    assert!(matches!(
        unavailable,
        MaybeRedirect::Redirected(ref r) if r.params.inner.kind == ErrorKind::TemporarilyUnavailable
    ));

    let store = h.broker.store();
    assert!(!store.get_client(&client.client_id).unwrap().unwrap().is_assigned());
    for user in [FRANK, GRACE] {
        assert!(store
            .get_upstream_user(&SubjectId(user.subject()))
            .unwrap()
            .is_none());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn upstream_error_is_forwarded_to_the_platform() {
    let h = Harness::start().await;
    let client = h.register().await;
    let state = h.upstream_state(&client).await;

    let err = h
        .broker
        .callback(CallbackRequest {
            state: Some(state),
            error: Some("access_denied".to_string()),
            error_description: Some("user cancelled".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MaybeRedirect::Redirected(ref r)
            if r.params.inner.kind == ErrorKind::AccessDenied
                && r.params.state.as_deref() == Some(PLATFORM_STATE)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_state_is_a_direct_error() {
    let h = Harness::start().await;
    let client = h.register().await;
    let mut state = h.upstream_state(&client).await;
    state.push('A');

    let err = h
        .broker
        .callback(CallbackRequest {
            code: Some(ALICE.code()),
            state: Some(state),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MaybeRedirect::Direct(Error::InvalidRequest(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn authorize_checks_client_and_redirect_uri() {
    let h = Harness::start().await;
    let client = h.register().await;

    let mut req = authorization_request(&client);
    req.redirect_uri = redirect_uri("https://attacker.example/cb");
    assert!(matches!(
        h.broker.authorize(req).await,
        Err(Error::InvalidRequest(_))
    ));

    let mut req = authorization_request(&client);
    req.client_id = dcr_broker::core::types::ClientId("dcr_unknown".to_string());
    assert!(matches!(h.broker.authorize(req).await, Err(Error::InvalidClient)));

    let mut req = authorization_request(&client);
    req.code_challenge = None;
    assert!(matches!(
        h.broker.authorize(req).await,
        Err(Error::InvalidRequest(_))
    ));

    let url = h
        .broker
        .authorize(authorization_request(&client))
        .await
        .unwrap();
    assert_eq!(url.path(), format!("/{TENANT}/oauth2/v2.0/authorize"));
    assert!(url
        .query_pairs()
        .any(|(k, v)| k == "client_id" && v == "broker-app"));
}
