table! {
    upstream_app (application_id) {
        application_id -> Text,
        client_secret -> Text,
        tenant_id -> Text,
        redirect_uri -> Text,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

table! {
    upstream_users (subject_id) {
        subject_id -> Text,
        application_id -> Text,
        access_token -> Text,
        refresh_token -> Nullable<Text>,
        expires_at -> BigInt,
        scope -> Text,
        email -> Nullable<Text>,
        display_name -> Nullable<Text>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

table! {
    clients (client_id) {
        client_id -> Text,
        client_secret -> Text,
        client_name -> Text,
        redirect_uris -> Text,
        primary_redirect_uri -> Text,
        grant_types -> Text,
        requested_scope -> Text,
        owner_application_id -> Text,
        subject_id -> Nullable<Text>,
        owner_email -> Nullable<Text>,
        session_hint -> Nullable<Text>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

table! {
    tokens (token_hash) {
        token_hash -> Text,
        client_id -> Text,
        token_type -> Text,
        status -> Text,
        subject_id -> Nullable<Text>,
        expires_at -> BigInt,
        issued_at -> BigInt,
        metadata -> Text,
    }
}

joinable!(tokens -> clients (client_id));
joinable!(clients -> upstream_app (owner_application_id));
joinable!(upstream_users -> upstream_app (application_id));

allow_tables_to_appear_in_same_query!(
    clients,
    tokens,
    upstream_app,
    upstream_users,
);
