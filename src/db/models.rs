use diesel::prelude::*;

use super::schema::*;

#[derive(Debug, Clone)]
#[derive(Queryable, Insertable)]
#[diesel(table_name = upstream_app)]
pub struct UpstreamApp {
    pub application_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub redirect_uri: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
#[derive(Queryable, Insertable)]
#[diesel(table_name = upstream_users)]
pub struct UpstreamUser {
    pub subject_id: String,
    pub application_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: i64,
    pub scope: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
#[derive(Queryable, Insertable)]
#[diesel(table_name = clients)]
pub struct Client {
    pub client_id: String,
    pub client_secret: String,
    pub client_name: String,
    pub redirect_uris: String,
    pub primary_redirect_uri: String,
    pub grant_types: String,
    pub requested_scope: String,
    pub owner_application_id: String,
    pub subject_id: Option<String>,
    pub owner_email: Option<String>,
    pub session_hint: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
#[derive(Queryable, Insertable)]
#[diesel(table_name = tokens)]
pub struct Token {
    pub token_hash: String,
    pub client_id: String,
    pub token_type: String,
    pub status: String,
    pub subject_id: Option<String>,
    pub expires_at: i64,
    pub issued_at: i64,
    pub metadata: String,
}
