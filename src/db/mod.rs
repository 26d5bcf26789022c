pub mod models;
pub mod schema;

use std::fmt::Debug;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::upsert::excluded;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use tokio::task::block_in_place;
use tracing::{event, Level};

use crate::auth::Store;
use crate::core::models::{
    AppRotation, Client, CompletedLogin, NewClient, SweepReport, TokenRecord, UpstreamApp,
    UpstreamAppConfig, UpstreamUser,
};
use crate::core::types::{
    unix_now, ClientId, ClientSecret, GrantType, HashedToken, RedirectUri, Scope, SubjectId,
    TokenStatus, TokenType,
};
use crate::provider::error::Error;
use crate::util::crypto::Encrypter;

use schema::clients::dsl as c;
use schema::tokens::dsl as t;
use schema::upstream_app::dsl as a;
use schema::upstream_users::dsl as u;

pub const MIGRATIONS: EmbeddedMigrations = diesel_migrations::embed_migrations!("migrations");

type Manager = ConnectionManager<SqliteConnection>;

#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON; \
             PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
            self.busy_timeout.as_millis()
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub struct DbStore {
    pool: Pool<Manager>,
    encrypter: Encrypter,
}

impl DbStore {
    pub fn acquire(uri: &str, encrypter: Encrypter) -> Result<Self, Error> {
        let pool = Pool::builder()
            .max_size(8)
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout: Duration::from_secs(5),
            }))
            .build(ConnectionManager::new(uri))?;
        Ok(Self { pool, encrypter })
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, Error> {
        Ok(self.pool.get()?)
    }

    pub fn migrate(&self) -> Result<(), Error> {
        let mut conn = self.conn()?;
        let applied = block_in_place(|| {
            conn.run_pending_migrations(MIGRATIONS)
                .map(|versions| versions.len())
                .map_err(|e| Error::Migration(e.to_string()))
        })?;
        event!(Level::INFO, count = applied, "Ran migrations");
        Ok(())
    }

    fn app_from_row(&self, row: models::UpstreamApp) -> Result<UpstreamApp, Error> {
        Ok(UpstreamApp {
            config: UpstreamAppConfig {
                application_id: row.application_id,
                client_secret: self.encrypter.open(&row.client_secret)?,
                tenant_id: row.tenant_id,
                redirect_uri: row.redirect_uri,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn user_from_row(&self, row: models::UpstreamUser) -> Result<UpstreamUser, Error> {
        let refresh_token = row
            .refresh_token
            .map(|token| self.encrypter.open(&token))
            .transpose()?;

        Ok(UpstreamUser {
            subject_id: SubjectId(row.subject_id),
            application_id: row.application_id,
            access_token: self.encrypter.open(&row.access_token)?,
            refresh_token,
            expires_at: row.expires_at,
            scope: row.scope,
            email: row.email,
            display_name: row.display_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn user_to_row(&self, user: &UpstreamUser) -> Result<models::UpstreamUser, Error> {
        let refresh_token = user
            .refresh_token
            .as_deref()
            .map(|token| self.encrypter.seal(token))
            .transpose()?;

        Ok(models::UpstreamUser {
            subject_id: user.subject_id.0.clone(),
            application_id: user.application_id.clone(),
            access_token: self.encrypter.seal(&user.access_token)?,
            refresh_token,
            expires_at: user.expires_at,
            scope: user.scope.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        })
    }

    fn client_from_row(&self, row: models::Client) -> Result<Client, Error> {
        let redirect_uris: Vec<RedirectUri> = serde_json::from_str(&row.redirect_uris)?;
        let grant_types: Vec<GrantType> = serde_json::from_str(&row.grant_types)?;

        Ok(Client {
            id: ClientId(row.client_id),
            secret: ClientSecret(self.encrypter.open(&row.client_secret)?),
            name: row.client_name,
            redirect_uris,
            grant_types,
            scope: Scope::from_delimited_parts(&row.requested_scope),
            owner_application_id: row.owner_application_id,
            subject_id: row.subject_id.map(SubjectId),
            owner_email: row.owner_email,
            session_hint: row.session_hint,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Debug for DbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbStore").finish()
    }
}

fn corrupt(message: String) -> Error {
    Error::Db(diesel::result::Error::DeserializationError(message.into()))
}

fn token_from_row(row: models::Token) -> Result<TokenRecord, Error> {
    Ok(TokenRecord {
        hash: HashedToken(row.token_hash),
        client_id: ClientId(row.client_id),
        token_type: row.token_type.parse().map_err(corrupt)?,
        status: row.status.parse().map_err(corrupt)?,
        subject_id: row.subject_id.map(SubjectId),
        expires_at: row.expires_at,
        issued_at: row.issued_at,
        metadata: serde_json::from_str(&row.metadata)?,
    })
}

fn token_to_row(record: &TokenRecord) -> Result<models::Token, Error> {
    Ok(models::Token {
        token_hash: record.hash.0.clone(),
        client_id: record.client_id.0.clone(),
        token_type: record.token_type.as_str().to_string(),
        status: record.status.as_str().to_string(),
        subject_id: record.subject_id.as_ref().map(|s| s.0.clone()),
        expires_at: record.expires_at,
        issued_at: record.issued_at,
        metadata: serde_json::to_string(&record.metadata)?,
    })
}

const SESSION_TOKEN_TYPES: [&str; 2] = ["bearer", "refresh"];

fn upsert_user_in(conn: &mut SqliteConnection, row: &models::UpstreamUser) -> Result<(), Error> {
    diesel::insert_into(u::upstream_users)
        .values(row)
        .on_conflict(u::subject_id)
        .do_update()
        .set((
            u::application_id.eq(excluded(u::application_id)),
            u::access_token.eq(excluded(u::access_token)),
            u::refresh_token.eq(excluded(u::refresh_token)),
            u::expires_at.eq(excluded(u::expires_at)),
            u::scope.eq(excluded(u::scope)),
            u::email.eq(excluded(u::email)),
            u::display_name.eq(excluded(u::display_name)),
            u::updated_at.eq(excluded(u::updated_at)),
        ))
        .execute(conn)?;
    Ok(())
}

fn lists_redirect_uri(row: &models::Client, uri: &RedirectUri) -> bool {
    serde_json::from_str::<Vec<RedirectUri>>(&row.redirect_uris)
        .map(|uris| uris.contains(uri))
        .unwrap_or(false)
}

/// Binds `client_id` to `subject`, retiring it in favour of an existing assignment
/// of the same subject on the same platform. Returns the id the client is now known by.
fn assign_in(
    conn: &mut SqliteConnection,
    client_id: &ClientId,
    subject: &SubjectId,
    email: Option<&str>,
    redirect_uri: &RedirectUri,
    now: i64,
) -> Result<ClientId, Error> {
    let current = c::clients
        .find(&client_id.0)
        .first::<models::Client>(conn)
        .optional()?
        .ok_or(Error::InvalidClient)?;

    if current.subject_id.as_deref() == Some(subject.0.as_str()) {
        diesel::update(c::clients.find(&current.client_id))
            .set((c::owner_email.eq(email), c::updated_at.eq(now)))
            .execute(conn)?;
        return Ok(client_id.clone());
    }

    if let Some(previous) = current.subject_id.as_deref() {
        event!(
            Level::WARN,
            client_id = %current.client_id,
            previous_subject = %previous,
            subject_id = %subject,
            "Reassigning client to a different subject"
        );
    }

    // A user converges onto one client per platform, whoever held this row before.
    let survivor = c::clients
        .filter(c::owner_application_id.eq(&current.owner_application_id))
        .filter(c::subject_id.eq(&subject.0))
        .filter(c::client_id.ne(&current.client_id))
        .order(c::updated_at.desc())
        .load::<models::Client>(conn)?
        .into_iter()
        .find(|row| lists_redirect_uri(row, redirect_uri));

    if let Some(survivor) = survivor {
        // The survivor takes over the credentials the platform now holds;
        // its own tokens follow the new id through ON UPDATE CASCADE.
        diesel::delete(c::clients.find(&current.client_id)).execute(conn)?;
        diesel::update(c::clients.find(&survivor.client_id))
            .set((
                c::client_id.eq(&current.client_id),
                c::client_secret.eq(&current.client_secret),
                c::client_name.eq(&current.client_name),
                c::session_hint.eq(current.session_hint.as_ref().or(survivor.session_hint.as_ref())),
                c::owner_email.eq(email),
                c::updated_at.eq(now),
            ))
            .execute(conn)?;

        event!(
            Level::INFO,
            client_id = %current.client_id,
            replaced = %survivor.client_id,
            subject_id = %subject,
            "Merged redundant client into existing assignment"
        );
        return Ok(client_id.clone());
    }

    diesel::update(c::clients.find(&current.client_id))
        .set((
            c::subject_id.eq(&subject.0),
            c::owner_email.eq(email),
            c::updated_at.eq(now),
        ))
        .execute(conn)?;

    Ok(client_id.clone())
}

impl Store for DbStore {
    fn get_upstream_app(&self) -> Result<Option<UpstreamApp>, Error> {
        let mut conn = self.conn()?;
        let row = block_in_place(|| {
            a::upstream_app
                .first::<models::UpstreamApp>(&mut *conn)
                .optional()
        })?;

        row.map(|r| self.app_from_row(r)).transpose()
    }

    fn rotate_upstream_app(&self, config: &UpstreamAppConfig) -> Result<AppRotation, Error> {
        let mut conn = self.conn()?;
        let now = unix_now();
        let sealed_secret = self.encrypter.seal(config.client_secret.trim())?;

        block_in_place(|| {
            conn.immediate_transaction::<_, Error, _>(|conn| {
                let current = a::upstream_app
                    .first::<models::UpstreamApp>(conn)
                    .optional()?;

                let Some(current) = current else {
                    diesel::insert_into(a::upstream_app)
                        .values(&models::UpstreamApp {
                            application_id: config.application_id.trim().to_string(),
                            client_secret: sealed_secret,
                            tenant_id: config.tenant_id.trim().to_string(),
                            redirect_uri: config.redirect_uri.trim().to_string(),
                            created_at: now,
                            updated_at: now,
                        })
                        .execute(conn)?;
                    return Ok(AppRotation::Created);
                };

                // An undecryptable secret counts as changed so a new key can be rolled in.
                let stored = UpstreamAppConfig {
                    application_id: current.application_id.clone(),
                    client_secret: self.encrypter.open(&current.client_secret).unwrap_or_default(),
                    tenant_id: current.tenant_id.clone(),
                    redirect_uri: current.redirect_uri.clone(),
                };
                let changed = stored.changed_fields(config);
                if changed.is_empty() {
                    return Ok(AppRotation::Unchanged);
                }

                diesel::update(a::upstream_app.find(&current.application_id))
                    .set((
                        a::application_id.eq(config.application_id.trim()),
                        a::client_secret.eq(&sealed_secret),
                        a::tenant_id.eq(config.tenant_id.trim()),
                        a::redirect_uri.eq(config.redirect_uri.trim()),
                        a::updated_at.eq(now),
                    ))
                    .execute(conn)?;

                let revoked = diesel::update(
                    t::tokens
                        .filter(t::status.eq(TokenStatus::Active.as_str()))
                        .filter(t::token_type.eq_any(SESSION_TOKEN_TYPES)),
                )
                .set(t::status.eq(TokenStatus::Revoked.as_str()))
                .execute(conn)?;

                Ok(AppRotation::Rotated { changed, revoked })
            })
        })
    }

    fn upsert_upstream_user(&self, user: &UpstreamUser) -> Result<(), Error> {
        let row = self.user_to_row(user)?;
        let mut conn = self.conn()?;
        block_in_place(|| conn.immediate_transaction(|conn| upsert_user_in(conn, &row)))
    }

    fn get_upstream_user(&self, subject: &SubjectId) -> Result<Option<UpstreamUser>, Error> {
        let mut conn = self.conn()?;
        let row = block_in_place(|| {
            u::upstream_users
                .find(&subject.0)
                .first::<models::UpstreamUser>(&mut *conn)
                .optional()
        })?;

        row.map(|r| self.user_from_row(r)).transpose()
    }

    fn register_client(&self, new: &NewClient) -> Result<Client, Error> {
        let primary = new.primary_redirect_uri().ok_or_else(|| {
            Error::InvalidRedirectUri("at least one redirect uri is required".to_string())
        })?;
        let now = unix_now();
        let fresh = models::Client {
            client_id: new.id.0.clone(),
            client_secret: self.encrypter.seal(new.secret.as_ref())?,
            client_name: new.name.clone(),
            redirect_uris: serde_json::to_string(&new.redirect_uris)?,
            primary_redirect_uri: primary.0.clone(),
            grant_types: serde_json::to_string(&new.grant_types)?,
            requested_scope: new.scope.as_joined(),
            owner_application_id: String::new(),
            subject_id: None,
            owner_email: None,
            session_hint: new.session_hint.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn()?;
        let row = block_in_place(|| {
            conn.immediate_transaction::<_, Error, _>(|conn| {
                let application_id = a::upstream_app
                    .select(a::application_id)
                    .first::<String>(conn)
                    .optional()?
                    .ok_or(Error::NotConfigured)?;

                if let Some(hint) = &new.session_hint {
                    let by_session = c::clients
                        .filter(c::owner_application_id.eq(&application_id))
                        .filter(c::session_hint.eq(hint))
                        .order(c::updated_at.desc())
                        .first::<models::Client>(conn)
                        .optional()?;
                    if let Some(existing) = by_session {
                        event!(Level::DEBUG, client_id = %existing.client_id, "Reusing client for session");
                        return Ok(existing);
                    }
                }

                let pending = c::clients
                    .filter(c::owner_application_id.eq(&application_id))
                    .filter(c::primary_redirect_uri.eq(&primary.0))
                    .filter(c::subject_id.is_null())
                    .order(c::created_at.desc())
                    .first::<models::Client>(conn)
                    .optional()?;
                if let Some(mut pending) = pending {
                    if let Some(hint) = &new.session_hint {
                        diesel::update(c::clients.find(&pending.client_id))
                            .set((c::session_hint.eq(hint), c::updated_at.eq(now)))
                            .execute(conn)?;
                        pending.session_hint = Some(hint.clone());
                        pending.updated_at = now;
                    }
                    event!(Level::DEBUG, client_id = %pending.client_id, "Reusing unassigned client");
                    return Ok(pending);
                }

                let row = models::Client {
                    owner_application_id: application_id,
                    ..fresh
                };
                diesel::insert_into(c::clients).values(&row).execute(conn)?;
                Ok(row)
            })
        })?;

        self.client_from_row(row)
    }

    fn get_client(&self, client_id: &ClientId) -> Result<Option<Client>, Error> {
        let mut conn = self.conn()?;
        let row = block_in_place(|| {
            c::clients
                .find(&client_id.0)
                .first::<models::Client>(&mut *conn)
                .optional()
        })?;

        row.map(|r| self.client_from_row(r)).transpose()
    }

    fn list_clients(&self) -> Result<Vec<Client>, Error> {
        let mut conn = self.conn()?;
        let rows = block_in_place(|| {
            c::clients
                .order(c::created_at.asc())
                .load::<models::Client>(&mut *conn)
        })?;

        rows.into_iter().map(|r| self.client_from_row(r)).collect()
    }

    fn delete_client(&self, client_id: &ClientId) -> Result<bool, Error> {
        let mut conn = self.conn()?;
        let deleted = block_in_place(|| {
            diesel::delete(c::clients.find(&client_id.0)).execute(&mut *conn)
        })?;
        Ok(deleted > 0)
    }

    fn assign_user(
        &self,
        client_id: &ClientId,
        subject: &SubjectId,
        email: Option<&str>,
        redirect_uri: &RedirectUri,
    ) -> Result<ClientId, Error> {
        let mut conn = self.conn()?;
        let now = unix_now();
        block_in_place(|| {
            conn.immediate_transaction(|conn| {
                assign_in(conn, client_id, subject, email, redirect_uri, now)
            })
        })
    }

    fn complete_login(&self, login: &CompletedLogin) -> Result<ClientId, Error> {
        let user = self.user_to_row(&login.user)?;
        let mut code = token_to_row(&login.code)?;
        let now = unix_now();

        let mut conn = self.conn()?;
        block_in_place(|| {
            conn.immediate_transaction::<_, Error, _>(|conn| {
                upsert_user_in(conn, &user)?;

                let effective = assign_in(
                    conn,
                    &login.client_id,
                    &login.user.subject_id,
                    login.user.email.as_deref(),
                    &login.redirect_uri,
                    now,
                )?;

                let superseded = diesel::delete(
                    t::tokens
                        .filter(t::client_id.eq(&effective.0))
                        .filter(t::token_type.eq(TokenType::AuthorizationCode.as_str()))
                        .filter(t::status.eq(TokenStatus::Active.as_str())),
                )
                .execute(conn)?;
                if superseded > 0 {
                    event!(Level::DEBUG, client_id = %effective, superseded, "Dropped older pending codes");
                }

                code.client_id = effective.0.clone();
                diesel::insert_into(t::tokens).values(&code).execute(conn)?;

                Ok(effective)
            })
        })
    }

    fn get_token(&self, hash: &HashedToken) -> Result<Option<TokenRecord>, Error> {
        let mut conn = self.conn()?;
        let row = block_in_place(|| {
            t::tokens
                .find(&hash.0)
                .first::<models::Token>(&mut *conn)
                .optional()
        })?;

        row.map(token_from_row).transpose()
    }

    fn transition_token(
        &self,
        hash: &HashedToken,
        from: TokenStatus,
        to: TokenStatus,
    ) -> Result<bool, Error> {
        let mut conn = self.conn()?;
        let changed = block_in_place(|| {
            diesel::update(
                t::tokens
                    .filter(t::token_hash.eq(&hash.0))
                    .filter(t::status.eq(from.as_str())),
            )
            .set(t::status.eq(to.as_str()))
            .execute(&mut *conn)
        })?;
        Ok(changed == 1)
    }

    fn redeem_token(
        &self,
        hash: &HashedToken,
        token_type: TokenType,
        to: TokenStatus,
        issue: &[TokenRecord],
    ) -> Result<bool, Error> {
        let rows = issue
            .iter()
            .map(token_to_row)
            .collect::<Result<Vec<_>, _>>()?;
        let now = unix_now();

        let mut conn = self.conn()?;
        block_in_place(|| {
            conn.immediate_transaction::<_, Error, _>(|conn| {
                let claimed = diesel::update(
                    t::tokens
                        .filter(t::token_hash.eq(&hash.0))
                        .filter(t::token_type.eq(token_type.as_str()))
                        .filter(t::status.eq(TokenStatus::Active.as_str()))
                        .filter(t::expires_at.gt(now)),
                )
                .set(t::status.eq(to.as_str()))
                .execute(conn)?;

                if claimed != 1 {
                    return Ok(false);
                }

                diesel::insert_into(t::tokens).values(&rows).execute(conn)?;
                Ok(true)
            })
        })
    }

    fn revoke_client_tokens(&self, client_id: &ClientId) -> Result<usize, Error> {
        let mut conn = self.conn()?;
        let revoked = block_in_place(|| {
            diesel::update(
                t::tokens
                    .filter(t::client_id.eq(&client_id.0))
                    .filter(t::status.eq(TokenStatus::Active.as_str()))
                    .filter(t::token_type.eq_any(SESSION_TOKEN_TYPES)),
            )
            .set(t::status.eq(TokenStatus::Revoked.as_str()))
            .execute(&mut *conn)
        })?;
        Ok(revoked)
    }

    fn sweep(&self, now: i64, stale_before: i64) -> Result<SweepReport, Error> {
        let mut conn = self.conn()?;
        block_in_place(|| {
            conn.immediate_transaction::<_, Error, _>(|conn| {
                let expired_tokens = diesel::update(
                    t::tokens
                        .filter(t::status.eq(TokenStatus::Active.as_str()))
                        .filter(t::expires_at.le(now)),
                )
                .set(t::status.eq(TokenStatus::Expired.as_str()))
                .execute(conn)?;

                let live_clients = t::tokens
                    .filter(t::status.eq(TokenStatus::Active.as_str()))
                    .select(t::client_id);

                let removed_clients = diesel::delete(
                    c::clients
                        .filter(c::subject_id.is_null())
                        .filter(c::created_at.lt(stale_before))
                        .filter(diesel::dsl::not(c::client_id.eq_any(live_clients))),
                )
                .execute(conn)?;

                Ok(SweepReport {
                    expired_tokens,
                    removed_clients,
                })
            })
        })
    }
}
