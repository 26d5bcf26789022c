use clap::Parser;
use url::Url;

use crate::auth::Store;
use crate::config::UpstreamOptions;
use crate::core::models::AppRotation;
use crate::core::types::{unix_now, ClientId};
use crate::db::DbStore;
use crate::provider::error::Error;
use crate::provider::rotation::log_rotation;
use crate::util::crypto::{EncryptionKey, Encrypter};

#[derive(Parser)]
#[command(
    name = "dcr-broker-util",
    version = env!("CARGO_PKG_VERSION"),
    about = "Operator tooling for the DCR broker database"
)]
pub struct Options {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: EncryptionKey,
    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand)]
enum SubCommand {
    /// Apply pending database migrations.
    Migrate,
    ShowApp,
    /// Store new upstream credentials, revoking all sessions if they differ.
    RotateApp(RotateApp),
    ListClients,
    DeleteClient(ClientArg),
    /// Revoke every bearer and refresh token of one client.
    RevokeClient(ClientArg),
    Sweep(Sweep),
}

#[derive(clap::Args)]
struct RotateApp {
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8001")]
    public_url: Url,
    #[command(flatten)]
    upstream: UpstreamOptions,
}

#[derive(clap::Args)]
struct ClientArg {
    #[arg(short, long)]
    id: String,
}

#[derive(clap::Args)]
struct Sweep {
    #[arg(long, env = "STALE_CLIENT_HOURS", default_value_t = 24)]
    stale_client_hours: i64,
}

fn get_database(opts: &Options) -> Result<DbStore, Error> {
    let store = DbStore::acquire(&opts.database_url, Encrypter::new(&opts.encryption_key))?;
    store.migrate()?;
    Ok(store)
}

fn show_app(db: &DbStore) -> Result<(), Error> {
    match db.get_upstream_app()? {
        Some(app) => {
            println!("application_id: {}", app.config.application_id);
            println!("tenant_id:      {}", app.config.tenant_id);
            println!("redirect_uri:   {}", app.config.redirect_uri);
            println!("updated_at:     {}", app.updated_at);
        }
        None => println!("No upstream application configured"),
    }
    Ok(())
}

fn rotate_app(c: &RotateApp, db: &DbStore) -> Result<(), Error> {
    let outcome = db.rotate_upstream_app(&c.upstream.app_config(&c.public_url))?;
    log_rotation(&outcome);

    match outcome {
        AppRotation::Created => println!("Stored upstream application"),
        AppRotation::Unchanged => println!("Upstream application unchanged"),
        AppRotation::Rotated { changed, revoked } => println!(
            "Rotated upstream application ({}); revoked {revoked} tokens",
            changed.join(", ")
        ),
    }
    Ok(())
}

fn list_clients(db: &DbStore) -> Result<(), Error> {
    for client in db.list_clients()? {
        let owner = client
            .subject_id
            .as_ref()
            .map(|s| s.0.as_str())
            .unwrap_or("-");
        println!(
            "{} (name: \"{}\", subject: {}, uris: {})",
            client.id,
            client.name,
            owner,
            client
                .redirect_uris
                .iter()
                .map(|u| u.0.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        );
    }
    Ok(())
}

fn delete_client(c: &ClientArg, db: &DbStore) -> Result<(), Error> {
    if db.delete_client(&ClientId(c.id.clone()))? {
        println!("Deleted {}", c.id);
    } else {
        println!("No client {}", c.id);
    }
    Ok(())
}

fn revoke_client(c: &ClientArg, db: &DbStore) -> Result<(), Error> {
    let revoked = db.revoke_client_tokens(&ClientId(c.id.clone()))?;
    println!("Revoked {revoked} tokens of {}", c.id);
    Ok(())
}

fn sweep(c: &Sweep, db: &DbStore) -> Result<(), Error> {
    let now = unix_now();
    let report = db.sweep(now, now - c.stale_client_hours.max(1) * 3600)?;
    println!(
        "Expired {} tokens, removed {} stale clients",
        report.expired_tokens, report.removed_clients
    );
    Ok(())
}

pub fn run_cli_action(opts: Options) -> Result<(), Error> {
    let db = get_database(&opts)?;

    match &opts.command {
        SubCommand::Migrate => Ok(()),
        SubCommand::ShowApp => show_app(&db),
        SubCommand::RotateApp(c) => rotate_app(c, &db),
        SubCommand::ListClients => list_clients(&db),
        SubCommand::DeleteClient(c) => delete_client(c, &db),
        SubCommand::RevokeClient(c) => revoke_client(c, &db),
        SubCommand::Sweep(c) => sweep(c, &db),
    }
}
