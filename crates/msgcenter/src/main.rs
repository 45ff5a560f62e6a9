//! `msgcenter` - command-line front end for the message-center inbox.
//!
//! Keeps the inbox cache in a local `SQLite` database and the password in
//! the system keyring.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use msgcenter_api::{Credentials, MessageId};
use msgcenter_core::{Inbox, InboxConfig, Message, credentials, open_pool};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "msgcenter=info,msgcenter_core=info,msgcenter_api=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => default_path(dirs::config_dir(), "config.json")?,
    };
    let database_path = match cli.database {
        Some(path) => path,
        None => default_path(dirs::data_dir(), "msgcenter.db")?,
    };

    match cli.command {
        Commands::Login {
            user,
            channel,
            base_url,
            password,
        } => {
            let config = match base_url {
                Some(url) => {
                    let config = InboxConfig::new(&url)?;
                    config.save(&config_path).await?;
                    config
                }
                None => load_config(&config_path).await?,
            };
            let inbox = open_inbox(config, &database_path).await?;
            login(&inbox, user, channel, password).await?;
            sync(&inbox, false).await
        }
        Commands::Logout => {
            let inbox = open_inbox(load_config(&config_path).await?, &database_path).await?;
            logout(&inbox).await
        }
        Commands::Sync { retry } => {
            let inbox = open_inbox(load_config(&config_path).await?, &database_path).await?;
            restore_credentials(&inbox).await?;
            sync(&inbox, retry).await
        }
        Commands::List { all } => {
            let inbox = open_inbox(load_config(&config_path).await?, &database_path).await?;
            let messages = if all {
                inbox.all_messages().await?
            } else {
                inbox.messages().await?
            };
            print_messages(&messages);
            Ok(())
        }
        Commands::Read { id } => {
            let inbox = open_inbox(load_config(&config_path).await?, &database_path).await?;
            restore_credentials(&inbox).await?;
            let id = MessageId::new(id);
            if !inbox.mark_read(&id).await? {
                println!("{id}: nothing to do");
            }
            inbox.flush_pending().await;
            Ok(())
        }
        Commands::Delete { id } => {
            let inbox = open_inbox(load_config(&config_path).await?, &database_path).await?;
            restore_credentials(&inbox).await?;
            let id = MessageId::new(id);
            if !inbox.delete(&id).await? {
                println!("{id}: nothing to do");
            }
            inbox.flush_pending().await;
            Ok(())
        }
    }
}

fn default_path(base: Option<PathBuf>, file: &str) -> Result<PathBuf> {
    let base = base.context("Could not determine the platform directory")?;
    Ok(base.join("msgcenter").join(file))
}

async fn load_config(path: &Path) -> Result<InboxConfig> {
    InboxConfig::load(path).await.with_context(|| {
        format!(
            "Could not read {}; run `msgcenter login --base-url <URL>` first",
            path.display()
        )
    })
}

async fn open_inbox(config: InboxConfig, database: &Path) -> Result<Inbox> {
    if let Some(parent) = database.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let pool = open_pool(database)
        .await
        .with_context(|| format!("Could not open {}", database.display()))?;
    Ok(Inbox::new(config, pool).await?)
}

async fn login(
    inbox: &Inbox,
    user: String,
    channel: String,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(password) => {
            if let Err(e) = credentials::store_password(&user, &password) {
                warn!("Password not saved to keyring: {e}");
            }
            password
        }
        None => credentials::get_password(&user)?
            .context("No password given and none in the keyring; set MSGCENTER_PASSWORD")?,
    };

    let version = inbox
        .identity()
        .set_credentials(Credentials::new(user, password, channel))
        .await?;
    info!("Logged in (identity version {version})");
    Ok(())
}

async fn logout(inbox: &Inbox) -> Result<()> {
    if let Some((user, _)) = inbox.identity().bound_identity().await {
        credentials::delete_password(&user)?;
    }
    inbox.sign_out().await?;
    println!("Logged out");
    Ok(())
}

async fn restore_credentials(inbox: &Inbox) -> Result<()> {
    let Some((user, channel)) = inbox.identity().bound_identity().await else {
        bail!("Not logged in; run `msgcenter login` first");
    };
    let password = match std::env::var("MSGCENTER_PASSWORD") {
        Ok(password) => password,
        Err(_) => credentials::get_password(&user)?
            .with_context(|| format!("No password for {user} in the keyring"))?,
    };
    inbox
        .identity()
        .set_credentials(Credentials::new(user, password, channel))
        .await?;
    Ok(())
}

async fn sync(inbox: &Inbox, retry: bool) -> Result<()> {
    let result = if retry {
        inbox.refresh_with_retry().await
    } else {
        inbox.refresh().await
    };

    match result {
        Ok(messages) => {
            let unread = messages.iter().filter(|m| !m.is_read).count();
            println!("{} message(s), {unread} unread", messages.len());
            Ok(())
        }
        Err(e) => {
            let cached = inbox.messages().await?.len();
            bail!("Sync failed: {e} ({cached} cached message(s) still available)")
        }
    }
}

fn print_messages(messages: &[Message]) {
    let now = chrono::Utc::now();
    for message in messages {
        let mut flags = String::new();
        flags.push(if message.is_read { ' ' } else { '*' });
        flags.push(if message.is_deleted { 'D' } else { ' ' });
        flags.push(if message.is_expired(now) { 'X' } else { ' ' });
        flags.push(if message.dirty { '~' } else { ' ' });
        println!(
            "{flags} {:<24} {} {}",
            message.id,
            message.created_at.format("%Y-%m-%d %H:%M"),
            message.title.as_deref().unwrap_or("(no title)")
        );
    }
}
