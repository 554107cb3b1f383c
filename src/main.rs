use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prism::api::{self, AuthConfig, StubBackend};
use prism::client::PrismClient;
use prism::config::Config;
use prism::db::Database;
use prism::store::{LineageStore, DEFAULT_PAGE_SIZE};
use prism::tree_render::label;

#[derive(Parser)]
#[command(name = "prism")]
#[command(about = "Iterate on generated images, keeping every version")]
struct Cli {
    /// Backend base URL (overrides PRISM_API_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Session pointer database (overrides PRISM_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the in-memory development backend
    Stub {
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
    #[command(flatten)]
    Client(ClientCommand),
}

/// Commands that talk to a backend through the lineage store.
#[derive(Subcommand)]
enum ClientCommand {
    /// Generate a new root version from a description
    Generate { input: String },
    /// Revise the focused version
    Feedback {
        text: String,
        /// Revise this version instead of the focused one
        #[arg(long)]
        from: Option<u32>,
    },
    /// Branch a new version off an earlier one
    Rollback {
        version: u32,
        /// Edit to apply on top of the target
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Make a session the active one
    Open { session_id: String },
    /// Forget the active session; the next generate starts a new one
    New,
    /// Show the active session's version tree
    History,
    /// Show one version (default: the focused one)
    Show { version: Option<u32> },
    /// List sessions, most recent first
    Sessions {
        #[arg(long, default_value = "0")]
        offset: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,
    },
    /// Rename the active session
    Rename { name: String },
    /// Set the active session's description
    Describe { text: String },
    /// Delete a session
    Delete { session_id: String },
    /// Compile a prompt without generating
    Preview { input: String },
    /// Check that the backend is reachable
    Health,
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "prism=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_tree(store: &LineageStore) {
    if let Some(id) = store.session_id() {
        println!("session {}", id);
    }
    if let Some(tree) = store.version_tree() {
        print!("{}", tree);
    }
}

/// Precondition failures come back as `None` with the reason in `last_error`.
fn require<T>(store: &LineageStore, outcome: Option<T>) -> anyhow::Result<T> {
    outcome.ok_or_else(|| {
        anyhow::anyhow!(store
            .last_error()
            .unwrap_or_else(|| "operation not possible".to_string()))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::from_env()?;
    if let Some(url) = cli.url {
        config = config.with_api_url(url);
    }
    if let Some(path) = cli.db {
        config = config.with_db_path(path);
    }

    match cli.command {
        Commands::Stub { port } => serve_stub(&config, port).await,
        Commands::Client(command) => run(command, &config).await,
    }
}

async fn serve_stub(config: &Config, port: u16) -> anyhow::Result<()> {
    let auth = AuthConfig {
        api_key: config.api_key.clone(),
    };
    let app = api::create_router_with_auth(StubBackend::new(), auth);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    api::serve(listener, app).await?;
    Ok(())
}

async fn run(command: ClientCommand, config: &Config) -> anyhow::Result<()> {
    let db = match config.db_path {
        Some(ref path) => Database::open(path.clone()),
        None => Database::open_default(),
    }
    .context("opening the session database")?;
    db.migrate()?;

    let client = PrismClient::from_config(config);
    let store = LineageStore::new(Arc::new(client), Arc::new(db));
    store.hydrate().await;

    match command {
        ClientCommand::Generate { input } => {
            store.generate(&input).await?;
            print_tree(&store);
        }
        ClientCommand::Feedback { text, from } => {
            if let Some(version) = from {
                if !store.switch_focus(version) {
                    anyhow::bail!("version {} does not exist", version);
                }
            }
            let outcome = store.submit_feedback(&text).await?;
            require(&store, outcome)?;
            print_tree(&store);
        }
        ClientCommand::Rollback { version, feedback } => {
            let outcome = store
                .rollback_with_feedback(version, feedback.as_deref())
                .await?;
            require(&store, outcome)?;
            print_tree(&store);
        }
        ClientCommand::Open { session_id } => {
            store.switch_to_session(&session_id).await?;
            print_tree(&store);
        }
        ClientCommand::New => {
            store.reset();
            println!("no active session");
        }
        ClientCommand::History => match store.version_tree() {
            Some(_) => print_tree(&store),
            None => println!("no active session"),
        },
        ClientCommand::Show { version } => {
            let shown = store
                .with_session(|session, focus| {
                    let number = version.or(focus)?;
                    let v = session.version(number)?;
                    let path: Vec<String> = session
                        .ancestry(number)
                        .iter()
                        .map(|n| format!("v{}", n))
                        .collect();
                    Some(format!(
                        "{} {} ({})\nparent: {}\npath: {}\nimage: {}\n\n{}",
                        v.id,
                        v.origin.as_str(),
                        label(v),
                        v.parent_version_id().as_deref().unwrap_or("none"),
                        path.join(" <- "),
                        v.image_url,
                        v.prompt
                    ))
                })
                .flatten()
                .context("no such version")?;
            println!("{}", shown);
        }
        ClientCommand::Sessions { offset, limit } => {
            let list = store.list_sessions(offset, limit).await?;
            let active = store.session_id();
            for summary in &list.sessions {
                let marker = if active.as_deref() == Some(summary.id.as_str()) {
                    '*'
                } else {
                    ' '
                };
                println!(
                    "{} {}  {}  {} versions  {}",
                    marker,
                    summary.id,
                    summary.name.as_deref().unwrap_or("(untitled)"),
                    summary.version_count,
                    summary.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
            println!("{} of {} sessions", list.sessions.len(), list.total);
        }
        ClientCommand::Rename { name } => {
            let outcome = store.rename_session(&name).await?;
            print_json(&require(&store, outcome)?)?;
        }
        ClientCommand::Describe { text } => {
            let outcome = store.describe_session(&text).await?;
            print_json(&require(&store, outcome)?)?;
        }
        ClientCommand::Delete { session_id } => {
            let deleted = store.delete_session(&session_id).await?;
            print_json(&deleted)?;
        }
        ClientCommand::Preview { input } => {
            let preview = store.preview(&input).await?;
            println!("{}", preview.prompt);
        }
        ClientCommand::Health => {
            let health = store.health().await?;
            println!("{}", health.status);
        }
    }

    Ok(())
}
