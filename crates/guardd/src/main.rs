mod api;
mod credentials;
mod diagnostic;
mod error;
mod host;
mod redirect;
mod state;
mod upload;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::credentials::CredentialStore;
use crate::diagnostic::DiagnosticCommand;
use crate::redirect::RedirectPolicy;
use crate::state::{AppState, SharedState};
use crate::upload::UploadRoot;

const SEED_PASSWORD_LEN: usize = 24;

/// guardd — diagnostic, login, upload and redirect endpoints behind strict input guards.
#[derive(Parser, Debug)]
#[command(name = "guardd", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:5000")]
    listen: SocketAddr,

    /// Directory for persistent state (credential database, seed password).
    #[arg(long, default_value = "/var/lib/guardd")]
    state_dir: PathBuf,

    /// Upload root. Defaults to <state-dir>/uploads.
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Largest accepted upload, in bytes.
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    max_upload_bytes: u64,

    /// Hosts allowed as absolute redirect targets (comma-separated).
    #[arg(long, default_value = "example.com")]
    redirect_allow: String,

    /// Diagnostic program, invoked as `<program> -c <count> <host>`.
    #[arg(long, default_value = "ping")]
    ping_program: String,

    /// Packets sent per diagnostic run.
    #[arg(long, default_value_t = 4)]
    ping_count: u32,

    /// Wall-clock limit for one diagnostic run, after which it is killed.
    #[arg(long, default_value_t = 10)]
    ping_timeout_secs: u64,

    /// Captured bytes per output stream of the diagnostic.
    #[arg(long, default_value_t = 64 * 1024)]
    max_output_bytes: usize,

    /// Username seeded into an empty credential store.
    #[arg(long, default_value = "admin")]
    seed_username: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // SECURITY: restrict file creation permissions — no world/group access
    unsafe {
        libc::umask(0o077);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!(
        listen = %args.listen,
        state_dir = %args.state_dir.display(),
        "starting guardd"
    );

    std::fs::create_dir_all(&args.state_dir).with_context(|| {
        format!("failed to create state directory {}", args.state_dir.display())
    })?;

    let store = CredentialStore::open(&args.state_dir.join("credentials.db"))?;
    seed_if_empty(&store, &args.seed_username, &args.state_dir)?;

    let upload_dir = args
        .upload_dir
        .clone()
        .unwrap_or_else(|| args.state_dir.join("uploads"));
    let uploads = UploadRoot::new(&upload_dir, args.max_upload_bytes)?;

    let redirects = RedirectPolicy::new(args.redirect_allow.split(','));
    for host in redirects.allowed_hosts() {
        tracing::info!(host, "redirect host allowed");
    }

    let diagnostic = DiagnosticCommand {
        program: args.ping_program.clone(),
        count: args.ping_count,
        timeout: Duration::from_secs(args.ping_timeout_secs),
        max_output_bytes: args.max_output_bytes,
    };

    tracing::info!(
        upload_root = %uploads.path().display(),
        max_upload_bytes = uploads.max_bytes(),
        program = %diagnostic.program,
        "guards configured"
    );

    let shared_state: SharedState = Arc::new(AppState {
        credentials: Mutex::new(store),
        uploads,
        redirects,
        diagnostic,
    });

    let app = api::router(shared_state);

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;

    tracing::info!(listen = %args.listen, "guardd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("guardd shutdown complete");
    Ok(())
}

/// Seed one account into an empty store. The generated password goes to a
/// 0600 file under the state directory, never to the log.
///
/// The account is inserted first; the file only ever names a password that
/// the store accepts. If the file cannot be written the account is removed
/// again so the next start seeds afresh.
fn seed_if_empty(store: &CredentialStore, username: &str, state_dir: &Path) -> Result<()> {
    if !store.is_empty()? {
        return Ok(());
    }

    let password = credentials::random_password(SEED_PASSWORD_LEN);
    store.add_user(username, &password)?;

    let secret_path = state_dir.join("initial-password");
    if let Err(e) = write_seed_secret(&secret_path, username, &password) {
        if let Err(rollback) = store.remove_user(username) {
            tracing::error!(error = %rollback, "failed to roll back seeded credential");
        }
        return Err(e);
    }

    tracing::info!(
        username,
        path = %secret_path.display(),
        "seeded initial credential"
    );
    Ok(())
}

fn write_seed_secret(path: &Path, username: &str, password: &str) -> Result<()> {
    std::fs::write(path, format!("{username}:{password}\n"))
        .with_context(|| format!("failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .context("failed to restrict seed password permissions")?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
