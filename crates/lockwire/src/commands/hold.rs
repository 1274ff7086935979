//! Hold a lock until another process asks for it

use std::path::Path;

use liblockwire_core::{LockId, LockwireConfig};
use liblockwire_ipc::{IpcError, OwnerRecord};
use tracing::{info, warn};

use crate::cli::Cli;
use crate::error::CliError;
use crate::output::{output_json, print_human};

pub async fn run(
    cli: &Cli,
    config: &LockwireConfig,
    record_path: &Path,
    lock_id: Option<LockId>,
    name: &str,
) -> Result<(), CliError> {
    let (resolver, handler) = super::start_handler(config).await?;
    let lock_id = lock_id.unwrap_or_else(|| LockId::new(rand::random()));
    let mut requests = handler.register_owned(lock_id).await;

    let record = OwnerRecord::new(
        lock_id,
        handler.local_port(),
        resolver.hostname(),
        name.to_string(),
    );
    if let Err(e) = record.write(record_path) {
        handler.stop().await;
        return Err(e.into());
    }

    info!(lock_id = %lock_id, port = record.port, "Holding lock for {}", name);
    print_human(
        cli,
        &format!(
            "Holding lock {} for {} on port {} (record: {})",
            lock_id,
            name,
            record.port,
            record_path.display()
        ),
    );

    let (requester, listening) = tokio::select! {
        request = requests.recv() => match request {
            Some(request) => (Some(request.requester), true),
            None => (None, false),
        },
        _ = shutdown_signal() => (None, true),
    };
    match requester {
        Some(requester) => info!(lock_id = %lock_id, "Release requested by {}", requester),
        None if listening => info!(lock_id = %lock_id, "Shutting down"),
        None => warn!(lock_id = %lock_id, "Stopped hearing release requests"),
    }

    // The record goes first so a confirmed requester never finds a stale one
    let removed = OwnerRecord::release(record_path);
    handler.lock_released(lock_id).await;
    handler.stop().await;
    removed?;
    if !listening {
        return Err(IpcError::ListenerFailed.into());
    }

    output_json(
        cli,
        serde_json::json!({
            "lock_id": lock_id,
            "port": record.port,
            "released_to": requester.map(|r| r.to_string()),
        }),
    );
    match requester {
        Some(requester) => print_human(cli, &format!("Released lock {} to {}", lock_id, requester)),
        None => print_human(cli, &format!("Released lock {}", lock_id)),
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
