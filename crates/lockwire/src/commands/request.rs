//! Ask the owner of a lock to release it

use std::path::Path;

use liblockwire_core::LockwireConfig;
use liblockwire_ipc::{OwnerRecord, ReleaseOutcome};

use crate::cli::Cli;
use crate::error::CliError;
use crate::output::{output_json, print_human};

pub async fn run(
    cli: &Cli,
    config: &LockwireConfig,
    record_path: &Path,
    timeout_ms: Option<u64>,
) -> Result<(), CliError> {
    let record = OwnerRecord::read(record_path)?.ok_or_else(|| {
        CliError::NotFound(format!("no owner record at {}", record_path.display()))
    })?;

    let mut config = config.clone();
    if let Some(timeout_ms) = timeout_ms {
        if timeout_ms == 0 {
            return Err(CliError::InvalidArgs(
                "--timeout-ms must be greater than 0".to_string(),
            ));
        }
        config.contention.release_timeout_ms = timeout_ms;
    }

    let (_, handler) = super::start_handler(&config).await?;
    let outcome = handler
        .request_release(record.port, record.lock_id, &record.display_name)
        .await;
    handler.stop().await;
    let outcome = outcome?;

    output_json(
        cli,
        serde_json::json!({
            "lock_id": record.lock_id,
            "owner_pid": record.pid,
            "port": record.port,
            "outcome": outcome,
        }),
    );

    if outcome != ReleaseOutcome::Released {
        return Err(CliError::NotReleased(outcome));
    }
    print_human(
        cli,
        &format!(
            "Lock {} ({}) released by process {}",
            record.lock_id, record.display_name, record.pid
        ),
    );
    Ok(())
}
