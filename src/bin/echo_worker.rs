//! Echo Worker Binary
//!
//! Runs a single worker whose handler returns each job's data unchanged.
//! Configuration comes from the file given as the first argument (or
//! `POWERHOSE_CONFIG`) layered under `POWERHOSE_*` environment variables.

use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use powerhose_worker::logging::init_structured_logging;
use powerhose_worker::{ExitReason, Job, WorkerConfig, WorkerNode, ZmqTransport};

fn echo(job: Job) -> anyhow::Result<Vec<u8>> {
    Ok(job.data.into_bytes())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_structured_logging();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("POWERHOSE_CONFIG").ok())
        .map(PathBuf::from);
    let config = WorkerConfig::load(config_path.as_deref())?;

    info!(endpoint = %config.endpoint, identity = %config.identity, "Starting echo worker");

    let node = WorkerNode::new(config, echo, ZmqTransport::new())?;
    let runner = {
        let node = node.clone();
        tokio::task::spawn_blocking(move || node.run())
    };
    tokio::pin!(runner);

    let result = tokio::select! {
        result = &mut runner => result,
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            node.stop();
            runner.await
        }
    }?;

    match result {
        Ok(ExitReason::Stopped) => {
            info!("Echo worker stopped");
            Ok(())
        }
        Ok(reason) => {
            error!(reason = %reason, "Echo worker exited abnormally");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Echo worker failed");
            Err(e.into())
        }
    }
}
