#![allow(dead_code)]

pub mod fake_transport;

pub use fake_transport::*;

use powerhose_worker::{Job, WorkerConfig};

/// Fast timings so lifecycle tests finish quickly
pub fn fast_config() -> WorkerConfig {
    let mut config = WorkerConfig::new("ipc:///tmp/powerhose-test-front.ipc", "tcp://127.0.0.1:$WID");
    config.timeout_seconds = 0.1;
    config.heartbeat.interval_seconds = 0.02;
    config.heartbeat.max_failures = 3;
    config.shutdown_grace_ms = 0;
    config
}

pub fn upper(job: Job) -> anyhow::Result<Vec<u8>> {
    Ok(job.data.to_uppercase().into_bytes())
}

/// `JOB:::<json job>` frame
pub fn job_frame(data: &str) -> Vec<u8> {
    let mut frame = b"JOB:::".to_vec();
    frame.extend(Job::new(data).to_payload());
    frame
}
