//! # Jobs
//!
//! A `JOB` envelope's payload is decoded into a [`Job`] by a [`JobDecoder`]
//! and handed to the user's [`JobHandler`]. Whatever happens (a result, an
//! error, a decoding failure or a panic) the worker answers with a `JOBRES`
//! payload; failures are sent as their text.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

/// Unit of work sent by a job sender
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub data: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Job {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// JSON form understood by [`JsonJobDecoder`]
    pub fn to_payload(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Converts a raw `JOB` payload into a [`Job`]
pub trait JobDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> anyhow::Result<Job>;
}

/// Decodes JSON `{"data": ..., "headers": {...}}` payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonJobDecoder;

impl JobDecoder for JsonJobDecoder {
    fn decode(&self, payload: &[u8]) -> anyhow::Result<Job> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// The callable executed for every job
pub trait JobHandler: Send + Sync + 'static {
    fn handle(&self, job: Job) -> anyhow::Result<Vec<u8>>;
}

impl<F> JobHandler for F
where
    F: Fn(Job) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
{
    fn handle(&self, job: Job) -> anyhow::Result<Vec<u8>> {
        self(job)
    }
}

/// Result of executing one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(Vec<u8>),
    /// Text of the decoding error, handler error or panic
    Failed(String),
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed(_))
    }

    /// `JOBRES` payload; success and failure are encoded the same way
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            JobOutcome::Completed(result) => result,
            JobOutcome::Failed(error) => error.into_bytes(),
        }
    }
}

/// Decode and run a job, converting every failure into its text
pub fn execute(handler: &dyn JobHandler, decoder: &dyn JobDecoder, payload: &[u8]) -> JobOutcome {
    let job = match decoder.decode(payload) {
        Ok(job) => job,
        Err(e) => return JobOutcome::Failed(e.to_string()),
    };

    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(job))) {
        Ok(Ok(result)) => JobOutcome::Completed(result),
        Ok(Err(e)) => JobOutcome::Failed(e.to_string()),
        Err(panic) => JobOutcome::Failed(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "job handler panicked".to_string()
    }
}
