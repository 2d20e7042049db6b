//! # Worker Identity
//!
//! A worker is addressed by the endpoint its job socket binds to. Identity
//! templates may carry the `$WID` token so that one configuration yields a
//! distinct address per worker process. Addresses on the `ipc://` transport
//! are backed by a socket file that is removed once the worker shuts down.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::constants::{IPC_SCHEME, PROCESS_ID_TOKEN};

/// Resolved, immutable worker address
#[derive(Debug)]
pub struct WorkerIdentity {
    address: String,
    ipc_path: Option<PathBuf>,
    cleaned: AtomicBool,
}

impl WorkerIdentity {
    /// Resolve an identity template for the given process id
    pub fn resolve(template: &str, process_id: u32) -> Self {
        let address = if template.contains(PROCESS_ID_TOKEN) {
            template.replace(PROCESS_ID_TOKEN, &process_id.to_string())
        } else {
            template.to_string()
        };

        let ipc_path = address
            .strip_prefix(IPC_SCHEME)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        if let Some(path) = &ipc_path {
            debug!(
                address = %address,
                path = %path.display(),
                "Registered ipc socket file for cleanup"
            );
        }

        Self {
            address,
            ipc_path,
            cleaned: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Backing socket file when the address uses the local ipc transport
    pub fn ipc_path(&self) -> Option<&Path> {
        self.ipc_path.as_deref()
    }

    /// Remove the backing ipc socket file. Runs at most once; a missing file
    /// is not an error.
    pub fn cleanup(&self) {
        let Some(path) = &self.ipc_path else {
            return;
        };
        if self.cleaned.swap(true, Ordering::AcqRel) {
            return;
        }

        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "🧹 Removed ipc socket file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove ipc socket file"
            ),
        }
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}
