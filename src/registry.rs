//! Tool-server registry: named child processes owned by the supervisor.
//!
//! The registry is an ordinary value shared through an `Arc`, not global
//! state. Entries are created by [`Registry::start`] and only removed by
//! [`Registry::stop_all`], which also closes the registry for good.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AssistantError, AssistantResult};
use crate::process::{ChildHandle, LaunchSpec};

/// What `start` does when the name is already registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Return the existing handle without checking that it is alive.
    #[default]
    Reuse,
    /// Replace the entry if its process has exited.
    RestartIfDead,
}

/// Observed state of a registered server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Running,
    Stopped,
}

impl ServerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSnapshot {
    pub name: String,
    pub pid: u32,
    pub state: ServerState,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Table {
    servers: HashMap<String, Arc<ChildHandle>>,
    closed: bool,
}

/// Process-wide table of named tool servers.
#[derive(Debug, Default)]
pub struct Registry {
    table: Mutex<Table>,
    policy: RestartPolicy,
}

impl Registry {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            policy,
        }
    }

    pub const fn policy(&self) -> RestartPolicy {
        self.policy
    }

    /// Start `name` unless it is already registered.
    ///
    /// The registry lock is held across the spawn, so two callers racing on
    /// the same name still end up with one process, and a spawn can never
    /// land after [`Registry::stop_all`] has drained the table.
    pub fn start(&self, name: &str, spec: &LaunchSpec) -> AssistantResult<Arc<ChildHandle>> {
        let mut table = self.lock();
        if table.closed {
            return Err(AssistantError::RegistryClosed {
                name: name.to_owned(),
            });
        }

        if let Some(existing) = table.servers.get(name) {
            match self.policy {
                RestartPolicy::Reuse => return Ok(Arc::clone(existing)),
                RestartPolicy::RestartIfDead if existing.is_alive() => {
                    return Ok(Arc::clone(existing));
                }
                RestartPolicy::RestartIfDead => {
                    warn!(
                        server = name,
                        pid = existing.pid(),
                        "registered server has exited, restarting"
                    );
                    existing.shutdown(Duration::ZERO);
                    table.servers.remove(name);
                }
            }
        }

        let handle = Arc::new(ChildHandle::spawn(name, spec)?);
        table.servers.insert(name.to_owned(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Look up a registered server.
    pub fn get(&self, name: &str) -> Option<Arc<ChildHandle>> {
        self.lock().servers.get(name).cloned()
    }

    /// Running/stopped state of every registered server.
    ///
    /// An exited process is reported as stopped while its entry remains.
    pub fn status(&self) -> BTreeMap<String, ServerState> {
        self.lock()
            .servers
            .iter()
            .map(|(name, handle)| (name.clone(), state_of(handle)))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<ServerSnapshot> {
        let mut entries: Vec<ServerSnapshot> = self
            .lock()
            .servers
            .values()
            .map(|handle| ServerSnapshot {
                name: handle.name().to_owned(),
                pid: handle.pid(),
                state: state_of(handle),
                started_at: handle.started_at(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn len(&self) -> usize {
        self.lock().servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().servers.is_empty()
    }

    /// Clear and close the registry, then shut every server down.
    ///
    /// Each server gets up to `grace` to exit before it is killed. Returns the
    /// number of entries that were drained; a repeat call returns 0. Later
    /// calls to [`Registry::start`] fail with `RegistryClosed`.
    pub fn stop_all(&self, grace: Duration) -> usize {
        let drained: Vec<(String, Arc<ChildHandle>)> = {
            let mut table = self.lock();
            table.closed = true;
            table.servers.drain().collect()
        };
        let count = drained.len();
        for (name, handle) in drained {
            info!(server = %name, pid = handle.pid(), "stopping tool server");
            handle.shutdown(grace);
        }
        count
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn state_of(handle: &ChildHandle) -> ServerState {
    if handle.is_alive() {
        ServerState::Running
    } else {
        ServerState::Stopped
    }
}
