//! Lifecycle supervisor: startup ordering and exactly-once shutdown.
//!
//! ```text
//! Idle ──start()──▶ Starting ──settle delay──▶ Ready
//!                                               │
//!              signal / stdin EOF / drop ───────┘
//!                                               ▼
//!                                  ShuttingDown ──stop_all──▶ Stopped
//! ```
//!
//! Readiness is a fixed settle delay, not a probe: a slow child may still be
//! booting when the supervisor reports `Ready`.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::AssistantConfig;
use crate::error::AssistantError;
use crate::facade::{CONTEXT7_SERVER, STANDARDS_SERVER};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Ready,
    ShuttingDown,
    Stopped,
}

/// Owns the registry for the lifetime of the process.
#[derive(Debug)]
pub struct Supervisor {
    config: AssistantConfig,
    registry: Arc<Registry>,
    state: Mutex<LifecycleState>,
}

impl Supervisor {
    pub fn new(config: AssistantConfig) -> Self {
        let registry = Arc::new(Registry::new(config.restart_policy));
        Self {
            config,
            registry,
            state: Mutex::new(LifecycleState::Idle),
        }
    }

    /// Shared handle to the registry for the facade.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    /// Start `standards`, then `context7`, then wait out the settle delay.
    ///
    /// A server that fails to spawn is logged and left unavailable; the other
    /// one still starts. Calling this outside `Idle` does nothing.
    pub fn start(&self) {
        {
            let mut state = self.lock_state();
            if *state != LifecycleState::Idle {
                warn!(state = ?*state, "start ignored: supervisor is not idle");
                return;
            }
            *state = LifecycleState::Starting;
        }

        info!("starting internal MCP servers");
        for (name, spec) in [
            (STANDARDS_SERVER, &self.config.standards),
            (CONTEXT7_SERVER, &self.config.context7),
        ] {
            if self.state() != LifecycleState::Starting {
                warn!(server = name, "shutdown requested during startup, not starting");
                return;
            }
            match self.registry.start(name, spec) {
                Ok(handle) => info!(server = name, pid = handle.pid(), "server started"),
                Err(AssistantError::RegistryClosed { .. }) => {
                    warn!(server = name, "registry closed during startup, not starting");
                    return;
                }
                Err(e) => error!(server = name, error = %e, "server failed to start"),
            }
        }

        std::thread::sleep(self.config.settle_delay);

        let mut state = self.lock_state();
        if *state == LifecycleState::Starting {
            *state = LifecycleState::Ready;
            info!(servers = ?self.registry.snapshot(), "code assistant ready");
        }
    }

    /// Stop every child exactly once.
    ///
    /// Returns `true` for the call that performed the shutdown; any later or
    /// concurrent call returns `false` without touching the children. A
    /// concurrent caller waits for the first one to finish.
    pub fn shutdown(&self) -> bool {
        let mut state = self.lock_state();
        if matches!(*state, LifecycleState::ShuttingDown | LifecycleState::Stopped) {
            return false;
        }
        *state = LifecycleState::ShuttingDown;
        info!("shutting down code assistant");

        let stopped = self.registry.stop_all(self.config.grace_timeout);
        *state = LifecycleState::Stopped;
        info!(stopped, "all servers stopped");
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shut `supervisor` down and exit the process on SIGINT or SIGTERM.
///
/// Handlers are registered before this returns; the wait runs on a
/// dedicated thread with its own single-threaded runtime.
pub fn install_signal_handlers(supervisor: Arc<Supervisor>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    let listener = {
        let _guard = runtime.enter();
        SignalListener::register().context("failed to register signal handlers")?
    };

    std::thread::Builder::new()
        .name("signals".to_owned())
        .spawn(move || {
            let signal = runtime.block_on(listener.recv());
            info!(signal, "received signal, shutting down");
            supervisor.shutdown();
            std::process::exit(0);
        })
        .context("failed to spawn signal thread")?;

    Ok(())
}

#[cfg(unix)]
struct SignalListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    #[allow(clippy::unnecessary_wraps)]
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        "ctrl-c"
    }
}
