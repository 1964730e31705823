//! # Service Supervisor
//! Owns the long-running services (LLM handle, learning pipeline,
//! connector), sequences their startup, watches their health, restarts
//! a dropped connector, and tears everything down in reverse order
//! with a bounded timeout per service.
//!
//! One unhealthy core service is fatal to the whole process: there is
//! no partial-degradation mode.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::learning::config::env_parse;

/// Lifecycle contract every supervised service implements.
#[async_trait]
pub trait ManagedService: Send + Sync {
    fn name(&self) -> &'static str;
    async fn start(&self) -> Result<()>;
    /// Best-effort stop. The supervisor additionally bounds the call
    /// with the same timeout, so a hung implementation cannot stall
    /// shutdown.
    async fn stop(&self, timeout: Duration) -> Result<()>;
    async fn restart(&self) -> Result<()>;
    fn healthy(&self) -> bool;
    /// Liveness as seen by the reconnect monitor. Defaults to the
    /// health predicate; connectors override it with actual task
    /// liveness.
    fn running(&self) -> bool {
        self.healthy()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Created,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Health sweep interval.
    pub health_interval: Duration,
    /// Connector liveness check interval.
    pub reconnect_interval: Duration,
    /// Consecutive failed restarts before escalating to shutdown.
    pub max_reconnect_failures: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(60),
            max_reconnect_failures: 3,
        }
    }
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            health_interval: Duration::from_secs(env_parse(
                "SUPERVISOR_HEALTH_INTERVAL_SECS",
                d.health_interval.as_secs(),
            )),
            reconnect_interval: Duration::from_secs(env_parse(
                "SUPERVISOR_RECONNECT_INTERVAL_SECS",
                d.reconnect_interval.as_secs(),
            )),
            max_reconnect_failures: env_parse(
                "SUPERVISOR_MAX_RECONNECT_FAILURES",
                d.max_reconnect_failures,
            )
            .max(1),
        }
    }
}

struct ServiceSpec {
    service: Arc<dyn ManagedService>,
    stop_timeout: Duration,
    monitor_reconnect: bool,
}

struct Inner {
    cfg: SupervisorConfig,
    services: Mutex<Vec<ServiceSpec>>,
    state: Mutex<SupervisorState>,
    shutdown_tx: watch::Sender<bool>,
    monitors: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes shutdown so re-entry waits and then no-ops.
    shutdown_lock: AsyncMutex<()>,
}

#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(cfg: SupervisorConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                cfg,
                services: Mutex::new(Vec::new()),
                state: Mutex::new(SupervisorState::Created),
                shutdown_tx,
                monitors: Mutex::new(Vec::new()),
                shutdown_lock: AsyncMutex::new(()),
            }),
        }
    }

    /// Register a service. Startup order is registration order;
    /// shutdown is the reverse. Only valid before `start`.
    pub fn register(&self, service: Arc<dyn ManagedService>, stop_timeout: Duration) {
        self.register_spec(service, stop_timeout, false);
    }

    /// Register a connector-like service that the reconnect monitor
    /// should watch and restart.
    pub fn register_connector(&self, service: Arc<dyn ManagedService>, stop_timeout: Duration) {
        self.register_spec(service, stop_timeout, true);
    }

    fn register_spec(
        &self,
        service: Arc<dyn ManagedService>,
        stop_timeout: Duration,
        monitor_reconnect: bool,
    ) {
        let state = *self.inner.state.lock().expect("state mutex poisoned");
        if state != SupervisorState::Created {
            warn!(service = service.name(), "register after start ignored");
            return;
        }
        self.inner
            .services
            .lock()
            .expect("services mutex poisoned")
            .push(ServiceSpec {
                service,
                stop_timeout,
                monitor_reconnect,
            });
    }

    pub fn state(&self) -> SupervisorState {
        *self.inner.state.lock().expect("state mutex poisoned")
    }

    /// Start every registered service in order. A failure rolls back
    /// the already-started services in reverse order and leaves the
    /// supervisor stopped.
    pub async fn start(&self) -> Result<()> {
        {
            let mut st = self.inner.state.lock().expect("state mutex poisoned");
            if *st != SupervisorState::Created {
                anyhow::bail!("supervisor already started");
            }
            *st = SupervisorState::Initializing;
        }

        let mut started: Vec<usize> = Vec::new();
        let count = self
            .inner
            .services
            .lock()
            .expect("services mutex poisoned")
            .len();

        for idx in 0..count {
            let (service, name) = {
                let specs = self.inner.services.lock().expect("services mutex poisoned");
                (specs[idx].service.clone(), specs[idx].service.name())
            };
            info!(service = name, "starting service");
            match service.start().await {
                Ok(()) => started.push(idx),
                Err(e) => {
                    error!(service = name, error = ?e, "service failed to start, rolling back");
                    self.rollback(&started).await;
                    *self.inner.state.lock().expect("state mutex poisoned") =
                        SupervisorState::Stopped;
                    return Err(e).with_context(|| format!("starting service '{name}'"));
                }
            }
        }

        self.spawn_monitors();
        *self.inner.state.lock().expect("state mutex poisoned") = SupervisorState::Running;
        info!(services = count, "supervisor running");
        Ok(())
    }

    /// Start, then block until a shutdown signal (ctrl-c) or an
    /// internal escalation finishes tearing everything down.
    pub async fn run(&self) -> Result<()> {
        self.start().await?;
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                self.shutdown("shutdown signal received").await;
            }
            _ = shutdown_rx.changed() => {
                self.wait_until_stopped().await;
            }
        }
        Ok(())
    }

    /// Tear everything down: idempotent, bounded, best-effort. Safe to
    /// call from monitors and signal handlers alike.
    pub async fn shutdown(&self, reason: &str) {
        let _guard = self.inner.shutdown_lock.lock().await;
        {
            let mut st = self.inner.state.lock().expect("state mutex poisoned");
            match *st {
                SupervisorState::ShuttingDown | SupervisorState::Stopped => return,
                _ => *st = SupervisorState::ShuttingDown,
            }
        }
        info!(reason = %reason, "supervisor shutting down");
        let _ = self.inner.shutdown_tx.send(true);

        // Cancel monitors first: abort is non-blocking, so one stuck
        // monitor cannot block observation of the others.
        let monitors: Vec<JoinHandle<()>> = self
            .inner
            .monitors
            .lock()
            .expect("monitors mutex poisoned")
            .drain(..)
            .collect();
        for m in &monitors {
            m.abort();
        }
        for mut m in monitors {
            let _ = tokio::time::timeout(Duration::from_secs(1), &mut m).await;
        }

        // Stop services in reverse start order, each bounded by its
        // own timeout. Failures and timeouts are logged and skipped.
        let specs: Vec<(Arc<dyn ManagedService>, Duration)> = {
            let services = self.inner.services.lock().expect("services mutex poisoned");
            services
                .iter()
                .rev()
                .map(|s| (s.service.clone(), s.stop_timeout))
                .collect()
        };
        for (service, stop_timeout) in specs {
            let name = service.name();
            info!(service = name, "stopping service");
            match tokio::time::timeout(stop_timeout, service.stop(stop_timeout)).await {
                Ok(Ok(())) => info!(service = name, "service stopped"),
                Ok(Err(e)) => warn!(service = name, error = ?e, "service stop failed, continuing"),
                Err(_) => warn!(service = name, "service stop timed out, continuing"),
            }
        }

        // Safety net for anything spawned after the drain above.
        for m in self
            .inner
            .monitors
            .lock()
            .expect("monitors mutex poisoned")
            .drain(..)
        {
            m.abort();
        }

        *self.inner.state.lock().expect("state mutex poisoned") = SupervisorState::Stopped;
        info!("supervisor stopped");
    }

    async fn wait_until_stopped(&self) {
        loop {
            {
                let _guard = self.inner.shutdown_lock.lock().await;
                if self.state() == SupervisorState::Stopped {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn rollback(&self, started: &[usize]) {
        for &idx in started.iter().rev() {
            let (service, stop_timeout) = {
                let specs = self.inner.services.lock().expect("services mutex poisoned");
                (specs[idx].service.clone(), specs[idx].stop_timeout)
            };
            let name = service.name();
            warn!(service = name, "rolling back started service");
            match tokio::time::timeout(stop_timeout, service.stop(stop_timeout)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(service = name, error = ?e, "rollback stop failed"),
                Err(_) => warn!(service = name, "rollback stop timed out"),
            }
        }
    }

    fn spawn_monitors(&self) {
        let mut monitors = self.inner.monitors.lock().expect("monitors mutex poisoned");

        monitors.push(tokio::spawn(health_monitor(self.clone())));

        let has_connector = self
            .inner
            .services
            .lock()
            .expect("services mutex poisoned")
            .iter()
            .any(|s| s.monitor_reconnect);
        if has_connector {
            monitors.push(tokio::spawn(reconnect_monitor(self.clone())));
        }
    }

    fn snapshot_services(&self, reconnect_only: bool) -> Vec<Arc<dyn ManagedService>> {
        self.inner
            .services
            .lock()
            .expect("services mutex poisoned")
            .iter()
            .filter(|s| !reconnect_only || s.monitor_reconnect)
            .map(|s| s.service.clone())
            .collect()
    }

    /// Escalate from a monitor without cancelling the calling task
    /// mid-shutdown: the teardown runs in its own spawned task.
    fn escalate(&self, reason: String) {
        let sup = self.clone();
        tokio::spawn(async move {
            sup.shutdown(&reason).await;
        });
    }
}

/// Periodic health sweep. The first unhealthy service is fatal.
async fn health_monitor(sup: Supervisor) {
    let mut ticker = tokio::time::interval(sup.inner.cfg.health_interval);
    ticker.tick().await;
    let mut shutdown_rx = sup.inner.shutdown_tx.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {
                let unhealthy = sup
                    .snapshot_services(false)
                    .into_iter()
                    .find(|s| !s.healthy());
                if let Some(service) = unhealthy {
                    let reason =
                        format!("service '{}' reported unhealthy", service.name());
                    error!(service = service.name(), "health check failed");
                    sup.escalate(reason);
                    break;
                }
            }
        }
    }
}

/// Connector liveness watchdog: restart a dropped connector, escalate
/// after too many consecutive failures.
async fn reconnect_monitor(sup: Supervisor) {
    let mut ticker = tokio::time::interval(sup.inner.cfg.reconnect_interval);
    ticker.tick().await;
    let mut shutdown_rx = sup.inner.shutdown_tx.subscribe();
    let mut consecutive_failures: u32 = 0;
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {
                for service in sup.snapshot_services(true) {
                    if service.running() {
                        continue;
                    }
                    let name = service.name();
                    warn!(service = name, "connector not running, attempting restart");
                    match service.restart().await {
                        Ok(()) if service.running() => {
                            info!(service = name, "connector restarted");
                            consecutive_failures = 0;
                        }
                        outcome => {
                            consecutive_failures += 1;
                            warn!(
                                service = name,
                                failures = consecutive_failures,
                                error = ?outcome.err(),
                                "connector restart failed"
                            );
                            if consecutive_failures >= sup.inner.cfg.max_reconnect_failures {
                                let reason = format!(
                                    "connector '{}' failed to restart {} times",
                                    name, consecutive_failures
                                );
                                error!(service = name, "reconnect attempts exhausted");
                                sup.escalate(reason);
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}
