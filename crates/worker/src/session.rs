// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session pool: one automation session per device, one unique service port
//! per session.
//!
//! All pool state lives behind a single mutex that is never held across a
//! driver call — ports are reserved under the lock, drivers are created and
//! probed outside it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use farm_core::event::PoolMetrics;

use crate::caps::Capabilities;
use crate::driver::http::WebDriverSession;
use crate::driver::{DriverError, UiDriver};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("session pool exhausted ({active}/{max})")]
    Exhausted { active: usize, max: usize },
    #[error("no free service port in pool")]
    PortsExhausted,
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Builds drivers from capabilities. The HTTP implementation talks to the
/// automation server; tests plug in scripted fakes.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(&self, caps: &Capabilities) -> Result<Arc<dyn UiDriver>, DriverError>;
}

pub struct HttpDriverFactory {
    pub automation_url: String,
}

#[async_trait]
impl DriverFactory for HttpDriverFactory {
    async fn create(&self, caps: &Capabilities) -> Result<Arc<dyn UiDriver>, DriverError> {
        let session = WebDriverSession::create(&self.automation_url, caps).await?;
        Ok(Arc::new(session))
    }
}

struct PoolState {
    free_ports: BTreeSet<u16>,
    used_ports: HashMap<String, u16>,
    drivers: HashMap<String, Arc<dyn UiDriver>>,
}

pub struct SessionPool {
    factory: Arc<dyn DriverFactory>,
    max_sessions: usize,
    port_lo: u16,
    port_hi: u16,
    idle_timeout: u32,
    app_package: String,
    app_activity: String,
    state: Mutex<PoolState>,
}

impl SessionPool {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        port_lo: u16,
        port_hi: u16,
        max_sessions: usize,
        idle_timeout: u32,
        app_package: impl Into<String>,
        app_activity: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            max_sessions,
            port_lo,
            port_hi,
            idle_timeout,
            app_package: app_package.into(),
            app_activity: app_activity.into(),
            state: Mutex::new(PoolState {
                free_ports: (port_lo..=port_hi).collect(),
                used_ports: HashMap::new(),
                drivers: HashMap::new(),
            }),
        }
    }

    /// Get or create the session for a device.
    ///
    /// A live existing session is reused; a stale one is purged and replaced.
    /// Fails fast with [`PoolError::Exhausted`] at capacity — never blocks.
    pub async fn create_session(&self, udid: &str) -> Result<Arc<dyn UiDriver>, PoolError> {
        let existing = { self.state.lock().drivers.get(udid).cloned() };
        if let Some(existing) = existing {
            if probe(existing.as_ref()).await {
                info!(device = udid, "reusing existing session");
                return Ok(existing);
            }
            warn!(device = udid, "stale session found, recreating");
            self.purge(udid, Some(existing)).await;
        }

        // Reserve capacity and a port in one critical section. The port
        // reservation is what bounds concurrent creates.
        let port = {
            let mut state = self.state.lock();
            if let Some(&port) = state.used_ports.get(udid) {
                port
            } else {
                if state.used_ports.len() >= self.max_sessions {
                    return Err(PoolError::Exhausted {
                        active: state.drivers.len(),
                        max: self.max_sessions,
                    });
                }
                let port = *state.free_ports.iter().next().ok_or(PoolError::PortsExhausted)?;
                state.free_ports.remove(&port);
                state.used_ports.insert(udid.to_owned(), port);
                port
            }
        };

        let caps = Capabilities::for_app(
            udid,
            port,
            &self.app_package,
            &self.app_activity,
            self.idle_timeout,
        );

        info!(device = udid, port, "creating automation session");
        match self.factory.create(&caps).await {
            Ok(driver) => {
                let existing = {
                    let mut state = self.state.lock();
                    match state.drivers.get(udid).cloned() {
                        // Another caller raced us to the same device; keep theirs.
                        Some(existing) => Some(existing),
                        None => {
                            state.drivers.insert(udid.to_owned(), driver.clone());
                            None
                        }
                    }
                };
                if let Some(existing) = existing {
                    let _ = driver.quit().await;
                    return Ok(existing);
                }
                Ok(driver)
            }
            Err(e) => {
                self.release_port(udid);
                warn!(device = udid, err = %e, "session creation failed");
                Err(e.into())
            }
        }
    }

    /// Existing session for a device, if any.
    pub fn get_session(&self, udid: &str) -> Option<Arc<dyn UiDriver>> {
        self.state.lock().drivers.get(udid).cloned()
    }

    /// Close a device's session. Driver quit is best-effort; the port is
    /// always released.
    pub async fn close_session(&self, udid: &str) {
        let driver = self.state.lock().drivers.remove(udid);
        self.purge(udid, driver).await;
        info!(device = udid, "session closed");
    }

    async fn purge(&self, udid: &str, driver: Option<Arc<dyn UiDriver>>) {
        self.state.lock().drivers.remove(udid);
        if let Some(driver) = driver {
            if let Err(e) = driver.quit().await {
                warn!(device = udid, err = %e, "error closing session");
            }
        }
        self.release_port(udid);
    }

    fn release_port(&self, udid: &str) {
        let mut state = self.state.lock();
        if let Some(port) = state.used_ports.remove(udid) {
            state.free_ports.insert(port);
        }
    }

    /// Probe every session and purge the unresponsive ones. Returns the
    /// number purged.
    pub async fn cleanup_stale(&self) -> usize {
        let sessions: Vec<(String, Arc<dyn UiDriver>)> = {
            let state = self.state.lock();
            state.drivers.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut purged = 0;
        for (udid, driver) in sessions {
            if !probe(driver.as_ref()).await {
                info!(device = %udid, "cleaning stale session");
                self.purge(&udid, Some(driver)).await;
                purged += 1;
            }
        }
        if purged > 0 {
            info!(purged, "cleaned stale sessions");
        }
        purged
    }

    pub async fn close_all(&self) {
        let udids: Vec<String> = self.state.lock().drivers.keys().cloned().collect();
        for udid in udids {
            self.close_session(&udid).await;
        }
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().drivers.len()
    }

    /// Pool metrics snapshot. `ready` reflects the automation server probe
    /// and is supplied by the caller.
    pub fn metrics(&self, ready: bool) -> PoolMetrics {
        let state = self.state.lock();
        let used: BTreeMap<String, u16> =
            state.used_ports.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let mut devices: Vec<String> = state.drivers.keys().cloned().collect();
        devices.sort();
        PoolMetrics {
            ready,
            active_sessions: state.drivers.len() as u32,
            max_sessions: self.max_sessions as u32,
            available_ports: state.free_ports.len() as u32,
            used_ports: used.into_iter().collect(),
            active_devices: devices,
            error: None,
        }
    }

    /// Total ports in the configured range.
    pub fn port_span(&self) -> u32 {
        (self.port_hi - self.port_lo + 1) as u32
    }
}

/// Liveness check: session id plus one cheap RPC that exercises the wire.
async fn probe(driver: &dyn UiDriver) -> bool {
    driver.session_id().await.is_ok() && driver.window_size().await.is_ok()
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
