//! Runs each hosted service on its own worker thread.
//!
//! A worker initializes its registrar, registers the backend, then parks
//! until [`ServiceHost::stop`] and shuts the registrar down. Everything a
//! registrar does happens on that one thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::backend::ModuleLoader;
use crate::bus::BusRegistry;
use crate::policy::ServicePolicy;
use crate::registrar::ServiceRegistrar;

/// What happened to one service over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceReport {
    pub service: String,
    /// Policy accepted and registrar built
    pub initialized: bool,
    /// Name claimed and declaration exported
    pub exposed: bool,
    /// Backend accepted `DSMRegister`
    pub registered: bool,
    /// Backend released cleanly at shutdown
    pub released: bool,
}

struct Worker {
    service: String,
    stop: Sender<()>,
    handle: JoinHandle<ServiceReport>,
}

pub struct ServiceHost {
    workers: Vec<Worker>,
}

impl ServiceHost {
    /// Spawn one worker per policy.
    pub fn start(
        policies: Vec<ServicePolicy>,
        registry: Arc<BusRegistry>,
        loader: Arc<dyn ModuleLoader>,
        plugin_dir: PathBuf,
    ) -> Result<Self> {
        let mut workers = Vec::with_capacity(policies.len());
        for policy in policies {
            let service = policy.name.clone();
            let (stop, stopped) = mpsc::channel();
            let registry = registry.clone();
            let loader = loader.clone();
            let plugin_dir = plugin_dir.clone();

            let handle = thread::Builder::new()
                .name(format!("dsm:{}", service))
                .spawn(move || run_service(policy, &registry, loader, &plugin_dir, stopped))
                .with_context(|| format!("Failed to spawn worker for {}", service))?;

            workers.push(Worker {
                service,
                stop,
                handle,
            });
        }
        info!(count = workers.len(), "Service workers started");
        Ok(Self { workers })
    }

    pub fn services(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.service.as_str()).collect()
    }

    /// Signal every worker, wait for them, and collect their reports.
    pub fn stop(self) -> Vec<ServiceReport> {
        for worker in &self.workers {
            // A worker that already exited has dropped its receiver.
            let _ = worker.stop.send(());
        }
        self.workers
            .into_iter()
            .map(|worker| {
                worker.handle.join().unwrap_or_else(|_| {
                    error!("Worker for {} panicked", worker.service);
                    ServiceReport {
                        service: worker.service,
                        ..Default::default()
                    }
                })
            })
            .collect()
    }
}

fn run_service(
    policy: ServicePolicy,
    registry: &BusRegistry,
    loader: Arc<dyn ModuleLoader>,
    plugin_dir: &Path,
    stopped: Receiver<()>,
) -> ServiceReport {
    let mut report = ServiceReport {
        service: policy.name.clone(),
        ..Default::default()
    };

    let mut registrar = match ServiceRegistrar::initialize(policy, registry, loader, plugin_dir) {
        Ok(registrar) => registrar,
        Err(e) => {
            error!("Failed to initialize {}: {}", report.service, e);
            return report;
        }
    };
    report.initialized = true;
    report.exposed = registrar.is_exposed();
    report.registered = registrar.register_service();

    // Sender dropped counts as a stop request too.
    let _ = stopped.recv();

    report.released = registrar.shutdown();
    report
}
