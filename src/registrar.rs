//! The service registrar.
//!
//! [`ServiceRegistrar`] ties one policy to one bus connection and one backend
//! library. Hosts call [`initialize`](ServiceRegistrar::initialize), then
//! [`register_service`](ServiceRegistrar::register_service) and on teardown
//! [`unregister_service`](ServiceRegistrar::unregister_service) or
//! [`shutdown`](ServiceRegistrar::shutdown).
//!
//! A missing or broken backend is never fatal: the service stays on the bus
//! and the operation reports `false`.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{BackendModule, ModuleLoader, ServiceBackend};
use crate::bus::{BusConnection, BusRegistry};
use crate::declaration::{DECLARATION_PATH, DeclarationState, PrivateDeclaration};
use crate::error::{PolicyError, RegistrarError};
use crate::policy::ServicePolicy;

/// Generic registration steps the owning service runs after the backend
/// accepted (or released) the service.
pub trait ServiceLifecycle: Send {
    fn register(&mut self, policy: &ServicePolicy);

    fn unregister(&mut self, policy: &ServicePolicy);
}

/// Lifecycle that only logs.
#[derive(Debug, Default)]
pub struct BaseLifecycle;

impl ServiceLifecycle for BaseLifecycle {
    fn register(&mut self, policy: &ServicePolicy) {
        info!(service = %policy.name, "Service registered");
    }

    fn unregister(&mut self, policy: &ServicePolicy) {
        info!(service = %policy.name, "Service unregistered");
    }
}

pub struct ServiceRegistrar {
    policy: ServicePolicy,
    connection: BusConnection,
    backend: BackendModule,
    lifecycle: Box<dyn ServiceLifecycle>,
    state: Arc<DeclarationState>,
    exposed: bool,
    /// This registrar's object is the one served at `DECLARATION_PATH`
    owns_declaration: bool,
    registered: bool,
}

impl ServiceRegistrar {
    /// Expose the service on its bus and load its backend.
    ///
    /// Only an invalid policy fails. Bus and load errors are logged and
    /// leave the registrar without exposure or without a backend.
    pub fn initialize(
        policy: ServicePolicy,
        registry: &BusRegistry,
        loader: Arc<dyn ModuleLoader>,
        plugin_dir: &Path,
    ) -> Result<Self, PolicyError> {
        policy.validate()?;
        info!(
            service = %policy.name,
            bus = %policy.bus,
            plugin = %policy.plugin_path,
            "Initializing service"
        );

        let connection = registry.resolve(policy.bus, policy.bus_override());
        let state = Arc::new(DeclarationState::default());

        let (exposed, owns_declaration) = match expose(&connection, &policy.name, state.clone())
        {
            Ok(owns) => (true, owns),
            Err(e) => {
                warn!("Failed to expose {} on {}: {}", policy.name, connection.key(), e);
                (false, false)
            }
        };

        let mut backend = BackendModule::new(policy.module_path(plugin_dir), loader);
        match backend.load() {
            Ok(()) => {}
            Err(e) if e.is_backendless() => {
                info!(service = %policy.name, "No backend library: {}", e);
            }
            Err(e) => warn!("Failed to load backend for {}: {}", policy.name, e),
        }
        state.set_backend_loaded(backend.is_loaded());

        Ok(Self {
            policy,
            connection,
            backend,
            lifecycle: Box::new(BaseLifecycle),
            state,
            exposed,
            owns_declaration,
            registered: false,
        })
    }

    /// Replace the lifecycle run after successful backend calls.
    pub fn with_lifecycle(mut self, lifecycle: impl ServiceLifecycle + 'static) -> Self {
        self.lifecycle = Box::new(lifecycle);
        self
    }

    /// Call `DSMRegister`. True only if the backend returned 0.
    pub fn register_service(&mut self) -> bool {
        let result = self.try_register();
        report(&self.policy.name, "register", result)
    }

    /// Call `DSMUnRegister`. True only if the backend returned 0.
    pub fn unregister_service(&mut self) -> bool {
        let result = self.try_unregister();
        report(&self.policy.name, "unregister", result)
    }

    /// [`register_service`](Self::register_service) with the failure cause.
    pub fn try_register(&mut self) -> Result<(), RegistrarError> {
        info!(service = %self.policy.name, "Registering service");
        let result = self.backend.register(&self.policy.name, &self.connection);
        self.state.set_backend_loaded(self.backend.is_loaded());
        result?;

        self.registered = true;
        self.state.set_registered(true);
        self.lifecycle.register(&self.policy);
        Ok(())
    }

    /// [`unregister_service`](Self::unregister_service) with the failure cause.
    pub fn try_unregister(&mut self) -> Result<(), RegistrarError> {
        info!(service = %self.policy.name, "Unregistering service");
        let result = self.backend.unregister(&self.policy.name, &self.connection);
        self.state.set_backend_loaded(self.backend.is_loaded());
        result?;

        self.registered = false;
        self.state.set_registered(false);
        self.lifecycle.unregister(&self.policy);
        Ok(())
    }

    /// Try loading the backend again after it was found absent or unloaded.
    pub fn reload_backend(&mut self) -> Result<(), RegistrarError> {
        let result = self.backend.load();
        self.state.set_backend_loaded(self.backend.is_loaded());
        result
    }

    /// Unregister if registered, withdraw from the bus, unload the backend.
    ///
    /// Returns false if a registered backend refused to unregister.
    pub fn shutdown(mut self) -> bool {
        let released = !self.registered || self.unregister_service();
        if self.exposed {
            if let Err(e) = withdraw(&self.connection, &self.policy.name, self.owns_declaration) {
                warn!("Failed to withdraw {} from the bus: {}", self.policy.name, e);
            }
            self.exposed = false;
            self.owns_declaration = false;
        }
        self.backend.unload();
        self.state.set_backend_loaded(false);
        debug!(service = %self.policy.name, released, "Registrar shut down");
        released
    }

    pub fn policy(&self) -> &ServicePolicy {
        &self.policy
    }

    pub fn connection(&self) -> &BusConnection {
        &self.connection
    }

    pub fn is_exposed(&self) -> bool {
        self.exposed
    }

    /// Whether this registrar's declaration object is the one served on its
    /// connection. Registrars sharing a connection share the object path, and
    /// only the first to export owns it.
    pub fn owns_declaration(&self) -> bool {
        self.owns_declaration
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn backend_loaded(&self) -> bool {
        self.backend.is_loaded()
    }
}

/// Claim the service name and export the declaration object.
///
/// Returns whether the export took the object path.
fn expose(
    connection: &BusConnection,
    name: &str,
    state: Arc<DeclarationState>,
) -> Result<bool, RegistrarError> {
    let session = connection.session()?;
    session.request_name(name)?;
    let owns = session.export_declaration(PrivateDeclaration::new(name, state))?;
    if !owns {
        debug!(
            service = %name,
            "{} already served on {}",
            DECLARATION_PATH,
            connection.key()
        );
    }
    Ok(owns)
}

/// Release the service name, and the declaration object if it is ours.
fn withdraw(
    connection: &BusConnection,
    name: &str,
    owns_declaration: bool,
) -> Result<(), RegistrarError> {
    let session = connection.session()?;
    if owns_declaration {
        session.withdraw_declaration()?;
    }
    session.release_name(name)?;
    Ok(())
}

fn report(service: &str, action: &str, result: Result<(), RegistrarError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_backendless() => {
            info!(service = %service, "Cannot {} without a backend: {}", action, e);
            false
        }
        Err(e) => {
            warn!("Failed to {} {}: {}", action, service, e);
            false
        }
    }
}
