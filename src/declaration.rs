//! The object every hosted service exports at [`DECLARATION_PATH`].
//!
//! Clients address it by the service's well-known name; the path is the same
//! for every service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Object path of the declaration object.
pub const DECLARATION_PATH: &str = "/PrivateDeclaration";

/// Registrar state mirrored onto the bus.
#[derive(Debug, Default)]
pub struct DeclarationState {
    backend_loaded: AtomicBool,
    registered: AtomicBool,
}

impl DeclarationState {
    pub fn set_backend_loaded(&self, loaded: bool) {
        self.backend_loaded.store(loaded, Ordering::SeqCst);
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    pub fn backend_loaded(&self) -> bool {
        self.backend_loaded.load(Ordering::SeqCst)
    }

    pub fn registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }
}

/// D-Bus face of a [`ServiceRegistrar`](crate::ServiceRegistrar).
pub struct PrivateDeclaration {
    service: String,
    state: Arc<DeclarationState>,
}

impl PrivateDeclaration {
    pub fn new(service: impl Into<String>, state: Arc<DeclarationState>) -> Self {
        Self {
            service: service.into(),
            state,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

#[zbus::interface(name = "org.dsm.PrivateDeclaration")]
impl PrivateDeclaration {
    /// Well-known name of the hosted service.
    #[zbus(property)]
    fn service_name(&self) -> String {
        self.service.clone()
    }

    /// Whether a backend library is currently loaded.
    #[zbus(property)]
    fn backend_loaded(&self) -> bool {
        self.state.backend_loaded()
    }

    /// Whether the backend accepted its last `DSMRegister` call.
    #[zbus(property)]
    fn registered(&self) -> bool {
        self.state.registered()
    }
}
