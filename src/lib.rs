//! dsm-registrar: host D-Bus services whose backends are plugin libraries.
//!
//! Each hosted service is described by a [`ServicePolicy`]: a well-known bus
//! name, a bus, and a backend library. A [`ServiceRegistrar`] exposes the
//! service on its bus, loads the library, and drives the backend through two
//! exported C functions:
//!
//! ```c
//! int DSMRegister(const char *service_name, void *connection);
//! int DSMUnRegister(const char *service_name, void *connection);
//! ```
//!
//! A backend that is missing, fails to load, lacks an entry point or returns
//! non-zero never takes the host down; the operation just reports `false`
//! and the library is unloaded.

pub mod backend;
pub mod bus;
pub mod cli;
pub mod commands;
pub mod config;
pub mod declaration;
pub mod entry;
pub mod error;
pub mod host;
pub mod output;
pub mod policy;
pub mod registrar;

#[cfg(test)]
mod testing;

pub use backend::{BackendModule, DylibLoader, ModuleLoader, ServiceBackend};
pub use bus::{BusConnection, BusRegistry};
pub use cli::{Cli, Commands};
pub use error::{PolicyError, RegistrarError};
pub use host::{ServiceHost, ServiceReport};
pub use policy::{BusType, ServicePolicy};
pub use registrar::{BaseLifecycle, ServiceLifecycle, ServiceRegistrar};
