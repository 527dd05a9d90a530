//! The calling convention shared by host and backend libraries.
//!
//! A backend exports two C functions:
//!
//! ```c
//! int DSMRegister(const char *service_name, void *connection);
//! int DSMUnRegister(const char *service_name, void *connection);
//! ```
//!
//! `connection` points at the host's [`BusConnection`] for the duration of
//! the call. A return value of `0` is success; anything else is failure.

use std::ffi::CString;
use std::marker::PhantomData;
use std::path::Path;

use libc::{c_char, c_int, c_void};
use tracing::debug;

use crate::bus::BusConnection;
use crate::error::RegistrarError;

/// Signature of both entry points.
pub type EntryPointFn = unsafe extern "C" fn(*const c_char, *mut c_void) -> c_int;

pub const REGISTER_SYMBOL: &str = "DSMRegister";
pub const UNREGISTER_SYMBOL: &str = "DSMUnRegister";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPointKind {
    Register,
    Unregister,
}

impl EntryPointKind {
    pub fn symbol(self) -> &'static str {
        match self {
            EntryPointKind::Register => REGISTER_SYMBOL,
            EntryPointKind::Unregister => UNREGISTER_SYMBOL,
        }
    }
}

/// An entry point resolved from a loaded module.
///
/// Borrows the module it came from, so it cannot be called after unload.
pub struct EntryPoint<'m> {
    kind: EntryPointKind,
    func: EntryPointFn,
    _module: PhantomData<&'m ()>,
}

impl<'m> EntryPoint<'m> {
    /// # Safety
    ///
    /// `func` must have the [`EntryPointFn`] signature and stay valid for `'m`.
    pub unsafe fn new(kind: EntryPointKind, func: EntryPointFn) -> Self {
        Self {
            kind,
            func,
            _module: PhantomData,
        }
    }

    pub fn kind(&self) -> EntryPointKind {
        self.kind
    }

    /// Call the entry point with the service name and connection.
    ///
    /// `module` only labels errors.
    pub fn invoke(
        &self,
        service_name: &str,
        connection: &BusConnection,
        module: &Path,
    ) -> Result<(), RegistrarError> {
        let name = CString::new(service_name).map_err(|_| RegistrarError::InvalidServiceName {
            name: service_name.to_string(),
        })?;
        let symbol = self.kind.symbol();

        // SAFETY: the function came from a module that outlives `self`, and
        // both pointers stay valid until it returns.
        let code = unsafe { (self.func)(name.as_ptr(), connection.as_raw()) };
        debug!(service = %service_name, symbol, code, "Backend entry point returned");

        if code == 0 {
            Ok(())
        } else {
            Err(RegistrarError::BackendCallFailed {
                symbol,
                path: module.to_path_buf(),
                code,
            })
        }
    }
}
