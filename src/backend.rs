//! Backend library loading.
//!
//! A [`BackendModule`] owns at most one loaded library. Entry points are
//! looked up by name on every call and never cached; any lookup or call
//! failure unloads the library, so a module is either fully usable or
//! absent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, info, warn};

use crate::bus::BusConnection;
use crate::entry::{EntryPoint, EntryPointFn, EntryPointKind};
use crate::error::RegistrarError;

/// A library opened by a [`ModuleLoader`].
pub trait LoadedModule: Send {
    /// Exact-name lookup of a symbol with the entry-point signature.
    fn entry_point(&self, symbol: &str) -> Option<EntryPointFn>;
}

/// Probes and opens backend libraries.
pub trait ModuleLoader: Send + Sync {
    /// Whether `path` denotes something worth trying to open.
    fn is_library(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Box<dyn LoadedModule>, RegistrarError>;
}

/// Production loader on `libloading`.
pub struct DylibLoader;

struct DylibModule {
    library: Library,
}

impl LoadedModule for DylibModule {
    fn entry_point(&self, symbol: &str) -> Option<EntryPointFn> {
        // SAFETY: the symbol is typed by the entry-point ABI contract. The
        // copied function pointer is only used while `library` stays loaded,
        // which `EntryPoint`'s borrow enforces.
        unsafe { self.library.get::<EntryPointFn>(symbol.as_bytes()) }
            .ok()
            .map(|sym| *sym)
    }
}

impl ModuleLoader for DylibLoader {
    fn is_library(&self, path: &Path) -> bool {
        is_library(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn LoadedModule>, RegistrarError> {
        // SAFETY: loading a backend runs its initializers; backends are
        // trusted by deployment.
        let library = unsafe { Library::new(path) }.map_err(|source| {
            RegistrarError::LoadFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Box::new(DylibModule { library }))
    }
}

/// Platform check that `path` is a regular file named like a shared library.
pub fn is_library(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.is_file() && has_library_suffix(name)
}

/// `libfoo.so`, `libfoo.so.1.2` on ELF platforms; `.dylib`, `.bundle` and
/// `.so` on macOS; `.dll` on Windows.
pub fn has_library_suffix(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();

    if cfg!(windows) {
        return parts.len() > 1
            && !parts[0].is_empty()
            && parts.last().is_some_and(|ext| ext.eq_ignore_ascii_case("dll"));
    }

    let with_suffix = |suffix: &str| {
        parts.iter().rposition(|p| *p == suffix).is_some_and(|i| {
            i > 0
                && !parts[..i].concat().is_empty()
                && parts[i + 1..]
                    .iter()
                    .all(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
        })
    };

    if cfg!(target_os = "macos") {
        with_suffix("dylib") || with_suffix("bundle") || with_suffix("so")
    } else {
        with_suffix("so")
    }
}

/// The two operations a backend provides.
pub trait ServiceBackend {
    fn register(
        &mut self,
        service: &str,
        connection: &BusConnection,
    ) -> Result<(), RegistrarError>;

    fn unregister(
        &mut self,
        service: &str,
        connection: &BusConnection,
    ) -> Result<(), RegistrarError>;
}

/// One backend library and its load state.
pub struct BackendModule {
    path: PathBuf,
    loader: Arc<dyn ModuleLoader>,
    library: Option<Box<dyn LoadedModule>>,
}

impl BackendModule {
    /// An absent module for `path`. Nothing is opened until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            path: path.into(),
            loader,
            library: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.library.is_some()
    }

    /// Open the library if the probe accepts the path.
    ///
    /// Already loaded is a no-op. On error the module stays absent.
    pub fn load(&mut self) -> Result<(), RegistrarError> {
        if self.library.is_some() {
            return Ok(());
        }
        if !self.loader.is_library(&self.path) {
            debug!(path = %self.path.display(), "Not a loadable library, skipping");
            return Err(RegistrarError::NotALibrary {
                path: self.path.clone(),
            });
        }
        info!(path = %self.path.display(), "Loading backend library");
        self.library = Some(self.loader.open(&self.path)?);
        Ok(())
    }

    /// Look up an entry point. A missing symbol unloads the module.
    pub fn resolve_entry_point(
        &mut self,
        kind: EntryPointKind,
    ) -> Result<EntryPoint<'_>, RegistrarError> {
        let Some(library) = self.library.as_ref() else {
            return Err(RegistrarError::BackendAbsent {
                path: self.path.clone(),
            });
        };
        let symbol = kind.symbol();
        match library.entry_point(symbol) {
            // SAFETY: the pointer stays valid while `self.library` is loaded,
            // and the returned value borrows `self` mutably.
            Some(func) => Ok(unsafe { EntryPoint::new(kind, func) }),
            None => {
                warn!(
                    "Failed to resolve `{}` in {}",
                    symbol,
                    self.path.display()
                );
                self.unload();
                Err(RegistrarError::SymbolNotFound {
                    symbol,
                    path: self.path.clone(),
                })
            }
        }
    }

    /// Unload and release the library. Safe to call when absent.
    pub fn unload(&mut self) {
        if let Some(library) = self.library.take() {
            info!(path = %self.path.display(), "Unloading backend library");
            drop(library);
        }
    }

    fn call(
        &mut self,
        kind: EntryPointKind,
        service: &str,
        connection: &BusConnection,
    ) -> Result<(), RegistrarError> {
        let path = self.path.clone();
        let result = {
            let entry = self.resolve_entry_point(kind)?;
            entry.invoke(service, connection, &path)
        };
        if result.is_err() {
            self.unload();
        }
        result
    }
}

impl ServiceBackend for BackendModule {
    fn register(
        &mut self,
        service: &str,
        connection: &BusConnection,
    ) -> Result<(), RegistrarError> {
        self.call(EntryPointKind::Register, service, connection)
    }

    fn unregister(
        &mut self,
        service: &str,
        connection: &BusConnection,
    ) -> Result<(), RegistrarError> {
        self.call(EntryPointKind::Unregister, service, connection)
    }
}

impl Drop for BackendModule {
    fn drop(&mut self) {
        self.unload();
    }
}
