//! Recording doubles for the bus and loader seams.

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use libc::{c_char, c_int, c_void};

use crate::backend::{LoadedModule, ModuleLoader, has_library_suffix};
use crate::bus::{BusConnector, BusKey, BusSession};
use crate::declaration::PrivateDeclaration;
use crate::entry::{EntryPointFn, REGISTER_SYMBOL, UNREGISTER_SYMBOL};
use crate::error::RegistrarError;

unsafe extern "C" fn returns_zero(_: *const c_char, _: *mut c_void) -> c_int {
    0
}

unsafe extern "C" fn returns_one(_: *const c_char, _: *mut c_void) -> c_int {
    1
}

/// Connector whose sessions record what was asked of them.
#[derive(Default)]
pub struct RecordingConnector {
    opened: Mutex<Vec<BusKey>>,
    events: Arc<Mutex<Vec<String>>>,
    fail_next: AtomicBool,
}

impl RecordingConnector {
    pub fn opened(&self) -> Vec<BusKey> {
        self.opened.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn fail_next_open(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl BusConnector for RecordingConnector {
    fn open(&self, key: &BusKey) -> Result<Arc<dyn BusSession>, RegistrarError> {
        self.opened.lock().unwrap().push(key.clone());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(zbus::Error::Failure(format!("cannot reach {key}")).into());
        }
        Ok(Arc::new(RecordingSession {
            events: self.events.clone(),
            exported: Mutex::new(None),
        }))
    }
}

pub struct RecordingSession {
    events: Arc<Mutex<Vec<String>>>,
    exported: Mutex<Option<PrivateDeclaration>>,
}

impl RecordingSession {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl BusSession for RecordingSession {
    fn request_name(&self, name: &str) -> Result<(), RegistrarError> {
        self.record(format!("request_name {name}"));
        Ok(())
    }

    fn release_name(&self, name: &str) -> Result<bool, RegistrarError> {
        self.record(format!("release_name {name}"));
        Ok(true)
    }

    fn export_declaration(&self, declaration: PrivateDeclaration) -> Result<bool, RegistrarError> {
        self.record(format!("export {}", declaration.service()));
        let mut exported = self.exported.lock().unwrap();
        if exported.is_some() {
            return Ok(false);
        }
        *exported = Some(declaration);
        Ok(true)
    }

    fn withdraw_declaration(&self) -> Result<bool, RegistrarError> {
        self.record("withdraw".to_string());
        Ok(self.exported.lock().unwrap().take().is_some())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A fake library: a table of entry points.
#[derive(Clone, Default)]
pub struct StubModule {
    symbols: HashMap<&'static str, EntryPointFn>,
    lookups: Arc<Mutex<Vec<String>>>,
}

impl StubModule {
    pub fn with(mut self, symbol: &'static str, func: EntryPointFn) -> Self {
        self.symbols.insert(symbol, func);
        self
    }

    /// Both entry points return 0.
    pub fn succeeding() -> Self {
        Self::default()
            .with(REGISTER_SYMBOL, returns_zero)
            .with(UNREGISTER_SYMBOL, returns_zero)
    }

    /// `DSMRegister` returns 0, `DSMUnRegister` is missing.
    pub fn register_only() -> Self {
        Self::default().with(REGISTER_SYMBOL, returns_zero)
    }

    /// `DSMUnRegister` returns 0, `DSMRegister` is missing.
    pub fn unregister_only() -> Self {
        Self::default().with(UNREGISTER_SYMBOL, returns_zero)
    }

    /// `DSMRegister` returns 0, `DSMUnRegister` returns 1.
    pub fn failing_unregister() -> Self {
        Self::default()
            .with(REGISTER_SYMBOL, returns_zero)
            .with(UNREGISTER_SYMBOL, returns_one)
    }

    /// `DSMRegister` returns 1.
    pub fn failing_register() -> Self {
        Self::default()
            .with(REGISTER_SYMBOL, returns_one)
            .with(UNREGISTER_SYMBOL, returns_zero)
    }
}

impl LoadedModule for StubModule {
    fn entry_point(&self, symbol: &str) -> Option<EntryPointFn> {
        self.lookups.lock().unwrap().push(symbol.to_string());
        self.symbols.get(symbol).copied()
    }
}

/// Loader serving [`StubModule`]s by path.
///
/// The probe checks the file name only, so tests need no files on disk.
#[derive(Default)]
pub struct StubLoader {
    modules: Mutex<HashMap<PathBuf, StubModule>>,
    opened: Mutex<Vec<PathBuf>>,
    lookups: Arc<Mutex<Vec<String>>>,
}

impl StubLoader {
    pub fn install(&self, path: impl Into<PathBuf>, module: StubModule) {
        self.modules.lock().unwrap().insert(path.into(), module);
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }

    /// Every symbol looked up, across all modules, in order.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

impl ModuleLoader for StubLoader {
    fn is_library(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(has_library_suffix)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn LoadedModule>, RegistrarError> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        let module = self
            .modules
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| RegistrarError::LoadFailed {
                path: path.to_path_buf(),
                source: libloading::Error::DlOpenUnknown,
            })?;
        Ok(Box::new(StubModule {
            lookups: self.lookups.clone(),
            ..module
        }))
    }
}
