//! Bus connection resolution.
//!
//! A [`BusRegistry`] is owned by the host process and handed to every
//! registrar. It maps a [`BusKey`] (bus type plus optional override) to one
//! shared [`BusConnection`]:
//!
//! - no override: the registry's default connection for that bus type
//! - override that looks like a D-Bus address (`unix:path=...`): a private
//!   connection to that address
//! - any other override: a private connection to the selected bus, named by
//!   the override
//!
//! Handles are lazy. Resolving never fails; the transport is opened by the
//! first operation that needs it and open failures surface there.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};
use zbus::blocking::Connection;
use zbus::blocking::connection::Builder;

use crate::declaration::{DECLARATION_PATH, PrivateDeclaration};
use crate::error::RegistrarError;
use crate::policy::BusType;

/// Identity of a bus connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusKey {
    pub bus: BusType,
    pub name: Option<String>,
}

/// How a [`BusKey`] reaches its bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// The shared connection to the selected bus
    Default(BusType),
    /// A dedicated connection to the selected bus
    Private(BusType, &'a str),
    /// A dedicated connection to an explicit address
    Address(&'a str),
}

impl BusKey {
    pub fn new(bus: BusType, name: Option<&str>) -> Self {
        Self {
            bus,
            name: name.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    pub fn route(&self) -> Route<'_> {
        match self.name.as_deref() {
            None => Route::Default(self.bus),
            Some(addr) if looks_like_address(addr) => Route::Address(addr),
            Some(name) => Route::Private(self.bus, name),
        }
    }
}

impl fmt::Display for BusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}({})", self.bus, name),
            None => write!(f, "{}", self.bus),
        }
    }
}

/// D-Bus addresses are `transport:key=value[,key=value]...`.
fn looks_like_address(s: &str) -> bool {
    match s.split_once(':') {
        Some((transport, rest)) => !transport.is_empty() && rest.contains('='),
        None => false,
    }
}

/// An open bus session.
pub trait BusSession: Send + Sync {
    /// Claim a well-known name.
    fn request_name(&self, name: &str) -> Result<(), RegistrarError>;

    /// Give up a well-known name. Returns whether the name was held.
    fn release_name(&self, name: &str) -> Result<bool, RegistrarError>;

    /// Serve the declaration object at [`DECLARATION_PATH`].
    ///
    /// Returns false if an object was already exported there.
    fn export_declaration(&self, declaration: PrivateDeclaration) -> Result<bool, RegistrarError>;

    /// Stop serving the declaration object.
    fn withdraw_declaration(&self) -> Result<bool, RegistrarError>;

    fn as_any(&self) -> &dyn Any;
}

/// Opens sessions for keys.
pub trait BusConnector: Send + Sync {
    fn open(&self, key: &BusKey) -> Result<Arc<dyn BusSession>, RegistrarError>;
}

/// Production connector on `zbus::blocking`.
pub struct ZbusConnector;

impl BusConnector for ZbusConnector {
    fn open(&self, key: &BusKey) -> Result<Arc<dyn BusSession>, RegistrarError> {
        let connection = match key.route() {
            Route::Default(BusType::System) => Connection::system()?,
            Route::Default(BusType::Session) => Connection::session()?,
            Route::Private(BusType::System, _) => Builder::system()?.build()?,
            Route::Private(BusType::Session, _) => Builder::session()?.build()?,
            Route::Address(addr) => Builder::address(addr)?.build()?,
        };
        info!(
            bus = %key,
            unique_name = ?connection.unique_name().map(|n| n.to_string()),
            "Connected to D-Bus"
        );
        Ok(Arc::new(ZbusSession { connection }))
    }
}

/// A live zbus connection.
pub struct ZbusSession {
    connection: Connection,
}

impl ZbusSession {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl BusSession for ZbusSession {
    fn request_name(&self, name: &str) -> Result<(), RegistrarError> {
        self.connection.request_name(name)?;
        Ok(())
    }

    fn release_name(&self, name: &str) -> Result<bool, RegistrarError> {
        Ok(self.connection.release_name(name)?)
    }

    fn export_declaration(&self, declaration: PrivateDeclaration) -> Result<bool, RegistrarError> {
        Ok(self
            .connection
            .object_server()
            .at(DECLARATION_PATH, declaration)?)
    }

    fn withdraw_declaration(&self) -> Result<bool, RegistrarError> {
        Ok(self
            .connection
            .object_server()
            .remove::<PrivateDeclaration, _>(DECLARATION_PATH)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Slot {
    key: BusKey,
    connector: Arc<dyn BusConnector>,
    session: Mutex<Option<Arc<dyn BusSession>>>,
}

/// Lazily opened handle to one bus session.
///
/// Clones share the session. This is also the value backends receive through
/// the entry-point protocol; see [`BusConnection::from_raw`].
#[derive(Clone)]
pub struct BusConnection {
    slot: Arc<Slot>,
}

impl BusConnection {
    fn new(key: BusKey, connector: Arc<dyn BusConnector>) -> Self {
        Self {
            slot: Arc::new(Slot {
                key,
                connector,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn key(&self) -> &BusKey {
        &self.slot.key
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<dyn BusSession>>> {
        self.slot
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The session, opening the transport on first use.
    ///
    /// A failed open is not remembered; the next call tries again.
    pub fn session(&self) -> Result<Arc<dyn BusSession>, RegistrarError> {
        let mut guard = self.lock();
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        debug!(bus = %self.slot.key, "Opening bus connection");
        let session = self.slot.connector.open(&self.slot.key)?;
        *guard = Some(session.clone());
        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Whether both handles talk through the same session.
    pub fn same_session(&self, other: &BusConnection) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// The underlying zbus connection, if open and backed by zbus.
    pub fn zbus_connection(&self) -> Option<Connection> {
        let guard = self.lock();
        let session = guard.as_ref()?;
        session
            .as_any()
            .downcast_ref::<ZbusSession>()
            .map(|s| s.connection.clone())
    }

    /// Pointer handed to backend entry points.
    pub fn as_raw(&self) -> *mut libc::c_void {
        self as *const BusConnection as *mut libc::c_void
    }

    /// Recover the handle inside a backend entry point.
    ///
    /// # Safety
    ///
    /// `ptr` must be the connection argument of a `DSMRegister` or
    /// `DSMUnRegister` call that is still in progress, and the backend must be
    /// built against the same version of this crate.
    pub unsafe fn from_raw<'a>(ptr: *mut libc::c_void) -> Option<&'a BusConnection> {
        // SAFETY: guaranteed by the caller.
        unsafe { (ptr as *const BusConnection).as_ref() }
    }
}

impl fmt::Debug for BusConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConnection")
            .field("key", &self.slot.key)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Host-owned table of bus connections.
pub struct BusRegistry {
    connector: Arc<dyn BusConnector>,
    connections: Mutex<HashMap<BusKey, BusConnection>>,
}

impl BusRegistry {
    pub fn new(connector: Arc<dyn BusConnector>) -> Self {
        Self {
            connector,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Registry backed by real D-Bus connections.
    pub fn zbus() -> Self {
        Self::new(Arc::new(ZbusConnector))
    }

    /// Handle for `(bus, override)`. The same key always yields the same
    /// handle; an empty override is the same as none.
    pub fn resolve(&self, bus: BusType, bus_override: Option<&str>) -> BusConnection {
        let key = BusKey::new(bus, bus_override);
        let mut connections = self
            .connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        connections
            .entry(key)
            .or_insert_with_key(|key| BusConnection::new(key.clone(), self.connector.clone()))
            .clone()
    }

    /// Number of distinct keys resolved so far.
    pub fn len(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BusRegistry {
    fn default() -> Self {
        Self::zbus()
    }
}
