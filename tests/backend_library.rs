//! Registrar against a real backend plugin loaded through libloading.
//!
//! The plugin lives in `tests/fixtures/backend` and is built with the same
//! cargo that runs these tests. The bus is an in-memory stand-in.

use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};

use dsm_registrar::bus::{BusConnector, BusKey, BusSession};
use dsm_registrar::declaration::PrivateDeclaration;
use dsm_registrar::{BusRegistry, DylibLoader, RegistrarError, ServicePolicy, ServiceRegistrar};
use tempfile::TempDir;

const FIXTURE_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/backend");

struct NullConnector;

struct NullSession;

impl BusConnector for NullConnector {
    fn open(&self, _key: &BusKey) -> Result<Arc<dyn BusSession>, RegistrarError> {
        Ok(Arc::new(NullSession))
    }
}

impl BusSession for NullSession {
    fn request_name(&self, _name: &str) -> Result<(), RegistrarError> {
        Ok(())
    }

    fn release_name(&self, _name: &str) -> Result<bool, RegistrarError> {
        Ok(true)
    }

    fn export_declaration(&self, _declaration: PrivateDeclaration) -> Result<bool, RegistrarError> {
        Ok(true)
    }

    fn withdraw_declaration(&self) -> Result<bool, RegistrarError> {
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Build the fixture plugin once per variant and return the artifact path.
fn build_backend(features: &[&str]) -> PathBuf {
    let variant = if features.is_empty() { "full" } else { "register-only" };
    let root = Path::new(env!("CARGO_TARGET_TMPDIR")).join(format!("backend-{variant}"));

    // Build from a copy so the fixture's lock file never lands in the source tree.
    let source = root.join("src-tree");
    fs::create_dir_all(source.join("src")).unwrap();
    fs::copy(
        Path::new(FIXTURE_DIR).join("Cargo.toml"),
        source.join("Cargo.toml"),
    )
    .unwrap();
    fs::copy(
        Path::new(FIXTURE_DIR).join("src/lib.rs"),
        source.join("src/lib.rs"),
    )
    .unwrap();

    let target = root.join("target");
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["build", "--offline", "--quiet", "--manifest-path"])
        .arg(source.join("Cargo.toml"))
        .arg("--target-dir")
        .arg(&target);
    if !features.is_empty() {
        cmd.arg("--features").arg(features.join(","));
    }
    let status = cmd.status().unwrap();
    assert!(status.success(), "building the fixture backend failed: {status}");

    target.join("debug").join(format!(
        "{}dsm_test_backend{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    ))
}

fn full_backend() -> &'static Path {
    static BUILT: OnceLock<PathBuf> = OnceLock::new();
    BUILT.get_or_init(|| build_backend(&[]))
}

fn register_only_backend() -> &'static Path {
    static BUILT: OnceLock<PathBuf> = OnceLock::new();
    BUILT.get_or_init(|| build_backend(&["no-unregister"]))
}

/// Copy `artifact` into a fresh plugin directory and start a registrar on it.
fn registrar_for(service: &str, artifact: &Path) -> (TempDir, ServiceRegistrar) {
    let plugins = TempDir::new().unwrap();
    let file_name = format!(
        "{}foo{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    );
    fs::copy(artifact, plugins.path().join(&file_name)).unwrap();

    let registry = BusRegistry::new(Arc::new(NullConnector));
    let registrar = ServiceRegistrar::initialize(
        ServicePolicy::new(service, file_name),
        &registry,
        Arc::new(DylibLoader),
        plugins.path(),
    )
    .unwrap();
    (plugins, registrar)
}

#[test]
fn real_backend_registers_and_refuses_unregister() {
    let (_plugins, mut registrar) = registrar_for("com.example.Foo", full_backend());

    assert!(registrar.backend_loaded());
    assert!(registrar.register_service());
    assert!(registrar.is_registered());
    assert!(registrar.backend_loaded());

    match registrar.try_unregister() {
        Err(RegistrarError::BackendCallFailed { symbol, code, .. }) => {
            assert_eq!(symbol, "DSMUnRegister");
            assert_eq!(code, 1);
        }
        other => panic!("expected BackendCallFailed, got {other:?}"),
    }
    assert!(!registrar.backend_loaded());
    assert!(!registrar.unregister_service());
}

#[test]
fn real_backend_rejecting_register_is_unloaded() {
    let (_plugins, mut registrar) = registrar_for("org.other.Foo", full_backend());

    match registrar.try_register() {
        Err(RegistrarError::BackendCallFailed { symbol, code, .. }) => {
            assert_eq!(symbol, "DSMRegister");
            assert_eq!(code, 3);
        }
        other => panic!("expected BackendCallFailed, got {other:?}"),
    }
    assert!(!registrar.is_registered());
    assert!(!registrar.backend_loaded());
    assert!(matches!(
        registrar.try_register(),
        Err(RegistrarError::BackendAbsent { .. })
    ));
}

#[test]
fn missing_unregister_symbol_unloads_backend() {
    let (_plugins, mut registrar) = registrar_for("com.example.Foo", register_only_backend());

    assert!(registrar.register_service());
    match registrar.try_unregister() {
        Err(RegistrarError::SymbolNotFound { symbol, .. }) => {
            assert_eq!(symbol, "DSMUnRegister");
        }
        other => panic!("expected SymbolNotFound, got {other:?}"),
    }
    assert!(!registrar.backend_loaded());
    assert!(!registrar.shutdown());
}

#[test]
fn reload_brings_real_backend_back() {
    let (_plugins, mut registrar) = registrar_for("com.example.Foo", full_backend());

    assert!(!registrar.unregister_service());
    assert!(!registrar.backend_loaded());
    registrar.reload_backend().unwrap();
    assert!(registrar.backend_loaded());
    assert!(registrar.register_service());
}
