//! Minimal backend plugin used by the integration tests.
//!
//! `DSMRegister` accepts any `com.example.*` name with a connection handle.
//! `DSMUnRegister` always reports failure and is left out entirely with the
//! `no-unregister` feature.

use std::ffi::{c_char, c_int, c_void, CStr};

#[no_mangle]
pub unsafe extern "C" fn DSMRegister(name: *const c_char, conn: *mut c_void) -> c_int {
    if name.is_null() || conn.is_null() {
        return 2;
    }
    match CStr::from_ptr(name).to_str() {
        Ok(name) if name.starts_with("com.example.") => 0,
        _ => 3,
    }
}

#[cfg(not(feature = "no-unregister"))]
#[no_mangle]
pub unsafe extern "C" fn DSMUnRegister(_name: *const c_char, _conn: *mut c_void) -> c_int {
    1
}
