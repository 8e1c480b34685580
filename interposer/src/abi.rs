//! ABI entry points exported to the dynamic linker.
//!
//! The first call parses the policy under a once-only primitive;
//! subsequent calls take a read-only fast path. Delegation to the real
//! symbol goes through `dlsym(RTLD_NEXT)` so the chain keeps working
//! under other preloaded libraries.

use std::ffi::CStr;
use std::io::Write;
use std::os::raw::c_char;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::policy::{log_line, ParsedPolicy};

const POLICY_NAME: &[u8] = b"DOTNOPE_POLICY\0";
const LOG_NAME: &[u8] = b"DOTNOPE_LOG\0";
const GETENV_NAME: &[u8] = b"getenv\0";

type GetenvFn = unsafe extern "C" fn(*const c_char) -> *mut c_char;

static REAL_GETENV: OnceLock<Option<GetenvFn>> = OnceLock::new();
static POLICY: OnceLock<ParsedPolicy> = OnceLock::new();
static LOG_PATH: OnceLock<Option<String>> = OnceLock::new();

fn real_getenv() -> Option<GetenvFn> {
    *REAL_GETENV.get_or_init(|| {
        let symbol = unsafe { libc::dlsym(libc::RTLD_NEXT, GETENV_NAME.as_ptr().cast()) };
        if symbol.is_null() {
            None
        } else {
            Some(unsafe { std::mem::transmute::<*mut libc::c_void, GetenvFn>(symbol) })
        }
    })
}

/// Read a variable through the real symbol, bypassing our own policy.
fn raw_lookup(name: &[u8]) -> Option<String> {
    let real = real_getenv()?;
    let value = unsafe { real(name.as_ptr().cast()) };
    if value.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(value) }
            .to_str()
            .ok()
            .map(str::to_owned)
    }
}

fn policy() -> &'static ParsedPolicy {
    POLICY.get_or_init(|| ParsedPolicy::parse(raw_lookup(POLICY_NAME).as_deref()))
}

fn log_decision(name: &str, allowed: bool) {
    let path = LOG_PATH.get_or_init(|| raw_lookup(LOG_NAME));
    let Some(path) = path.as_deref() else {
        return;
    };
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
        let _ = file.write_all(log_line(now, name, allowed).as_bytes());
    }
}

unsafe fn mediated_getenv(name: *const c_char) -> *mut c_char {
    if name.is_null() {
        return std::ptr::null_mut();
    }
    let Some(real) = real_getenv() else {
        return std::ptr::null_mut();
    };

    let Ok(key) = CStr::from_ptr(name).to_str() else {
        // Outside the policy vocabulary; only unrestricted policies pass.
        return if policy().allows_opaque() {
            real(name)
        } else {
            std::ptr::null_mut()
        };
    };

    let allowed = policy().allows(key);
    log_decision(key, allowed);
    if allowed {
        real(name)
    } else {
        std::ptr::null_mut()
    }
}

#[no_mangle]
pub unsafe extern "C" fn getenv(name: *const c_char) -> *mut c_char {
    mediated_getenv(name)
}

/// glibc's secure variant takes the same decision path.
#[no_mangle]
pub unsafe extern "C" fn secure_getenv(name: *const c_char) -> *mut c_char {
    mediated_getenv(name)
}
