//! dotnope-interposer — the below-runtime enforcement plane.
//!
//! A shared library injected through the loader's preload list. It exports
//! replacements for the C-level environment-read functions so native code
//! in the same process cannot sidestep the runtime mediator. The allow-set
//! arrives serialized in `DOTNOPE_POLICY` (set by the launcher); reads of
//! allowed names delegate to the real symbol located via the dynamic
//! linker's next-symbol facility, everything else reads as absent.
//!
//! Intentionally coarse: no per-package identity exists below the runtime.
//! The runtime mediator still performs per-package decisions on top.

// extern "C" exports accept raw pointers from C callers; validation
// happens at runtime.
#![allow(clippy::missing_safety_doc)]

pub mod policy;

// The `#[no_mangle]` exports would shadow libc's own getenv inside the
// test binary; decision logic lives in `policy` and is tested there.
#[cfg(not(test))]
mod abi;
