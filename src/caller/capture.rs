//! Stack capture backends.
//!
//! Two sources of frames feed the identifier: a trusted backend supplied by
//! the embedding runtime (frames straight from the VM, immune to user-space
//! hook redefinition) and a fallback backend built on the process-global
//! capture primitive and format hook below. The fallback is advisory: code
//! that ran before initialization, or that swaps the primitive afterwards,
//! can suppress or forge frames.

use std::sync::RwLock;

use crate::types::Frame;

/// Source of stack snapshots at an interception point.
pub trait StackCapture: Send + Sync {
    /// Snapshot of the current stack, innermost frame first.
    fn capture(&self) -> Vec<Frame>;

    /// Whether frames come from a source user code cannot redefine.
    fn is_trusted(&self) -> bool {
        false
    }
}

/// Capture returning a fixed frame list.
///
/// Embedders that precompute frames hand one of these to the engine; it is
/// also the workhorse of the test suite.
pub struct StaticCapture {
    frames: RwLock<Vec<Frame>>,
    trusted: bool,
}

impl StaticCapture {
    /// Untrusted capture over the given frames.
    pub fn new(frames: Vec<Frame>) -> Self {
        StaticCapture {
            frames: RwLock::new(frames),
            trusted: false,
        }
    }

    /// Trusted capture over the given frames.
    pub fn trusted(frames: Vec<Frame>) -> Self {
        StaticCapture {
            frames: RwLock::new(frames),
            trusted: true,
        }
    }

    /// Replace the frames returned by subsequent captures.
    pub fn set_frames(&self, frames: Vec<Frame>) {
        if let Ok(mut guard) = self.frames.write() {
            *guard = frames;
        }
    }
}

impl StackCapture for StaticCapture {
    fn capture(&self) -> Vec<Frame> {
        self.frames.read().map(|f| f.clone()).unwrap_or_default()
    }

    fn is_trusted(&self) -> bool {
        self.trusted
    }
}

/// Raw producer of stack frames (the user-space stack API analog).
pub type CapturePrimitive = fn() -> Vec<Frame>;

/// Post-processing hook applied to captured frames before user code sees
/// them. User space may replace it; the fallback backend bypasses it.
pub type FormatHook = fn(Vec<Frame>) -> Vec<Frame>;

fn empty_primitive() -> Vec<Frame> {
    Vec::new()
}

fn identity_hook(frames: Vec<Frame>) -> Vec<Frame> {
    frames
}

static CAPTURE_PRIMITIVE: RwLock<CapturePrimitive> = RwLock::new(empty_primitive);
static FORMAT_HOOK: RwLock<FormatHook> = RwLock::new(identity_hook);

/// Replace the process-global capture primitive. Embedder surface.
pub fn set_capture_primitive(primitive: CapturePrimitive) {
    if let Ok(mut guard) = CAPTURE_PRIMITIVE.write() {
        *guard = primitive;
    }
}

/// Replace the process-global format hook. User-space surface; the
/// fallback backend records whether this happened before it initialized.
pub fn set_format_hook(hook: FormatHook) {
    if let Ok(mut guard) = FORMAT_HOOK.write() {
        *guard = hook;
    }
}

/// Fallback backend over the process-global primitive and hook.
///
/// Initialization snapshots the primitive so later user-space swaps do not
/// redirect capture. During capture the format hook is swapped for a raw
/// identity hook and the previously installed hook restored before
/// returning; the swap never spans a suspension point (capture is
/// synchronous and the lock is held throughout).
pub struct FallbackCapture {
    primitive: CapturePrimitive,
    tampering_detected: bool,
}

impl FallbackCapture {
    /// Snapshot the current primitive and record whether the format hook
    /// was already replaced before initialization.
    ///
    /// The tampering flag is reported through the status surface; it never
    /// silently changes enforcement semantics.
    pub fn initialize() -> Self {
        let primitive = CAPTURE_PRIMITIVE
            .read()
            .map(|p| *p)
            .unwrap_or(empty_primitive);
        let identity: FormatHook = identity_hook;
        let tampering_detected = FORMAT_HOOK
            .read()
            .map(|hook| *hook as usize != identity as usize)
            .unwrap_or(true);
        FallbackCapture {
            primitive,
            tampering_detected,
        }
    }

    /// Whether the format hook was already modified at initialization time.
    pub fn tampering_detected(&self) -> bool {
        self.tampering_detected
    }
}

impl StackCapture for FallbackCapture {
    fn capture(&self) -> Vec<Frame> {
        let Ok(mut hook) = FORMAT_HOOK.write() else {
            return Vec::new();
        };
        let previous = *hook;
        *hook = identity_hook;
        let frames = (self.primitive)();
        *hook = previous;
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_frames() -> Vec<Frame> {
        vec![Frame::from_path("/app/index.js"), Frame::from_path("/app/lib.js")]
    }

    #[test]
    fn static_capture_round_trips_frames() {
        let capture = StaticCapture::new(two_frames());
        assert_eq!(capture.capture(), two_frames());
        assert!(!capture.is_trusted());
    }

    #[test]
    fn trusted_static_capture_reports_trusted() {
        let capture = StaticCapture::trusted(Vec::new());
        assert!(capture.is_trusted());
    }

    #[test]
    fn static_capture_frames_can_be_swapped() {
        let capture = StaticCapture::new(Vec::new());
        capture.set_frames(two_frames());
        assert_eq!(capture.capture().len(), 2);
    }

    #[test]
    fn fallback_capture_uses_saved_primitive() {
        fn fixed() -> Vec<Frame> {
            vec![Frame::from_path("/srv/app/main.js")]
        }
        set_capture_primitive(fixed);
        let fallback = FallbackCapture::initialize();
        let frames = fallback.capture();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].file_path.as_deref(), Some("/srv/app/main.js"));
        set_capture_primitive(super::empty_primitive);
    }
}
