//! C-compatible FFI API for cross-language bindings.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Memory management
//! - Strings returned through `out_*` pointers are allocated on the Rust heap.
//! - Callers **must** free them with `snap_free_string`.
//! - Passing a null pointer to `snap_free_string` is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int` (0 = success, non-zero = error).
//! - Error details can be retrieved via `snap_last_error`.
//!
//! ## Thread safety
//! - `snap_last_error` uses a thread-local, so it is safe to call from
//!   multiple threads. Captures share no state across calls.
//!
//! ## Usage from Go (cgo)
//! ```go
//! // #cgo LDFLAGS: -lsnap_forge
//! // extern int snap_capture_html(const char* html, const char* options_json,
//! //                              char** out_html);
//! // extern const char* snap_last_error();
//! // extern void snap_free_string(char* s);
//! import "C"
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use crate::pipeline::{capture_html, CaptureConfig, Snapshot};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = RefCell::new(None);
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Read a required UTF-8 C string.
///
/// # Safety
/// `s` must be null or point to a valid null-terminated string.
unsafe fn read_str<'a>(s: *const c_char, what: &str) -> Result<&'a str, (c_int, String)> {
    if s.is_null() {
        return Err((1, "Null pointer argument".to_string()));
    }
    CStr::from_ptr(s)
        .to_str()
        .map_err(|e| (2, format!("Invalid UTF-8 in {what}: {e}")))
}

/// `NULL` → defaults, otherwise a JSON [`CaptureConfig`].
///
/// # Safety
/// Same as [`read_str`].
unsafe fn read_config(options_json: *const c_char) -> Result<CaptureConfig, (c_int, String)> {
    if options_json.is_null() {
        return Ok(CaptureConfig::default());
    }
    let json = read_str(options_json, "options")?;
    CaptureConfig::from_json(json).map_err(|e| (3, format!("Invalid options JSON: {e}")))
}

/// Shared body of the capture entry points.
///
/// # Safety
/// `html` and `options_json` as for [`snap_capture_html`]; `out` must be a
/// valid pointer.
unsafe fn run_capture(
    html: *const c_char,
    options_json: *const c_char,
    out: *mut *mut c_char,
    render: impl FnOnce(&Snapshot) -> String,
) -> c_int {
    if out.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }
    *out = ptr::null_mut();

    let result = read_str(html, "HTML").and_then(|html| {
        let config = read_config(options_json)?;
        capture_html(html, &config).map_err(|e| (4, e.to_string()))
    });
    let snapshot = match result {
        Ok(s) => s,
        Err((code, msg)) => {
            set_last_error(&msg);
            return code;
        }
    };

    match CString::new(render(&snapshot)) {
        Ok(cs) => {
            *out = cs.into_raw();
            0
        }
        Err(_) => {
            set_last_error("Output contained null byte");
            5
        }
    }
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Capture an HTML document and return the snapshot as a standalone HTML
/// string.
///
/// # Parameters
/// - `html`: null-terminated UTF-8 HTML
/// - `options_json`: null-terminated JSON capture options, or `NULL` for
///   defaults (`{"selector": "body", "exclude": [], "compress": true, ...}`)
/// - `out_html`: on success, receives the snapshot HTML
///
/// # Returns
/// `0` on success; `1` null argument, `2` invalid UTF-8, `3` invalid options,
/// `4` capture failure, `5` output encoding failure. On error, call
/// `snap_last_error`.
///
/// # Safety
/// - `html` and `options_json` (if non-null) must be valid null-terminated
///   strings.
/// - `out_html` must be a valid pointer.
/// - The caller must free `*out_html` with `snap_free_string`.
#[no_mangle]
pub unsafe extern "C" fn snap_capture_html(
    html: *const c_char,
    options_json: *const c_char,
    out_html: *mut *mut c_char,
) -> c_int {
    run_capture(html, options_json, out_html, Snapshot::to_html)
}

/// Capture an HTML document and return its SVG `foreignObject` wrapper,
/// sized to the capture root.
///
/// # Safety
/// Same as `snap_capture_html`.
#[no_mangle]
pub unsafe extern "C" fn snap_capture_svg(
    html: *const c_char,
    options_json: *const c_char,
    out_svg: *mut *mut c_char,
) -> c_int {
    run_capture(html, options_json, out_svg, Snapshot::to_svg_auto)
}

/// Capture an HTML document and return the capture manifest as JSON.
///
/// # Safety
/// Same as `snap_capture_html`.
#[no_mangle]
pub unsafe extern "C" fn snap_capture_manifest(
    html: *const c_char,
    options_json: *const c_char,
    out_json: *mut *mut c_char,
) -> c_int {
    run_capture(html, options_json, out_json, |s| s.manifest().to_json())
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a string returned by a `snap_capture_*` function.
///
/// # Safety
/// `s` must have been returned by Rust's `CString::into_raw`.
#[no_mangle]
pub unsafe extern "C" fn snap_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Retrieve the last error message. Returns a null-terminated string.
///
/// The returned pointer is valid until the next failing `snap_*` call on the
/// same thread. The caller should **not** free this pointer.
///
/// Returns null if no error has occurred.
#[no_mangle]
pub extern "C" fn snap_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let borrow = e.borrow();
        match borrow.as_ref() {
            Some(cs) => cs.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Return the library version as a null-terminated string.
/// The caller must **not** free this pointer.
#[no_mangle]
pub extern "C" fn snap_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
