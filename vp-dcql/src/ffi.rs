//! # C ABI
//!
//! Entry points declared in `include/vp_dcql.h`. Results cross the boundary
//! as NUL-terminated strings owned by this library: presentation JSON on
//! success, or a message prefixed with `ERROR: ` on failure. Every returned
//! string must be released exactly once with [`vp_dcql_free_string`].
//!
//! Presentations are signed with a fresh Ed25519 `did:jwk` key per call.

use std::ffi::{CStr, CString, c_char};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::engine::create_presentation;
use crate::proof::{DataIntegritySigner, Ed25519Keyring};

/// Prefix marking a returned string as an error message.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Create a Verifiable Presentation from a DCQL query and a signed
/// credential.
///
/// Returns the presentation JSON, or an error message prefixed with
/// `ERROR: `. The result is null only if the string could not be allocated.
///
/// # Safety
///
/// `dcql_query` and `signed_credential` must be valid NUL-terminated strings.
/// `challenge` must be a valid NUL-terminated string or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vp_dcql_create_presentation(
    dcql_query: *const c_char, signed_credential: *const c_char, challenge: *const c_char,
) -> *mut c_char {
    let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        create(dcql_query, signed_credential, challenge)
    }));

    let text = match result {
        Ok(Ok(json)) => json,
        Ok(Err(message)) => {
            tracing::debug!(%message, "presentation failed");
            format!("{ERROR_PREFIX}{message}")
        }
        Err(_) => format!("{ERROR_PREFIX}internal error"),
    };
    into_raw(text)
}

/// Free a string returned by [`vp_dcql_create_presentation`]. Null is
/// ignored.
///
/// # Safety
///
/// `s` must be null or a pointer returned by [`vp_dcql_create_presentation`]
/// that has not already been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vp_dcql_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

unsafe fn create(
    dcql_query: *const c_char, signed_credential: *const c_char, challenge: *const c_char,
) -> Result<String, String> {
    let dcql_query = unsafe { read_str(dcql_query, "dcql_query") }?;
    let signed_credential = unsafe { read_str(signed_credential, "signed_credential") }?;
    let challenge = if challenge.is_null() {
        None
    } else {
        // an empty challenge is the same as none
        Some(unsafe { read_str(challenge, "challenge") }?).filter(|c| !c.is_empty())
    };

    let signer = DataIntegritySigner::new(Ed25519Keyring::generate());
    let presentation = create_presentation(dcql_query, signed_credential, challenge, &signer)
        .map_err(|e| e.to_string())?;
    presentation.to_json().map_err(|e| e.to_string())
}

unsafe fn read_str<'a>(ptr: *const c_char, name: &str) -> Result<&'a str, String> {
    if ptr.is_null() {
        return Err(format!("{name} is null"));
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().map_err(|e| format!("{name} is not valid UTF-8: {e}"))
}

fn into_raw(text: String) -> *mut c_char {
    // interior NULs would truncate the string
    let text = if text.contains('\0') { text.replace('\0', "\\u0000") } else { text };
    CString::new(text).map_or(ptr::null_mut(), CString::into_raw)
}
