//! Tests for the C entry points.

#![cfg(feature = "ffi")]

use std::ffi::{CStr, CString};
use std::ptr;

use serde_json::{Value, json};
use test_utils::issuer::Issuer;
use vp_dcql::Presentation;
use vp_dcql::ffi::{ERROR_PREFIX, vp_dcql_create_presentation, vp_dcql_free_string};

fn query() -> CString {
    let query = json!({
        "credentials": [{
            "id": "degree",
            "format": "ldp_vc",
            "meta": {"type_values": [["ExampleDegree"]]},
            "claims": [{"path": ["credentialSubject", "degree", "type"]}]
        }]
    });
    CString::new(query.to_string()).expect("should convert")
}

// Call the entry point and take ownership of the result.
fn call(query: &CString, credential: &CString, challenge: Option<&CString>) -> String {
    let challenge = challenge.map_or(ptr::null(), |c| c.as_ptr());
    unsafe {
        let raw = vp_dcql_create_presentation(query.as_ptr(), credential.as_ptr(), challenge);
        assert!(!raw.is_null());
        let text = CStr::from_ptr(raw).to_str().expect("should be UTF-8").to_string();
        vp_dcql_free_string(raw);
        text
    }
}

#[test]
fn create_presentation() {
    let credential = CString::new(Issuer::new().degree()).expect("should convert");
    let challenge = CString::new("n-0S6_WzA2Mj").expect("should convert");

    let text = call(&query(), &credential, Some(&challenge));
    assert!(!text.starts_with(ERROR_PREFIX), "{text}");

    let vp = Presentation::from_json(&text).expect("should parse");
    assert_eq!(vp.challenge.as_deref(), Some("n-0S6_WzA2Mj"));
    assert!(vp.holder.as_deref().is_some_and(|h| h.starts_with("did:jwk:")));
    vp.verify().expect("should verify");

    let json: Value = serde_json::from_str(&text).expect("should deserialize");
    assert_eq!(
        json["verifiableCredential"][0]["credential"]["credentialSubject"],
        json!({"degree": {"type": "Bachelor"}})
    );
}

#[test]
fn null_challenge() {
    let credential = CString::new(Issuer::new().degree()).expect("should convert");
    let empty = CString::new("").expect("should convert");

    for challenge in [None, Some(&empty)] {
        let text = call(&query(), &credential, challenge);
        let vp = Presentation::from_json(&text).expect("should parse");
        assert!(vp.challenge.is_none());
        assert!(vp.proof.is_some());
    }
}

#[test]
fn error_message() {
    let credential = CString::new(Issuer::new().employee()).expect("should convert");
    let text = call(&query(), &credential, None);
    assert!(text.starts_with("ERROR: unsatisfied query: [degree]"), "{text}");

    let malformed = CString::new("{\"credentials\": []}").expect("should convert");
    let text = call(&malformed, &credential, None);
    assert!(text.starts_with("ERROR: malformed query:"), "{text}");
}

#[test]
fn null_arguments() {
    let credential = CString::new(Issuer::new().degree()).expect("should convert");
    let text = unsafe {
        let raw = vp_dcql_create_presentation(ptr::null(), credential.as_ptr(), ptr::null());
        let text = CStr::from_ptr(raw).to_str().expect("should be UTF-8").to_string();
        vp_dcql_free_string(raw);
        text
    };
    assert_eq!(text, "ERROR: dcql_query is null");

    // freeing null is a no-op
    unsafe { vp_dcql_free_string(ptr::null_mut()) };
}
