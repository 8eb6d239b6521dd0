//! Tests for the presentation of credentials matching a DCQL query.

use std::sync::LazyLock;

use serde_json::{Value, json};
use test_utils::issuer::{Issuer, PID_VCT};
use test_utils::wallet::Wallet;
use tracing_subscriber::EnvFilter;
use vp_dcql::resolver::BranchFailure;
use vp_dcql::{
    ClaimPath, CredentialFormat, Engine, Error, MatchFailure, Options, Presentation, TieBreak,
    create_presentation,
};

static ISSUER: LazyLock<Issuer> = LazyLock::new(Issuer::new);

const CHALLENGE: &str = "n-0S6_WzA2Mj";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn degree_query() -> Value {
    json!({
        "id": "degree",
        "format": "ldp_vc",
        "meta": {"type_values": [["ExampleDegree"]]},
        "claims": [{"path": ["credentialSubject", "degree", "type"]}]
    })
}

fn employee_query() -> Value {
    json!({
        "id": "employee",
        "format": "ldp_vc",
        "meta": {"type_values": [["EmployeeIDCredential"]]},
        "claims": [{"path": ["credentialSubject", "employeeId"]}]
    })
}

// Should disclose only the requested claim with its context and type.
#[test]
fn disclose_requested_claim() {
    init_tracing();
    let wallet = Wallet::new();
    let query = json!({"credentials": [degree_query()]});

    let vp = create_presentation(&query.to_string(), &ISSUER.degree(), Some(CHALLENGE), &wallet)
        .expect("should create presentation");

    assert_eq!(vp.challenge.as_deref(), Some(CHALLENGE));
    assert_eq!(vp.holder.as_deref(), Some(wallet.did()));
    assert_eq!(vp.verifiable_credential.len(), 1);
    assert_eq!(wallet.signatures(), 1);

    let presented = vp.credential("degree").expect("should present degree");
    assert_eq!(presented.format, CredentialFormat::LdpVc);

    // nothing beyond the disclosed claims, not even the issuer's proof
    assert_eq!(
        presented.credential,
        json!({
            "@context": [
                "https://www.w3.org/ns/credentials/v2",
                "https://www.w3.org/ns/credentials/examples/v2"
            ],
            "type": ["VerifiableCredential", "ExampleDegree"],
            "credentialSubject": {"degree": {"type": "Bachelor"}}
        })
    );

    let json = vp.to_json().expect("should serialize");
    assert!(!json.contains("\"city\""));
    assert!(!json.contains("Bachelor of Science and Arts"));
}

// Should satisfy an OR set with the only option the holder has.
#[test]
fn alternative_credential() {
    init_tracing();
    let query = json!({
        "credentials": [degree_query(), employee_query()],
        "credential_sets": [{"options": [["degree"], ["employee"]]}]
    });

    let vp = create_presentation(&query.to_string(), &ISSUER.employee(), None, &Wallet::new())
        .expect("should create presentation");

    assert_eq!(vp.verifiable_credential.len(), 1);
    assert!(vp.credential("degree").is_none());

    let presented = vp.credential("employee").expect("should present employee");
    assert_eq!(
        presented.credential["credentialSubject"],
        json!({"employeeId": "1234567890"})
    );
}

// Should fail without signing when a required claim is missing.
#[test]
fn missing_claim() {
    init_tracing();
    let wallet = Wallet::new();
    let credential = ISSUER.ldp_vc(&json!({
        "@context": ["https://www.w3.org/ns/credentials/v2"],
        "type": ["VerifiableCredential", "ExampleDegree"],
        "credentialSubject": {"degree": {"name": "Bachelor of Science and Arts"}}
    }));
    let query = json!({"credentials": [degree_query()]});

    let err = create_presentation(&query.to_string(), &credential, Some(CHALLENGE), &wallet)
        .expect_err("should not be satisfied");

    assert_eq!(
        err,
        Error::UnsatisfiedBranch(vec![BranchFailure {
            query_ids: vec!["degree".to_string()],
            reason: MatchFailure::MissingClaim(ClaimPath::from([
                "credentialSubject",
                "degree",
                "type"
            ])),
        }])
    );
    assert_eq!(wallet.signatures(), 0);
}

// Should report a type mismatch when no credential has the requested type.
#[test]
fn type_mismatch() {
    init_tracing();
    let query = json!({"credentials": [degree_query()]});

    let err = create_presentation(&query.to_string(), &ISSUER.employee(), None, &Wallet::new())
        .expect_err("should not be satisfied");

    let Error::UnsatisfiedBranch(failures) = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reason, MatchFailure::FormatMismatch);
}

// Should reject a claim whose value is not accepted.
#[test]
fn value_mismatch() {
    init_tracing();
    let query = json!({
        "credentials": [{
            "id": "degree",
            "format": "ldp_vc",
            "claims": [{
                "path": ["credentialSubject", "degree", "type"],
                "values": ["Master", "Doctorate"]
            }]
        }]
    });

    let err = create_presentation(&query.to_string(), &ISSUER.degree(), None, &Wallet::new())
        .expect_err("should not be satisfied");

    let Error::UnsatisfiedBranch(failures) = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(
        failures[0].reason,
        MatchFailure::ValueMismatch(ClaimPath::from(["credentialSubject", "degree", "type"]))
    );
}

// Should still sign when the verifier sends no challenge.
#[test]
fn challenge_omitted() {
    init_tracing();
    let wallet = Wallet::new();
    let query = json!({"credentials": [degree_query()]});

    let vp = create_presentation(&query.to_string(), &ISSUER.degree(), None, &wallet)
        .expect("should create presentation");

    assert_eq!(wallet.signatures(), 1);
    assert!(vp.challenge.is_none());
    assert!(vp.proof.as_ref().is_some_and(|proof| proof.get("challenge").is_none()));
    vp.verify().expect("should verify");
}

// Should keep only the disclosures needed for the requested claims.
#[test]
fn sd_jwt_disclosures() {
    init_tracing();
    let query = json!({
        "credentials": [{
            "id": "pid",
            "format": "dc+sd-jwt",
            "meta": {"vct_values": [PID_VCT]},
            "claims": [
                {"path": ["given_name"]},
                {"path": ["address", "locality"], "intent_to_retain": true}
            ]
        }]
    });

    let issued = ISSUER.pid();
    let vp = create_presentation(&query.to_string(), &issued, Some(CHALLENGE), &Wallet::new())
        .expect("should create presentation");

    let presented = vp.credential("pid").expect("should present pid");
    assert_eq!(presented.format, CredentialFormat::DcSdJwt);

    let Value::String(compact) = &presented.credential else {
        panic!("SD-JWT should be presented in compact form");
    };
    let issuer_jwt = issued.split('~').next().expect("should have issuer JWT");
    assert!(compact.starts_with(issuer_jwt));
    assert!(compact.ends_with('~'));

    // issuer JWT plus two disclosures
    let segments = compact.split('~').filter(|s| !s.is_empty()).count();
    assert_eq!(segments, 3);

    let claims = presented.claims().expect("should decode");
    assert_eq!(claims["given_name"], "Erika");
    assert_eq!(claims["address"]["locality"], "Koeln");
    assert!(claims.get("family_name").is_none());
    assert!(claims.get("birthdate").is_none());
}

// Should match JWT-secured W3C credentials.
#[test]
fn jwt_vc_json() {
    init_tracing();
    let query = json!({
        "credentials": [{
            "id": "degree",
            "format": "jwt_vc_json",
            "meta": {"type_values": [["VerifiableCredential", "ExampleDegree"]]},
            "claims": [{"path": ["credentialSubject", "degree", "type"], "values": ["Bachelor"]}]
        }]
    });

    let vp = create_presentation(&query.to_string(), &ISSUER.degree_jwt(), None, &Wallet::new())
        .expect("should create presentation");

    let presented = vp.credential("degree").expect("should present degree");
    assert_eq!(presented.format, CredentialFormat::JwtVcJson);
    assert_eq!(
        presented.credential["credentialSubject"],
        json!({"degree": {"type": "Bachelor"}})
    );
}

// Should satisfy the first claim set the credential can.
#[test]
fn claim_sets() {
    init_tracing();
    let query = json!({
        "credentials": [{
            "id": "degree",
            "format": "ldp_vc",
            "claims": [
                {"id": "gpa", "path": ["credentialSubject", "gpa"]},
                {"id": "type", "path": ["credentialSubject", "degree", "type"]},
                {"id": "name", "path": ["credentialSubject", "name"]}
            ],
            "claim_sets": [["gpa", "name"], ["type"]]
        }]
    });

    let vp = create_presentation(&query.to_string(), &ISSUER.degree(), None, &Wallet::new())
        .expect("should create presentation");

    let presented = vp.credential("degree").expect("should present degree");
    assert_eq!(
        presented.credential["credentialSubject"],
        json!({"degree": {"type": "Bachelor"}})
    );
}

// Should skip an optional credential set the holder cannot satisfy.
#[test]
fn optional_credential_set() {
    init_tracing();
    let query = json!({
        "credentials": [degree_query(), employee_query()],
        "credential_sets": [
            {"options": [["degree"]]},
            {"options": [["employee"]], "required": false}
        ]
    });

    let vp = create_presentation(&query.to_string(), &ISSUER.degree(), None, &Wallet::new())
        .expect("should create presentation");

    assert_eq!(vp.verifiable_credential.len(), 1);
    assert!(vp.credential("degree").is_some());
}

// Should present one credential per query from several candidates.
#[test]
fn several_candidates() {
    init_tracing();
    let query = json!({"credentials": [degree_query(), employee_query()]});
    let employee = ISSUER.employee();
    let degree = ISSUER.degree();

    let vp = Engine::new()
        .present(&query.to_string(), &[&employee, &degree], Some(CHALLENGE), &Wallet::new())
        .expect("should create presentation");

    let ids = vp.verifiable_credential.iter().map(|vc| vc.credential_query_id.as_str());
    assert_eq!(ids.collect::<Vec<_>>(), ["degree", "employee"]);
}

// Should prefer the candidate disclosing the fewest claims.
#[test]
fn fewest_claims() {
    init_tracing();
    let query = json!({
        "credentials": [{
            "id": "degree",
            "format": "ldp_vc",
            "claims": [
                {"path": ["credentialSubject", "degree", "type"]},
                {"path": ["credentialSubject", "languages", null], "optional": true}
            ]
        }]
    });
    let with_languages = ISSUER.degree();
    let without_languages = ISSUER.ldp_vc(&json!({
        "type": ["VerifiableCredential", "ExampleDegree"],
        "credentialSubject": {"degree": {"type": "Bachelor"}}
    }));
    let candidates = [with_languages.as_str(), without_languages.as_str()];

    let first = Engine::new()
        .present(&query.to_string(), &candidates, None, &Wallet::new())
        .expect("should create presentation");
    assert!(first.verifiable_credential[0].credential["credentialSubject"]["languages"].is_array());

    let options = Options { tie_break: TieBreak::FewestClaims, ..Options::default() };
    let fewest = Engine::new()
        .with_options(options)
        .present(&query.to_string(), &candidates, None, &Wallet::new())
        .expect("should create presentation");
    assert!(fewest.verifiable_credential[0].credential["credentialSubject"].get("languages").is_none());
}

// Should accept the legacy `filter` form of value matching.
#[test]
fn legacy_filter() {
    init_tracing();
    let query = json!({
        "credentials": [{
            "id": "employee",
            "format": "ldp_vc",
            "claims": [{
                "path": ["credentialSubject", "employeeId"],
                "filter": {"type": "value", "value": "1234567890"}
            }]
        }]
    });

    let vp = create_presentation(&query.to_string(), &ISSUER.employee(), None, &Wallet::new())
        .expect("should create presentation");
    assert!(vp.credential("employee").is_some());
}

// Should reject malformed queries and credentials before matching.
#[test]
fn malformed_inputs() {
    init_tracing();
    let wallet = Wallet::new();

    let err = create_presentation("{not json", &ISSUER.degree(), None, &wallet)
        .expect_err("should reject query");
    assert!(matches!(err, Error::MalformedQuery(_)));

    let query = json!({"credentials": [degree_query(), degree_query()]});
    let err = create_presentation(&query.to_string(), &ISSUER.degree(), None, &wallet)
        .expect_err("should reject duplicate ids");
    assert!(matches!(err, Error::MalformedQuery(_)));

    let query = json!({"credentials": [degree_query()]});
    let err = create_presentation(&query.to_string(), "not-a-credential", None, &wallet)
        .expect_err("should reject credential");
    assert!(matches!(err, Error::MalformedCredential(_)));

    assert_eq!(wallet.signatures(), 0);
}

// Should parse and verify a serialized presentation.
#[test]
fn round_trip() {
    init_tracing();
    let query = json!({"credentials": [degree_query()]});
    let vp = create_presentation(&query.to_string(), &ISSUER.degree(), Some(CHALLENGE), &Wallet::new())
        .expect("should create presentation");

    let json = vp.to_json().expect("should serialize");
    let parsed = Presentation::from_json(&json).expect("should parse");
    assert_eq!(parsed, vp);
    parsed.verify().expect("should verify");

    let mut tampered = parsed;
    tampered.challenge = Some("another-nonce".to_string());
    assert!(tampered.verify().is_err());
}
