//! Property-based tests for tool inputs, identifier checks, and PKCE.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use proptest::prelude::*;
use sha2::{Digest, Sha256};

use airtable_remote_mcp::models::{ListRecordsInput, SearchRecordsInput, is_valid_id};
use airtable_remote_mcp::server::oauth::pkce::{self, PkceError};

fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

proptest! {
    /// Any well-formed verifier matches the challenge derived from it.
    #[test]
    fn pkce_verifier_roundtrip(verifier in "[A-Za-z0-9\\-._~]{43,128}") {
        let challenge = challenge_for(&verifier);
        prop_assert_eq!(pkce::verify_s256(&verifier, &challenge), Ok(()));
    }

    /// A different well-formed verifier never matches the challenge.
    #[test]
    fn pkce_wrong_verifier_rejected(
        verifier in "[A-Za-z0-9\\-._~]{43,128}",
        other in "[A-Za-z0-9\\-._~]{43,128}",
    ) {
        prop_assume!(verifier != other);
        let challenge = challenge_for(&verifier);
        prop_assert_eq!(pkce::verify_s256(&other, &challenge), Err(PkceError::Mismatch));
    }

    /// Verifiers outside the RFC 7636 length window are malformed.
    #[test]
    fn pkce_length_window_enforced(verifier in "[A-Za-z0-9]{1,42}") {
        let challenge = challenge_for(&verifier);
        prop_assert_eq!(
            pkce::verify_s256(&verifier, &challenge),
            Err(PkceError::MalformedVerifier)
        );
    }

    /// A verifier with one character outside the allowed set is malformed.
    #[test]
    fn pkce_charset_enforced(prefix in "[A-Za-z0-9]{43,100}", bad in "[!@#$%^&* ()+=]") {
        let verifier = format!("{prefix}{bad}");
        let challenge = challenge_for(&verifier);
        prop_assert_eq!(
            pkce::verify_s256(&verifier, &challenge),
            Err(PkceError::MalformedVerifier)
        );
    }

    /// Identifiers with the right prefix and 14+ alphanumerics validate.
    #[test]
    fn record_ids_validate(suffix in "[a-zA-Z0-9]{14,20}") {
        let id = format!("rec{suffix}");
        prop_assert!(is_valid_id(&id, "rec"));
        prop_assert!(!is_valid_id(&id, "app"));
    }

    /// Short identifier bodies never validate.
    #[test]
    fn short_ids_rejected(suffix in "[a-zA-Z0-9]{0,13}") {
        let id = format!("tbl{suffix}");
        prop_assert!(!is_valid_id(&id, "tbl"));
    }

    /// List input deserializes from any schema-shaped JSON.
    #[test]
    fn list_records_input_accepts_valid_json(
        max_records in proptest::option::of(1u32..1000),
        view in proptest::option::of("[a-zA-Z ]{1,30}"),
    ) {
        let mut json = serde_json::json!({
            "baseId": "appABCDEF12345678",
            "tableId": "tblABCDEF12345678",
        });
        if let Some(max) = max_records {
            json["maxRecords"] = serde_json::json!(max);
        }
        if let Some(ref view) = view {
            json["view"] = serde_json::json!(view);
        }

        let input: ListRecordsInput = serde_json::from_value(json).expect("deserialize");
        prop_assert_eq!(input.max_records, max_records);
        prop_assert_eq!(input.view, view);
        prop_assert!(input.sort.is_empty());
    }

    /// Search input keeps arbitrary search terms intact.
    #[test]
    fn search_input_preserves_term(term in "[ -~]{1,80}") {
        let json = serde_json::json!({
            "baseId": "appABCDEF12345678",
            "tableId": "tblABCDEF12345678",
            "searchTerm": term,
        });

        let input: SearchRecordsInput = serde_json::from_value(json).expect("deserialize");
        prop_assert_eq!(&input.search_term, &term);
        prop_assert!(input.field_ids.is_empty());
    }
}

#[test]
fn list_records_input_rejects_missing_table() {
    let json = serde_json::json!({
        "baseId": "appABCDEF12345678"
    });

    let result = serde_json::from_value::<ListRecordsInput>(json);
    assert!(result.is_err());
}

#[test]
fn search_input_rejects_missing_term() {
    let json = serde_json::json!({
        "baseId": "appABCDEF12345678",
        "tableId": "tblABCDEF12345678"
    });

    let result = serde_json::from_value::<SearchRecordsInput>(json);
    assert!(result.is_err());
}

#[test]
fn pkce_rfc7636_appendix_b_vector() {
    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
    assert_eq!(pkce::verify_s256(verifier, challenge), Ok(()));
}
