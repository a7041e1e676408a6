//! PKCE (Proof Key for Code Exchange) verification.
//!
//! Implements S256 code challenge verification per RFC 7636. The `plain`
//! method is deliberately not supported.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// PKCE validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PkceError {
    /// The challenge method is anything other than `S256`.
    #[error("code_challenge_method must be S256")]
    UnsupportedChallengeMethod,

    /// The verifier is outside RFC 7636 length or charset rules.
    #[error("code_verifier must be 43-128 characters from [A-Za-z0-9-._~]")]
    MalformedVerifier,

    /// The verifier does not hash to the stored challenge.
    #[error("code_verifier does not match code_challenge")]
    Mismatch,
}

/// Check that a requested challenge method is supported.
///
/// # Errors
///
/// Returns `UnsupportedChallengeMethod` for anything other than `S256`,
/// including `plain`.
pub fn validate_challenge_method(method: &str) -> Result<(), PkceError> {
    if method == "S256" { Ok(()) } else { Err(PkceError::UnsupportedChallengeMethod) }
}

/// Verify a PKCE S256 code verifier against a stored challenge.
///
/// Computes `BASE64URL(SHA256(code_verifier))` and compares it to the stored
/// challenge in constant time.
///
/// # Errors
///
/// Returns `MalformedVerifier` if the verifier breaks RFC 7636 syntax rules,
/// or `Mismatch` if the hash comparison fails.
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> Result<(), PkceError> {
    if !verifier_is_well_formed(code_verifier) {
        return Err(PkceError::MalformedVerifier);
    }

    let hash = Sha256::digest(code_verifier.as_bytes());
    let computed = URL_SAFE_NO_PAD.encode(hash);

    if bool::from(computed.as_bytes().ct_eq(code_challenge.as_bytes())) {
        Ok(())
    } else {
        Err(PkceError::Mismatch)
    }
}

/// RFC 7636 §4.1: 43-128 characters of `[A-Za-z0-9]`, `-`, `.`, `_`, `~`.
fn verifier_is_well_formed(verifier: &str) -> bool {
    (43..=128).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B test vector.
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_s256_valid() {
        assert_eq!(verify_s256(VERIFIER, CHALLENGE), Ok(()));
    }

    #[test]
    fn test_s256_case_sensitive() {
        // Same challenge with one character's case flipped.
        let flipped = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-CM";
        assert_eq!(verify_s256(VERIFIER, flipped), Err(PkceError::Mismatch));
    }

    #[test]
    fn test_s256_wrong_verifier() {
        let wrong = "wrong-verifier-wrong-verifier-wrong-verifier-wrong";
        assert_eq!(verify_s256(wrong, CHALLENGE), Err(PkceError::Mismatch));
    }

    #[test]
    fn test_verifier_too_short() {
        assert_eq!(verify_s256("short", CHALLENGE), Err(PkceError::MalformedVerifier));
    }

    #[test]
    fn test_verifier_too_long() {
        let long = "a".repeat(129);
        assert_eq!(verify_s256(&long, CHALLENGE), Err(PkceError::MalformedVerifier));
    }

    #[test]
    fn test_verifier_bad_charset() {
        let bad = format!("{}!", "a".repeat(42));
        assert_eq!(verify_s256(&bad, CHALLENGE), Err(PkceError::MalformedVerifier));
    }

    #[test]
    fn test_challenge_method_gate() {
        assert_eq!(validate_challenge_method("S256"), Ok(()));
        assert_eq!(
            validate_challenge_method("plain"),
            Err(PkceError::UnsupportedChallengeMethod)
        );
        assert_eq!(validate_challenge_method("s256"), Err(PkceError::UnsupportedChallengeMethod));
    }

    #[test]
    fn test_s256_roundtrip() {
        let verifier = "Lorem-ipsum_dolor.sit~amet0123456789abcdefgh";
        let hash = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(hash);
        assert_eq!(verify_s256(verifier, &challenge), Ok(()));
    }
}
