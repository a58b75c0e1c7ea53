use sha2::{Digest, Sha256};

/// SHA-256 hex fingerprint of a serialized token. Only fingerprints are
/// ever stored; the token itself stays with the client.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_hex() {
        let a = token_fingerprint("some.signed.token");
        assert_eq!(a.len(), 64);
        assert_eq!(a, token_fingerprint("some.signed.token"));
        assert_ne!(a, token_fingerprint("some.signed.token2"));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
