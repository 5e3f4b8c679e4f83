//! X-VERIFY checksums.
//!
//! Pay request:   `sha256_hex(base64_payload + "/pg/v1/pay" + salt_key) + "###" + salt_index`
//! S2S notice:    `sha256_hex(base64_response + salt_key) + "###" + salt_index`

use sha2::{Digest, Sha256};

pub const CHECKSUM_SEPARATOR: &str = "###";

fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Checksum for a request body posted to `api_path`.
pub fn request_checksum(
    base64_payload: &str,
    api_path: &str,
    salt_key: &str,
    salt_index: &str,
) -> String {
    format!(
        "{}{CHECKSUM_SEPARATOR}{salt_index}",
        sha256_hex(&[base64_payload, api_path, salt_key])
    )
}

/// Checksum the gateway attaches to a server-to-server notice.
pub fn notice_checksum(base64_response: &str, salt_key: &str, salt_index: &str) -> String {
    format!(
        "{}{CHECKSUM_SEPARATOR}{salt_index}",
        sha256_hex(&[base64_response, salt_key])
    )
}

/// Compare a received header against the expected checksum. Hex case and
/// surrounding whitespace are not significant.
pub fn checksum_matches(received: &str, expected: &str) -> bool {
    let received = received.trim();
    if received.len() != expected.len() {
        return false;
    }
    // Constant time over equal lengths.
    received
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| {
            acc | (a.to_ascii_lowercase() ^ b.to_ascii_lowercase())
        })
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_checksum_has_digest_then_index() {
        let c = request_checksum("eyJhIjoxfQ==", "/pg/v1/pay", "salt", "1");
        let (digest, index) = c.split_once(CHECKSUM_SEPARATOR).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(index, "1");
    }

    #[test]
    fn path_is_part_of_request_digest() {
        let a = request_checksum("eyJhIjoxfQ==", "/pg/v1/pay", "salt", "1");
        let b = request_checksum("eyJhIjoxfQ==", "/pg/v1/status", "salt", "1");
        assert_ne!(a, b);
    }

    #[test]
    fn notice_checksum_matches_known_digest() {
        // sha256("abc") with empty salt.
        let c = notice_checksum("abc", "", "2");
        assert_eq!(
            c,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad###2"
        );
    }

    #[test]
    fn checksum_comparison_ignores_case_and_whitespace() {
        let expected = notice_checksum("payload", "salt", "1");
        assert!(checksum_matches(&format!(" {} ", expected.to_uppercase()), &expected));
        assert!(!checksum_matches(&expected.replace("###1", "###2"), &expected));
        assert!(!checksum_matches("", &expected));
    }
}
