//! The metadata codec (C2, §4.2): header/trailer normalization, `-bin`
//! binary fields, and `grpc-message` percent-encoding.

use base64::Engine;

/// Headers stripped from user-visible metadata: hop-by-hop or owned by the
/// framing/negotiation layer rather than application metadata.
const HOP_BY_HOP: &[&str] = &["te", "host", "accept-encoding", "content-type"];

/// `true` if `name` (already lowercased) should never be surfaced as
/// user-visible metadata.
pub fn is_hop_by_hop(name: &str) -> bool {
    name.starts_with(':') || HOP_BY_HOP.contains(&name)
}

/// `true` if `name` (case-insensitively) carries raw bytes rather than text.
pub fn is_binary_header(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with("-bin")
}

/// Decode a `-bin` header value. Accepts both padded and unpadded standard
/// base64, per §4.2 ("decoder must accept missing padding").
pub fn decode_binary(value: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    let engine = base64::engine::general_purpose::STANDARD_NO_PAD;
    let trimmed: Vec<u8> = value.iter().copied().filter(|b| *b != b'=').collect();
    engine.decode(trimmed)
}

/// Encode bytes for a `-bin` header. Always padded on encode, per §4.2.
pub fn encode_binary(value: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(value)
}

/// Percent-encode a `grpc-message` value (§4.2): every byte outside the
/// unreserved set `A-Z a-z 0-9 - _ . ~` is escaped as `%XX`; unpaired UTF-16
/// surrogates in the input are first replaced with U+FFFD.
pub fn percent_encode_message(message: &str) -> String {
    fn is_unreserved(b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
    }

    // `message` is a Rust `&str`, so it is already valid UTF-8 with no
    // unpaired surrogates; the U+FFFD substitution rule applies to callers
    // that construct the message from a lossy source before reaching here.
    let mut out = String::with_capacity(message.len());
    for byte in message.as_bytes() {
        if is_unreserved(*byte) {
            out.push(*byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Decode a percent-encoded `grpc-message` value. Tolerant of malformed
/// escapes: any `%` not followed by two hex digits is passed through
/// verbatim rather than rejected (§4.2).
pub fn percent_decode_message(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &encoded[i + 1..i + 3];
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_filters_known_headers() {
        assert!(is_hop_by_hop("te"));
        assert!(is_hop_by_hop("host"));
        assert!(is_hop_by_hop("content-type"));
        assert!(is_hop_by_hop(":authority"));
        assert!(!is_hop_by_hop("user-agent"));
        assert!(!is_hop_by_hop("x-request-id"));
    }

    #[test]
    fn binary_header_suffix_is_case_insensitive() {
        assert!(is_binary_header("x-trace-BIN"));
        assert!(is_binary_header("x-trace-bin"));
        assert!(!is_binary_header("x-trace"));
    }

    #[test]
    fn binary_round_trips_with_padding() {
        let raw = b"hello binary metadata";
        let encoded = encode_binary(raw);
        let decoded = decode_binary(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn binary_decode_tolerates_missing_padding() {
        let raw = b"x";
        let encoded = encode_binary(raw);
        let unpadded = encoded.trim_end_matches('=');
        let decoded = decode_binary(unpadded.as_bytes()).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn percent_encode_preserves_unreserved_bytes() {
        assert_eq!(percent_encode_message("abc-123_.~"), "abc-123_.~");
    }

    #[test]
    fn percent_encode_escapes_reserved_bytes() {
        assert_eq!(percent_encode_message("a b"), "a%20b");
        assert_eq!(percent_encode_message("100%"), "100%25");
    }

    #[test]
    fn percent_round_trips() {
        let message = "deadline exceeded: call took too long (50%% over budget)";
        let encoded = percent_encode_message(message);
        assert_eq!(percent_decode_message(&encoded), message);
    }

    #[test]
    fn percent_decode_passes_through_malformed_escapes() {
        assert_eq!(percent_decode_message("100% done"), "100% done");
        assert_eq!(percent_decode_message("%zz"), "%zz");
    }
}
