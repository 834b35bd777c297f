//! Base64 framing for raw PCM audio embedded in JSON text frames.
//!
//! Encoding is plain RFC 4648 with `=` padding. Decoding is total: anything
//! outside the standard alphabet is skipped as noise, the first `=` ends the
//! payload, and a trailing partial quantum is decoded best-effort. Malformed
//! input yields whatever full 6-bit groups were available, never an error.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes for an `input_audio_buffer.append` frame.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode an audio `delta` payload.
///
/// Never fails: noise characters (whitespace, newlines, anything outside the
/// alphabet) are skipped and decoding stops at the first `=`.
#[must_use]
pub fn decode(text: &str) -> Vec<u8> {
    let mut filtered = Vec::with_capacity(text.len());
    for &b in text.as_bytes() {
        if b == b'=' {
            break;
        }
        if matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/') {
            filtered.push(b);
        }
    }
    // A lone trailing sextet carries no complete byte.
    if filtered.len() % 4 == 1 {
        filtered.pop();
    }
    LENIENT.decode(filtered).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_residues() {
        let data: Vec<u8> = (0..=255).collect();
        for len in [0, 1, 2, 3, 4, 7, 32, 100, 255, 256] {
            let slice = &data[..len.min(data.len())];
            assert_eq!(decode(&encode(slice)), slice, "len {len}");
        }
    }

    #[test]
    fn encode_pads_to_multiple_of_four() {
        for len in 0..=16 {
            let encoded = encode(&vec![0xAB; len]);
            assert_eq!(encoded.len() % 4, 0, "len {len}");
        }
    }

    #[test]
    fn empty_input_is_empty_string() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode(""), Vec::<u8>::new());
    }

    #[test]
    fn padding_rules() {
        assert_eq!(encode(b"f"), "Zg==");
        assert_eq!(encode(b"fo"), "Zm8=");
        assert_eq!(encode(b"foo"), "Zm9v");
        assert_eq!(decode("Zg=="), b"f");
        assert_eq!(decode("Zm8="), b"fo");
        assert_eq!(decode("Zm9v"), b"foo");
    }

    #[test]
    fn decode_skips_noise_characters() {
        assert_eq!(decode("Zm 9v\nYm\tFy"), b"foobar");
        assert_eq!(decode("!!Zm9v??"), b"foo");
    }

    #[test]
    fn decode_stops_at_padding() {
        assert_eq!(decode("Zm8=Zm8="), b"fo");
    }

    #[test]
    fn decode_is_total_on_truncated_input() {
        // Partial quantum: best-effort decode of complete 6-bit groups.
        assert_eq!(decode("Zm9"), b"fo");
        assert_eq!(decode("Zm"), b"f");
        // A single character holds no full byte.
        assert_eq!(decode("Z"), Vec::<u8>::new());
    }
}
