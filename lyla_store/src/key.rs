//! Reversible mapping from store keys to file names.
//!
//! ASCII letters, digits, `-` and `_` pass through; every other byte of the
//! UTF-8 key becomes `~XX` (uppercase hex).

#[must_use]
pub fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("~{byte:02X}"));
        }
    }
    out
}

/// Inverse of [`encode_key`]; `None` for names it could not have produced.
#[must_use]
pub fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'~' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_separators_and_unicode() {
        assert_eq!(encode_key("chat/alice"), "chat~2Falice");
        assert_eq!(encode_key("a b.c"), "a~20b~2Ec");
        assert_eq!(encode_key("é"), "~C3~A9");
        assert_eq!(encode_key("plain_key-1"), "plain_key-1");
    }

    #[test]
    fn decode_inverts_encode() {
        for key in ["chat/alice/classmate", "../etc/passwd", "ünï côdé", ""] {
            assert_eq!(decode_key(&encode_key(key)).as_deref(), Some(key));
        }
    }

    #[test]
    fn decode_rejects_malformed_names() {
        assert_eq!(decode_key("bad~G1"), None);
        assert_eq!(decode_key("trailing~2"), None);
    }
}
