//! Text encoders: byte strings to C identifiers or C string-literal bodies.
//!
//! Both are total over arbitrary bytes and deterministic. The output length
//! is computed first so the buffer is allocated once.

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn push_hex(out: &mut String, b: u8) {
    out.push(char::from(HEX[usize::from(b >> 4)]));
    out.push(char::from(HEX[usize::from(b & 0x0F)]));
}

fn is_ident_byte(b: u8) -> bool { b.is_ascii_alphanumeric() || b == b'_' }

fn is_marker(bytes: &[u8], i: usize) -> bool { bytes[i] == b'_' && bytes.get(i + 1) == Some(&b'X') }

/// Length of [`to_identifier`]'s output.
pub fn identifier_len(bytes: &[u8]) -> usize {
    let mut len = 0;
    let mut i = 0;
    while i < bytes.len() {
        if is_marker(bytes, i) {
            len += 3;
            i += 2;
        } else {
            len += if is_ident_byte(bytes[i]) { 1 } else { 4 };
            i += 1;
        }
    }
    len
}

/// Encodes bytes as a bare identifier token.
///
/// ASCII alphanumerics and `_` pass through; any other byte becomes `_X`
/// followed by two uppercase hex digits. A literal `_X` in the input is
/// written `_X_` so it cannot be mistaken for an escape.
pub fn to_identifier(bytes: &[u8]) -> String {
    let len = identifier_len(bytes);
    let mut out = String::with_capacity(len);
    let mut i = 0;
    while i < bytes.len() {
        if is_marker(bytes, i) {
            out.push_str("_X_");
            i += 2;
            continue;
        }
        let b = bytes[i];
        if is_ident_byte(b) {
            out.push(char::from(b));
        } else {
            out.push_str("_X");
            push_hex(&mut out, b);
        }
        i += 1;
    }
    debug_assert_eq!(out.len(), len);
    out
}

/// Length of [`to_literal`]'s output.
pub fn literal_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .map(|&b| match b {
            b'\n' | b'\\' | b'"' => 2,
            0x20..=0x7E => 1,
            _ => 4,
        })
        .sum()
}

/// Encodes bytes as the body of a double-quoted C string literal.
///
/// Printable ASCII passes through except `\`, `"` and newline, which get
/// two-character escapes; every other byte becomes `\xHH`.
pub fn to_literal(bytes: &[u8]) -> String {
    let len = literal_len(bytes);
    let mut out = String::with_capacity(len);
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            0x20..=0x7E => out.push(char::from(b)),
            _ => {
                out.push_str("\\x");
                push_hex(&mut out, b);
            }
        }
    }
    debug_assert_eq!(out.len(), len);
    out
}
