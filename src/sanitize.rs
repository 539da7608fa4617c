// src/sanitize.rs

// boundary checks for caller-supplied strings

// dependencies
use percent_encoding::percent_decode;
use std::str::Utf8Error;

pub const MAX_SECRET_LEN: usize = 1000;
pub const MAX_QUERY_PARAM_LEN: usize = 100;
pub const MAX_LOG_LEN: usize = 50;

/// Check a presented secret before it is compared.
/// Rejects NUL bytes, oversized input and input that is blank after trimming.
pub fn validate_secret(raw: &str) -> Option<&str> {
    if raw.contains('\0') || raw.len() > MAX_SECRET_LEN {
        return None;
    }
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Check a query parameter before use.
/// Rejects NUL and other control characters and oversized input.
pub fn validate_query_param(raw: &str) -> Option<&str> {
    if raw.len() > MAX_QUERY_PARAM_LEN || raw.chars().any(char::is_control) {
        return None;
    }
    Some(raw.trim())
}

/// Find `key` in an `application/x-www-form-urlencoded` string and decode its value.
/// Returns an error when a name or value does not decode to valid UTF-8.
pub fn form_field(encoded: &[u8], key: &str) -> Result<Option<String>, Utf8Error> {
    for pair in encoded.split(|b| *b == b'&').filter(|pair| !pair.is_empty()) {
        let (name, value) = match pair.iter().position(|b| *b == b'=') {
            Some(at) => (&pair[..at], &pair[at + 1..]),
            None => (pair, &[][..]),
        };
        if decode_component(name)? == key {
            return decode_component(value).map(Some);
        }
    }
    Ok(None)
}

fn decode_component(raw: &[u8]) -> Result<String, Utf8Error> {
    let spaced: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    percent_decode(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
}

/// Make a caller-supplied string safe to log or store: control characters
/// are removed and long input is cut to `MAX_LOG_LEN` characters.
pub fn sanitize_for_log(input: &str) -> String {
    let cleaned: String = input.chars().filter(|c| !c.is_control()).collect();
    if cleaned.chars().count() <= MAX_LOG_LEN {
        return cleaned;
    }
    let mut cut: String = cleaned.chars().take(MAX_LOG_LEN - 3).collect();
    cut.push_str("...");
    cut
}
