//! Predefined XML entities and character classes shared by the writers,
//! the tokenizer and the repair machine.

/// Entity spellings for the five characters that must never appear raw
/// in chardata or attribute values.
const ENTITIES: [(u8, &str); 5] = [
    (b'<', "&lt;"),
    (b'>', "&gt;"),
    (b'&', "&amp;"),
    (b'\'', "&apos;"),
    (b'"', "&quot;"),
];

/// Entity spelling for a special byte, if it has one.
pub fn entity_for(c: u8) -> Option<&'static str> {
    ENTITIES.iter().find(|(b, _)| *b == c).map(|(_, s)| *s)
}

/// Expansion of a predefined entity name (without `&` and `;`).
pub fn expand_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => None,
    }
}

/// Position of the next byte needing entity encoding, if any.
pub fn find_next_special(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|b| entity_for(*b).is_some())
}

/// Append `buf` to `out`, replacing special bytes with their entities.
pub fn push_coded_entities(out: &mut Vec<u8>, mut buf: &[u8]) {
    while let Some(i) = find_next_special(buf) {
        out.extend_from_slice(&buf[..i]);
        out.extend_from_slice(entity_for(buf[i]).unwrap().as_bytes());
        buf = &buf[i + 1..];
    }
    out.extend_from_slice(buf);
}

pub fn is_xml_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n')
}

/// True if the whole buffer is XML whitespace.
pub fn is_xml_space(buf: &[u8]) -> bool {
    buf.iter().copied().all(is_xml_whitespace)
}

pub fn skip_xml_whitespace(buf: &[u8]) -> &[u8] {
    let n = buf.iter().take_while(|b| is_xml_whitespace(**b)).count();
    &buf[n..]
}

/// Name-start characters, byte-approximated: multibyte UTF-8 is allowed
/// through so that non-ASCII tag names survive untouched.
pub fn is_name_start_char(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b':' || c >= 0x80
}

pub fn is_name_char(c: u8) -> bool {
    is_name_start_char(c) || c.is_ascii_digit() || c == b'-' || c == b'.'
}

pub fn is_xml_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

pub fn is_xml_xdigit(c: u8) -> bool {
    c.is_ascii_hexdigit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coded_entities_replace_specials_only() {
        let mut out = Vec::new();
        push_coded_entities(&mut out, b"a < b & c");
        assert_eq!(out, b"a &lt; b &amp; c");
    }

    #[test]
    fn expand_round_trips_entity_table() {
        for (byte, spelling) in ENTITIES {
            let name = &spelling[1..spelling.len() - 1];
            assert_eq!(expand_entity(name), Some(byte as char));
        }
        assert_eq!(expand_entity("nbsp"), None);
    }

    #[test]
    fn whitespace_classifier() {
        assert!(is_xml_space(b" \t\r\n"));
        assert!(!is_xml_space(b" x "));
        assert!(is_xml_space(b""));
    }
}
