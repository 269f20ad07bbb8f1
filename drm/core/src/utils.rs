/**
    Const-compatible equality for fixed 16-byte identifiers.
*/
pub(crate) const fn uuid_equal(a: &[u8; 16], b: &[u8; 16]) -> bool {
    let mut i = 0;
    while i < 16 {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/**
    Value of a single ASCII hex digit, case-insensitive.
*/
pub(crate) const fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/**
    Parse a hyphenated or plain 32-digit UUID string into raw bytes.
*/
pub(crate) const fn parse_uuid(s: &[u8]) -> Option<[u8; 16]> {
    let mut bytes = [0u8; 16];
    let mut bi = 0;
    let mut si = 0;

    while si < s.len() {
        if s[si] == b'-' {
            si += 1;
            continue;
        }
        if bi >= 16 || si + 1 >= s.len() {
            return None;
        }
        let hi = match hex_digit(s[si]) {
            Some(v) => v,
            None => return None,
        };
        let lo = match hex_digit(s[si + 1]) {
            Some(v) => v,
            None => return None,
        };
        bytes[bi] = (hi << 4) | lo;
        bi += 1;
        si += 2;
    }

    if bi != 16 { None } else { Some(bytes) }
}

/**
    Format raw bytes as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`.
*/
pub(crate) fn format_uuid(b: &[u8; 16]) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        hex::encode(&b[0..4]),
        hex::encode(&b[4..6]),
        hex::encode(&b[6..8]),
        hex::encode(&b[8..10]),
        hex::encode(&b[10..16]),
    )
}
