//! Integer literals as the command line writes them.

/// Parse the unsigned integer at the start of `s`, detecting the base from
/// its prefix: `0x`/`0X` hexadecimal, a leading `0` octal, decimal otherwise.
///
/// Returns the value and the number of bytes consumed, or `None` when `s`
/// does not start with a digit or the value overflows.
pub fn parse_uint_prefix(s: &[u8]) -> Option<(u64, usize)> {
    let (radix, start) = match s {
        [b'0', b'x' | b'X', d, ..] if d.is_ascii_hexdigit() => (16, 2),
        [b'0', ..] => (8, 0),
        [d, ..] if d.is_ascii_digit() => (10, 0),
        _ => return None,
    };

    let mut value: u64 = 0;
    let mut end = start;
    while let Some(digit) = s.get(end).and_then(|&b| char::from(b).to_digit(radix)) {
        value = value.checked_mul(u64::from(radix))?.checked_add(u64::from(digit))?;
        end += 1;
    }
    Some((value, end))
}

/// Parse all of `s` as one integer.
pub fn parse_uint(s: &str) -> Option<u64> {
    match parse_uint_prefix(s.as_bytes())? {
        (value, len) if len == s.len() => Some(value),
        _ => None,
    }
}
