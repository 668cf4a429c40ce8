//! Byte-level integer scanning shared by the record parsers

/// Whether `b` separates a timestamp from its payload
pub(crate) fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Index of the first byte at or after `pos` that is not ASCII whitespace
pub(crate) fn skip_whitespace(bytes: &[u8], pos: usize) -> usize {
    let skipped = bytes
        .get(pos..)
        .map_or(0, |rest| rest.iter().take_while(|b| b.is_ascii_whitespace()).count());
    pos.saturating_add(skipped)
}

/// Index of the first byte at or after `pos` that is not a blank
pub(crate) fn skip_blanks(bytes: &[u8], pos: usize) -> usize {
    let skipped = bytes
        .get(pos..)
        .map_or(0, |rest| rest.iter().take_while(|b| is_blank(**b)).count());
    pos.saturating_add(skipped)
}

/// Parse an optionally signed decimal integer starting exactly at `pos`.
///
/// Returns the value and the index just past its last digit. `None` when no
/// digit follows the optional sign or the value overflows `i64`.
pub(crate) fn signed_int(bytes: &[u8], pos: usize) -> Option<(i64, usize)> {
    let (negative, digits_at) = match bytes.get(pos) {
        Some(b'-') => (true, pos.checked_add(1)?),
        Some(b'+') => (false, pos.checked_add(1)?),
        _ => (false, pos),
    };
    let (magnitude, end) = unsigned_int(bytes, digits_at)?;
    let value = if negative {
        0i64.checked_sub(magnitude)?
    } else {
        magnitude
    };
    Some((value, end))
}

/// Parse a run of decimal digits starting exactly at `pos`
pub(crate) fn unsigned_int(bytes: &[u8], pos: usize) -> Option<(i64, usize)> {
    let digits = bytes.get(pos..)?;
    let mut value = 0i64;
    let mut len = 0usize;
    for b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        value = value.checked_mul(10)?.checked_add(i64::from(b - b'0'))?;
        len += 1;
    }
    if len == 0 {
        return None;
    }
    Some((value, pos.checked_add(len)?))
}
