//! The timeout codec (C3, §4.3): `grpc-timeout` header parsing/formatting.

use std::time::Duration;

/// A `grpc-timeout` unit suffix and its corresponding nanosecond multiplier.
const UNITS: &[(u8, u64)] = &[
    (b'H', 3_600_000_000_000),
    (b'M', 60_000_000_000),
    (b'S', 1_000_000_000),
    (b'm', 1_000_000),
    (b'u', 1_000),
    (b'n', 1),
];

/// Parse a `grpc-timeout` header value: one or more ASCII digits followed by
/// exactly one unit suffix in `{H,M,S,m,u,n}`. Whitespace, signs, fractions,
/// separators, a `0` value in any unit, or an overflowing value are all
/// invalid and return `None` (§4.3: caller emits `InvalidTimeoutIgnored` and
/// proceeds without a deadline).
pub fn parse_timeout(value: &str) -> Option<Duration> {
    let bytes = value.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let (digits, unit) = bytes.split_at(bytes.len() - 1);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let unit = unit[0];
    let multiplier = UNITS.iter().find(|(u, _)| *u == unit)?.1;

    let magnitude: u64 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    if magnitude == 0 {
        return None;
    }
    let nanos = magnitude.checked_mul(multiplier)?;
    if nanos == 0 {
        return None;
    }
    Some(Duration::from_nanos(nanos))
}

/// Format a duration back into a `grpc-timeout` value. Chooses the coarsest
/// unit that represents the duration exactly as whole units when possible,
/// falling back to nanoseconds; always round-trips through [`parse_timeout`].
pub fn format_timeout(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        // A zero duration has no valid `grpc-timeout` representation; the
        // smallest nonzero unit is the closest lossless encoding.
        return "1n".to_string();
    }
    for (unit, multiplier) in UNITS {
        let multiplier = *multiplier as u128;
        if nanos % multiplier == 0 {
            let magnitude = nanos / multiplier;
            if magnitude > 0 && magnitude <= u64::MAX as u128 {
                return format!("{magnitude}{}", *unit as char);
            }
        }
    }
    format!("{nanos}n")
}
