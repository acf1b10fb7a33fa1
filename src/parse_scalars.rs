//! Conversion of scalar text into booleans and numbers.
//!
//! Numbers accept `0x`, `0o`, `0b` prefixes and (optionally)
//! a leading `0` for octal, followed by at most one unit suffix from [`UNITS`] that must end
//! the text exactly.

/// Unit suffixes and their multipliers.
pub(crate) const UNITS: &[(&str, u64)] = &[
    ("k", 1_000),
    ("ki", 1 << 10),
    ("M", 1_000_000),
    ("Mi", 1 << 20),
    ("G", 1_000_000_000),
    ("Gi", 1 << 30),
    ("T", 1_000_000_000_000),
    ("Ti", 1 << 40),
    ("P", 1_000_000_000_000_000),
    ("Pi", 1 << 50),
    ("E", 1_000_000_000_000_000_000),
    ("Ei", 1 << 60),
];

/// Multiplier for an exact unit suffix.
pub(crate) fn unit_multiplier(suffix: &str) -> Option<u64> {
    UNITS
        .iter()
        .find(|(name, _)| *name == suffix)
        .map(|(_, value)| *value)
}

/// Parse a YAML 1.1 boolean from a &str (handles the "Norway problem").
///
/// Accepted TRUE literals (case-insensitive): "y", "yes", "true", "on"
/// Accepted FALSE literals (case-insensitive): "n", "no", "false", "off"
///
/// Returns:
/// - Ok(true/false) on success
/// - Err(...) if the input is not a boolean literal
pub(crate) fn parse_yaml11_bool(s: &str) -> Result<bool, String> {
    let t = s.trim();
    if t.eq_ignore_ascii_case("true")
        || t.eq_ignore_ascii_case("yes")
        || t.eq_ignore_ascii_case("y")
        || t.eq_ignore_ascii_case("on")
    {
        Ok(true)
    } else if t.eq_ignore_ascii_case("false")
        || t.eq_ignore_ascii_case("no")
        || t.eq_ignore_ascii_case("n")
        || t.eq_ignore_ascii_case("off")
    {
        Ok(false)
    } else {
        Err(format!("`{s}` is not a boolean, expected yes/no, true/false, on/off or y/n"))
    }
}

fn parse_digits_u128(digits: &str, radix: u32) -> Option<u128> {
    let mut val: u128 = 0;
    let mut saw = false;
    for c in digits.chars() {
        if c == '_' {
            continue;
        }
        let d = c.to_digit(radix)?;
        val = val.checked_mul(radix as u128)?;
        val = val.checked_add(d as u128)?;
        saw = true;
    }
    if saw { Some(val) } else { None }
}

/// Split off a sign, detect the radix and separate digits from the unit suffix.
fn split_integer(t: &str, legacy_octal: bool) -> (bool, u32, &str, &str) {
    let (neg, rest) = match t.strip_prefix('+') {
        Some(r) => (false, r),
        None => match t.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, t),
        },
    };

    let (radix, body) = if let Some(r) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        (16u32, r)
    } else if let Some(r) = rest.strip_prefix("0o").or_else(|| rest.strip_prefix("0O")) {
        (8u32, r)
    } else if let Some(r) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        (2u32, r)
    } else if legacy_octal
        && rest.len() > 1
        && rest.starts_with('0')
        && rest[1..].starts_with(|c: char| c.is_ascii_digit() || c == '_')
    {
        (8u32, &rest[1..])
    } else {
        (10u32, rest)
    };

    let end = body
        .find(|c: char| !(c == '_' || c.is_digit(radix)))
        .unwrap_or(body.len());
    let (digits, suffix) = body.split_at(end);
    (neg, radix, digits, suffix)
}

/// Magnitude of an integer literal with its unit applied.
fn integer_magnitude(s: &str, legacy_octal: bool, ty: &str) -> Result<(bool, u128), String> {
    let t = s.trim();
    let (neg, radix, digits, suffix) = split_integer(t, legacy_octal);
    let mag = parse_digits_u128(digits, radix).ok_or_else(|| format!("`{s}` is not a valid {ty}"))?;
    let mag = if suffix.is_empty() {
        mag
    } else {
        let mult = unit_multiplier(suffix)
            .ok_or_else(|| format!("`{s}` is not a valid {ty}: unknown unit suffix `{suffix}`"))?;
        mag.checked_mul(mult as u128)
            .ok_or_else(|| format!("{ty} `{s}` is out of range"))?
    };
    Ok((neg, mag))
}

/// Parse a signed integer with an optional unit suffix.
///
/// Arguments:
/// - `s`: scalar text.
/// - `legacy_octal`: a leading `0` selects base 8.
///
/// Returns:
/// - The value, or a message suitable for a value error.
pub(crate) fn parse_int(s: &str, legacy_octal: bool) -> Result<i64, String> {
    let (neg, mag) = integer_magnitude(s, legacy_octal, "integer")?;
    let out_of_range = || format!("integer `{s}` is out of range");
    let mag_i128: i128 = mag.try_into().map_err(|_| out_of_range())?;
    let val = if neg {
        mag_i128.checked_neg().ok_or_else(out_of_range)?
    } else {
        mag_i128
    };
    i64::try_from(val).map_err(|_| out_of_range())
}

/// Parse an unsigned integer with an optional unit suffix. A leading `-` is rejected.
pub(crate) fn parse_uint(s: &str, legacy_octal: bool) -> Result<u64, String> {
    if s.trim_start().starts_with('-') {
        return Err(format!("`{s}` is not a valid unsigned integer"));
    }
    let (_, mag) = integer_magnitude(s, legacy_octal, "unsigned integer")?;
    u64::try_from(mag).map_err(|_| format!("unsigned integer `{s}` is out of range"))
}

/// Length of the longest prefix of `t` that reads as a decimal floating-point number.
fn float_prefix_len(t: &str) -> usize {
    let b = t.as_bytes();
    let mut i = 0;
    if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    let mut saw_digits = i > int_start;
    if i < b.len() && b[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        if saw_digits || j > frac_start {
            saw_digits = true;
            i = j;
        }
    }
    if !saw_digits {
        return 0;
    }
    // The exponent only counts when digits follow, so `1E` keeps `E` as a unit.
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        let mut j = i + 1;
        if j < b.len() && (b[j] == b'+' || b[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    i
}

/// Parse a float with an optional unit suffix. Accepts `.inf`, `-.inf` and `.nan` too.
pub(crate) fn parse_float(s: &str) -> Result<f64, String> {
    let t = s.trim();
    let lower = t.to_ascii_lowercase();
    match lower.as_str() {
        ".nan" | "+.nan" | "-.nan" | "nan" => return Ok(f64::NAN),
        ".inf" | "+.inf" | "inf" | "+inf" | "infinity" => return Ok(f64::INFINITY),
        "-.inf" | "-inf" | "-infinity" => return Ok(f64::NEG_INFINITY),
        _ => {}
    }
    let end = float_prefix_len(t);
    let (number, suffix) = t.split_at(end);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("`{s}` is not a valid floating point value"))?;
    if suffix.is_empty() {
        Ok(value)
    } else {
        let mult = unit_multiplier(suffix).ok_or_else(|| {
            format!("`{s}` is not a valid floating point value: unknown unit suffix `{suffix}`")
        })?;
        Ok(value * mult as f64)
    }
}

/// True for the scalars that mean "no value" when written plain: empty, `~` and `null`.
pub(crate) fn is_null_like(value: &str) -> bool {
    matches!(value, "" | "~" | "null" | "Null" | "NULL")
}
