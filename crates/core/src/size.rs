//! Byte-count parsing and human-readable formatting.
//!
//! Suffix handling follows the convention of the surrounding tooling: bare
//! `K`/`M`/`G`/`T` and the explicit `KiB` family are binary multiples,
//! while `KB`/`MB`/`GB`/`TB` are decimal. A missing suffix means bytes.
//! Fractional values such as `12.5GB` are accepted and rounded to the
//! nearest byte.

use thiserror::Error;

/// One binary kibibyte.
pub const KIB: u64 = 1024;
/// One binary mebibyte.
pub const MIB: u64 = KIB * 1024;
/// One binary gibibyte.
pub const GIB: u64 = MIB * 1024;
/// One binary tebibyte.
pub const TIB: u64 = GIB * 1024;

/// Failure to interpret a textual size value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SizeParseError {
    /// The input was empty or all whitespace.
    #[error("empty size value")]
    Empty,
    /// The input carried a suffix that is not a recognised unit.
    #[error("unrecognised size suffix '{0}'")]
    UnknownSuffix(String),
    /// The numeric component could not be parsed.
    #[error("malformed numeric component '{0}'")]
    BadNumber(String),
    /// The value does not fit in a 64-bit byte count.
    #[error("size value overflows a 64-bit byte count")]
    TooLarge,
}

/// Parses a textual size such as `12.5GB`, `4GiB`, `512K`, or `1048576`
/// into a byte count.
///
/// # Errors
///
/// Returns a [`SizeParseError`] when the input is empty, the suffix is not
/// a recognised unit, the numeric component is malformed, or the result
/// overflows `u64`.
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SizeParseError::Empty);
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);
    if number.is_empty() {
        return Err(SizeParseError::BadNumber(trimmed.to_string()));
    }

    let unit = unit_multiplier(suffix.trim())
        .ok_or_else(|| SizeParseError::UnknownSuffix(suffix.trim().to_string()))?;

    scale(number, unit)
}

/// Parses a value for flags that default to gibibytes: a bare number is a
/// GiB count, anything with a suffix goes through [`parse_size`].
///
/// # Errors
///
/// Same failure modes as [`parse_size`].
pub fn parse_gib_argument(input: &str) -> Result<u64, SizeParseError> {
    let trimmed = input.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return scale(trimmed, GIB);
    }
    parse_size(trimmed)
}

/// Formats a byte count with binary units, e.g. `1.50GiB` or `123B`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(&str, u64); 4] = [("TiB", TIB), ("GiB", GIB), ("MiB", MIB), ("KiB", KIB)];
    for (label, unit) in UNITS {
        if bytes >= unit {
            #[allow(clippy::cast_precision_loss)]
            let value = bytes as f64 / unit as f64;
            return format!("{value:.2}{label}");
        }
    }
    format!("{bytes}B")
}

fn unit_multiplier(suffix: &str) -> Option<u64> {
    let lowered = suffix.to_ascii_lowercase();
    match lowered.as_str() {
        "" | "b" => Some(1),
        "k" | "kib" => Some(KIB),
        "kb" => Some(1_000),
        "m" | "mib" => Some(MIB),
        "mb" => Some(1_000_000),
        "g" | "gib" => Some(GIB),
        "gb" => Some(1_000_000_000),
        "t" | "tib" => Some(TIB),
        "tb" => Some(1_000_000_000_000),
        _ => None,
    }
}

/// Multiplies a decimal literal by a unit using integer arithmetic,
/// rounding the fractional part to the nearest byte.
fn scale(number: &str, unit: u64) -> Result<u64, SizeParseError> {
    let mut parts = number.splitn(2, '.');
    let integer_text = parts.next().unwrap_or("");
    let fraction_text = parts.next();

    if integer_text.is_empty() && fraction_text.is_none_or(str::is_empty) {
        return Err(SizeParseError::BadNumber(number.to_string()));
    }
    if fraction_text.is_some_and(|f| f.contains('.')) {
        return Err(SizeParseError::BadNumber(number.to_string()));
    }

    let integer: u128 = if integer_text.is_empty() {
        0
    } else {
        integer_text
            .parse()
            .map_err(|_| SizeParseError::BadNumber(number.to_string()))?
    };

    let mut total = integer
        .checked_mul(u128::from(unit))
        .ok_or(SizeParseError::TooLarge)?;

    if let Some(fraction_text) = fraction_text
        && !fraction_text.is_empty()
    {
        let fraction: u128 = fraction_text
            .parse()
            .map_err(|_| SizeParseError::BadNumber(number.to_string()))?;
        let denominator = 10u128
            .checked_pow(u32::try_from(fraction_text.len()).map_err(|_| SizeParseError::TooLarge)?)
            .ok_or(SizeParseError::TooLarge)?;
        let scaled = fraction
            .checked_mul(u128::from(unit))
            .ok_or(SizeParseError::TooLarge)?;
        total = total
            .checked_add((scaled + denominator / 2) / denominator)
            .ok_or(SizeParseError::TooLarge)?;
    }

    u64::try_from(total).map_err(|_| SizeParseError::TooLarge)
}
