//! Text-to-number conversions behind the typed path and form accessors.
//!
//! The rules are the classic `strconv` ones most HTTP tooling expects from
//! query strings and path segments, which are looser than Rust's `FromStr`:
//!
//! - integers take an explicit base, or base `0` to infer it from a `0x`,
//!   `0o`, `0b` or leading-`0` prefix (with `_` digit separators allowed);
//! - a bit size narrows the accepted range without changing the return type;
//! - floats may be written in hex with a binary exponent (`0x1.8p3`);
//! - booleans accept `1`, `t`, `T`, `TRUE`, `true`, `True` and their negatives;
//! - complex numbers read as `a`, `bi` or `a±bi`, optionally in parentheses.
//!
//! None of these functions panic. Every failure is a [`ParseError`] naming the
//! function, the input and what was wrong with it.

use std::fmt;

/// Why an input was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseErrorKind {
    Syntax,
    Range,
    Base(u32),
    BitSize(u32),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => f.write_str("invalid syntax"),
            Self::Range => f.write_str("value out of range"),
            Self::Base(base) => write!(f, "invalid base {base}"),
            Self::BitSize(bits) => write!(f, "invalid bit size {bits}"),
        }
    }
}

/// A failed numeric or boolean conversion.
///
/// Displays as `parse_int: parsing "abc": invalid syntax`.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{func}: parsing {input:?}: {kind}")]
pub struct ParseError {
    pub func: &'static str,
    pub input: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    fn new(func: &'static str, input: &str, kind: ParseErrorKind) -> Self {
        Self { func, input: input.to_owned(), kind }
    }
}

/// A complex number with `f64` parts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}{:+}i)", self.re, self.im)
    }
}

// ── Integers ──────────────────────────────────────────────────────────────────

/// Parses a signed integer in `base` (0 or 2..=36) that fits in `bits` bits
/// (0 means 64).
pub fn parse_int(s: &str, base: u32, bits: u32) -> Result<i64, ParseError> {
    const FN: &str = "parse_int";

    let bits = if bits == 0 { 64 } else { bits };
    if bits > 64 {
        return Err(ParseError::new(FN, s, ParseErrorKind::BitSize(bits)));
    }

    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let magnitude = unsigned(digits, base).map_err(|kind| ParseError::new(FN, s, kind))?;

    let limit = 1u64 << (bits - 1);
    if negative {
        if magnitude > limit {
            return Err(ParseError::new(FN, s, ParseErrorKind::Range));
        }
        // `limit` itself is i64::MIN's magnitude when bits == 64.
        Ok((magnitude as i64).wrapping_neg())
    } else {
        if magnitude >= limit {
            return Err(ParseError::new(FN, s, ParseErrorKind::Range));
        }
        Ok(magnitude as i64)
    }
}

/// Parses an unsigned integer in `base` (0 or 2..=36) that fits in `bits`
/// bits (0 means 64). Signs are rejected.
pub fn parse_uint(s: &str, base: u32, bits: u32) -> Result<u64, ParseError> {
    const FN: &str = "parse_uint";

    let bits = if bits == 0 { 64 } else { bits };
    if bits > 64 {
        return Err(ParseError::new(FN, s, ParseErrorKind::BitSize(bits)));
    }

    let value = unsigned(s, base).map_err(|kind| ParseError::new(FN, s, kind))?;
    if bits < 64 && value >= 1u64 << bits {
        return Err(ParseError::new(FN, s, ParseErrorKind::Range));
    }
    Ok(value)
}

/// Shared digit loop. `s` carries no sign.
fn unsigned(s: &str, base: u32) -> Result<u64, ParseErrorKind> {
    if s.is_empty() {
        return Err(ParseErrorKind::Syntax);
    }

    let (base, digits, separators) = match base {
        0 => {
            let lower = s.get(..2).map(str::to_ascii_lowercase);
            match lower.as_deref() {
                Some("0x") => (16, &s[2..], true),
                Some("0o") => (8, &s[2..], true),
                Some("0b") => (2, &s[2..], true),
                _ if s.len() > 1 && s.starts_with('0') => (8, &s[1..], true),
                _ => (10, s, true),
            }
        }
        2..=36 => (base, s, false),
        other => return Err(ParseErrorKind::Base(other)),
    };

    if separators && !separators_ok(s) {
        return Err(ParseErrorKind::Syntax);
    }

    let mut value: u64 = 0;
    let mut seen_digit = false;
    for c in digits.chars() {
        if c == '_' && separators {
            continue;
        }
        let digit = c.to_digit(base).ok_or(ParseErrorKind::Syntax)?;
        value = value
            .checked_mul(u64::from(base))
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or(ParseErrorKind::Range)?;
        seen_digit = true;
    }

    if !seen_digit {
        return Err(ParseErrorKind::Syntax);
    }
    Ok(value)
}

/// `_` may only sit between digits. A base prefix counts as a digit, so
/// `0x_ff` is fine while `_1`, `1__0` and `1_` are not.
fn separators_ok(s: &str) -> bool {
    if !s.contains('_') {
        return true;
    }
    let bytes = s.as_bytes();
    let (start, mut prev_digit) = match bytes {
        [b'0', b'x' | b'X' | b'o' | b'O' | b'b' | b'B', ..] => (2, true),
        _ => (0, false),
    };

    for &b in &bytes[start..] {
        if b == b'_' {
            if !prev_digit {
                return false;
            }
            prev_digit = false;
        } else {
            prev_digit = true;
        }
    }
    prev_digit
}

// ── Floats ────────────────────────────────────────────────────────────────────

/// Parses a float. `bits` 32 rounds the value through `f32`; any other bit
/// size means 64.
///
/// Decimal and hexadecimal (`0x1.8p3`, binary exponent required) forms are
/// accepted. Finite inputs that overflow the target width are range errors;
/// `inf`, `infinity` and `nan` in any case are accepted as such.
pub fn parse_float(s: &str, bits: u32) -> Result<f64, ParseError> {
    float("parse_float", s, bits)
}

fn float(func: &'static str, s: &str, bits: u32) -> Result<f64, ParseError> {
    let err = |kind| ParseError::new(func, s, kind);
    let single = bits == 32;

    let value = if has_hex_prefix(s) {
        let value = hex_float(s).map_err(err)?;
        if single { f64::from(value as f32) } else { value }
    } else if single {
        s.parse::<f32>().map(f64::from).map_err(|_| err(ParseErrorKind::Syntax))?
    } else {
        s.parse::<f64>().map_err(|_| err(ParseErrorKind::Syntax))?
    };

    if value.is_infinite() && !names_infinity(s) {
        return Err(err(ParseErrorKind::Range));
    }
    Ok(value)
}

fn has_hex_prefix(s: &str) -> bool {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    unsigned.starts_with("0x") || unsigned.starts_with("0X")
}

/// `[sign]0x` mantissa `p` exponent, where the mantissa is hex digits with
/// at most one `.` and `_` separators, and the exponent is a signed decimal
/// power of two.
fn hex_float(s: &str) -> Result<f64, ParseErrorKind> {
    let (negative, unsigned) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (mantissa, exponent) = unsigned[2..]
        .split_once(['p', 'P'])
        .ok_or(ParseErrorKind::Syntax)?;
    if !separators_ok(&unsigned[..2 + mantissa.len()]) {
        return Err(ParseErrorKind::Syntax);
    }
    let exponent: i32 = exponent.parse().map_err(|_| ParseErrorKind::Syntax)?;

    let mut value = 0f64;
    let mut scale = 0i32;
    let mut seen_digit = false;
    let mut seen_point = false;
    for c in mantissa.chars() {
        match c {
            '_' => {}
            '.' if !seen_point => seen_point = true,
            _ => {
                let digit = c.to_digit(16).ok_or(ParseErrorKind::Syntax)?;
                value = value * 16.0 + f64::from(digit);
                if seen_point {
                    scale -= 4;
                }
                seen_digit = true;
            }
        }
    }
    if !seen_digit {
        return Err(ParseErrorKind::Syntax);
    }

    let value = value * 2f64.powi(exponent.saturating_add(scale));
    Ok(if negative { -value } else { value })
}

fn names_infinity(s: &str) -> bool {
    let s = s.trim_start_matches(['+', '-']);
    s.eq_ignore_ascii_case("inf") || s.eq_ignore_ascii_case("infinity")
}

// ── Booleans ──────────────────────────────────────────────────────────────────

pub fn parse_bool(s: &str) -> Result<bool, ParseError> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ParseError::new("parse_bool", s, ParseErrorKind::Syntax)),
    }
}

// ── Complex ───────────────────────────────────────────────────────────────────

/// Parses a complex number. `bits` is 64 (parts rounded through `f32`) or
/// 128; any other value is treated as 128.
pub fn parse_complex(s: &str, bits: u32) -> Result<Complex, ParseError> {
    const FN: &str = "parse_complex";

    let part_bits = if bits == 64 { 32 } else { 64 };
    let syntax = || ParseError::new(FN, s, ParseErrorKind::Syntax);
    let part = |text: &str| {
        float(FN, text, part_bits).map_err(|e| ParseError { input: s.to_owned(), ..e })
    };

    let mut body = s;
    if let Some(inner) = body.strip_prefix('(').and_then(|b| b.strip_suffix(')')) {
        body = inner;
    }

    let Some(imaginary) = body.strip_suffix('i') else {
        return Ok(Complex { re: part(body)?, im: 0.0 });
    };
    if imaginary.is_empty() {
        return Err(syntax());
    }

    // The real/imaginary split is the last sign that does not start an
    // exponent (`e` decimal, `p` hex).
    let bytes = imaginary.as_bytes();
    let split = (1..bytes.len()).rev().find(|&i| {
        matches!(bytes[i], b'+' | b'-') && !matches!(bytes[i - 1], b'e' | b'E' | b'p' | b'P')
    });

    match split {
        Some(i) => {
            let re = part(&imaginary[..i])?;
            let im = match &imaginary[i..] {
                "+" => 1.0,
                "-" => -1.0,
                text => part(text)?,
            };
            Ok(Complex { re, im })
        }
        None => {
            let im = match imaginary {
                "+" => 1.0,
                "-" => -1.0,
                text => part(text)?,
            };
            Ok(Complex { re: 0.0, im })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_bases() {
        assert_eq!(parse_int("42", 10, 64), Ok(42));
        assert_eq!(parse_int("-42", 10, 0), Ok(-42));
        assert_eq!(parse_int("ff", 16, 64), Ok(255));
        assert_eq!(parse_int("0xff", 0, 64), Ok(255));
        assert_eq!(parse_int("0b101", 0, 64), Ok(5));
        assert_eq!(parse_int("0o17", 0, 64), Ok(15));
        assert_eq!(parse_int("017", 0, 64), Ok(15));
        assert_eq!(parse_int("1_000", 0, 64), Ok(1000));
        assert_eq!(parse_int("1_000", 10, 64).unwrap_err().kind, ParseErrorKind::Syntax);
        assert_eq!(parse_int("0x_ff", 0, 64), Ok(255));
        assert_eq!(parse_int("0", 0, 64), Ok(0));
    }

    #[test]
    fn int_ranges() {
        assert_eq!(parse_int("127", 10, 8), Ok(127));
        assert_eq!(parse_int("-128", 10, 8), Ok(-128));
        assert_eq!(parse_int("128", 10, 8).unwrap_err().kind, ParseErrorKind::Range);
        assert_eq!(parse_int("-9223372036854775808", 10, 64), Ok(i64::MIN));
        assert_eq!(
            parse_int("9223372036854775808", 10, 64).unwrap_err().kind,
            ParseErrorKind::Range
        );
        assert_eq!(parse_int("1", 1, 64).unwrap_err().kind, ParseErrorKind::Base(1));
        assert_eq!(parse_int("1", 10, 65).unwrap_err().kind, ParseErrorKind::BitSize(65));
    }

    #[test]
    fn int_rejects_garbage() {
        for input in ["", "-", "+", "12a", " 1", "0x", "_1", "1__0", "1_"] {
            assert_eq!(parse_int(input, 0, 64).unwrap_err().kind, ParseErrorKind::Syntax, "{input:?}");
        }
    }

    #[test]
    fn uint_rejects_sign_and_range() {
        assert_eq!(parse_uint("255", 10, 8), Ok(255));
        assert_eq!(parse_uint("256", 10, 8).unwrap_err().kind, ParseErrorKind::Range);
        assert_eq!(parse_uint("+1", 10, 8).unwrap_err().kind, ParseErrorKind::Syntax);
        assert_eq!(parse_uint("18446744073709551615", 10, 64), Ok(u64::MAX));
    }

    #[test]
    fn error_message() {
        let err = parse_int("abc", 10, 64).unwrap_err();
        assert_eq!(err.to_string(), r#"parse_int: parsing "abc": invalid syntax"#);
    }

    #[test]
    fn floats() {
        assert_eq!(parse_float("1.5", 64), Ok(1.5));
        assert_eq!(parse_float("-2e3", 64), Ok(-2000.0));
        assert_eq!(parse_float("0.1", 32), Ok(f64::from(0.1f32)));
        assert!(parse_float("-Inf", 64).unwrap().is_infinite());
        assert!(parse_float("NaN", 64).unwrap().is_nan());
        assert_eq!(parse_float("1e400", 64).unwrap_err().kind, ParseErrorKind::Range);
        assert_eq!(parse_float("1e39", 32).unwrap_err().kind, ParseErrorKind::Range);
        assert_eq!(parse_float("x", 64).unwrap_err().kind, ParseErrorKind::Syntax);
        assert_eq!(parse_float("1.5", 16), Ok(1.5));
    }

    #[test]
    fn hex_floats() {
        assert_eq!(parse_float("0x1p-2", 64), Ok(0.25));
        assert_eq!(parse_float("0x1.8p1", 64), Ok(3.0));
        assert_eq!(parse_float("-0XAp0", 64), Ok(-10.0));
        assert_eq!(parse_float("0x_1p4", 32), Ok(16.0));
        assert_eq!(parse_float("0x1", 64).unwrap_err().kind, ParseErrorKind::Syntax);
        assert_eq!(parse_float("0xp1", 64).unwrap_err().kind, ParseErrorKind::Syntax);
        assert_eq!(parse_float("0x1p1024", 64).unwrap_err().kind, ParseErrorKind::Range);
        assert_eq!(parse_float("0x1p128", 32).unwrap_err().kind, ParseErrorKind::Range);
        assert_eq!(parse_complex("0x1p-1+0x1p1i", 128), Ok(Complex { re: 0.5, im: 2.0 }));
    }

    #[test]
    fn bools() {
        assert_eq!(parse_bool("True"), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
        assert!(parse_bool("yes").is_err());
        assert!(parse_bool("").is_err());
    }

    #[test]
    fn complexes() {
        assert_eq!(parse_complex("1+2i", 128), Ok(Complex { re: 1.0, im: 2.0 }));
        assert_eq!(parse_complex("(1.5-0.5i)", 128), Ok(Complex { re: 1.5, im: -0.5 }));
        assert_eq!(parse_complex("3i", 128), Ok(Complex { re: 0.0, im: 3.0 }));
        assert_eq!(parse_complex("-i", 128), Ok(Complex { re: 0.0, im: -1.0 }));
        assert_eq!(parse_complex("7", 128), Ok(Complex { re: 7.0, im: 0.0 }));
        assert_eq!(parse_complex("1e+2-1e-2i", 128), Ok(Complex { re: 100.0, im: -0.01 }));
        assert_eq!(parse_complex("1+xi", 128).unwrap_err().kind, ParseErrorKind::Syntax);
        assert_eq!(parse_complex("i", 128).unwrap_err().kind, ParseErrorKind::Syntax);
    }
}
