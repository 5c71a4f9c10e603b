/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! String and number parsing helpers
//!
//! Number parsing in this crate is deliberately strict: NaN and infinities
//! are never accepted from textual input, and parse failures surface as
//! `BadInput` rather than being silently skipped.

use crate::error::{Error, Result};

/// True if all bytes are printable ASCII (32..126), optionally also
/// accepting tabs and newlines.
pub fn is_simple_ascii(s: &str, allow_tab: bool, allow_newline: bool) -> bool {
    s.bytes().all(|b| {
        (32..127).contains(&b)
            || (allow_tab && b == b'\t')
            || (allow_newline && (b == b'\n' || b == b'\r'))
    })
}

/// True if every char of `haystack` occurs in `allowed`
pub fn contains_only(haystack: &str, allowed: &str) -> bool {
    haystack.chars().all(|c| allowed.contains(c))
}

/// True if any char of `needles` occurs in `haystack`
pub fn contains_any(haystack: &str, needles: &str) -> bool {
    haystack.chars().any(|c| needles.contains(c))
}

/// Parse a finite floating point number
pub fn parse_f64(s: &str) -> Result<f64> {
    let v: f64 = s
        .parse()
        .map_err(|_| Error::bad_input(format!("Could not convert \"{}\" to a number", s)))?;
    if !v.is_finite() {
        return Err(Error::bad_input(format!(
            "NaN or infinite number: \"{}\"",
            s
        )));
    }
    Ok(v)
}

/// Parse a signed integer
pub fn parse_i64(s: &str) -> Result<i64> {
    s.parse()
        .map_err(|_| Error::bad_input(format!("Could not convert \"{}\" to an integer", s)))
}

/// Parse a signed 32 bit integer
pub fn parse_i32(s: &str) -> Result<i32> {
    s.parse()
        .map_err(|_| Error::bad_input(format!("Could not convert \"{}\" to an integer", s)))
}

/// Last path component of a filename
pub fn basename(filename: &str) -> &str {
    filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
}

/// File extension (text after the last '.'), empty if none
pub fn file_ext(filename: &str) -> &str {
    let base = basename(filename);
    match base.rfind('.') {
        Some(idx) if idx + 1 < base.len() => &base[idx + 1..],
        _ => "",
    }
}

/// Split a name like "Bla123" into ("Bla", "123"); the digit part is empty
/// when the name does not end in digits.
pub fn split_trailing_digits(s: &str) -> (&str, &str) {
    let idx = s
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    (&s[..idx], &s[idx..])
}

/// Split a name like "12Bla" into ("12", "Bla")
pub fn split_leading_digits(s: &str) -> (&str, &str) {
    let idx = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    (&s[..idx], &s[idx..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_f64_strict() {
        assert_eq!(parse_f64("1.5").unwrap(), 1.5);
        assert_eq!(parse_f64("-2e3").unwrap(), -2000.0);
        assert!(parse_f64("inf").is_err());
        assert!(parse_f64("nan").is_err());
        assert!(parse_f64("1.0 ").is_err());
        assert!(parse_f64("abc").is_err());
        assert!(parse_f64("").is_err());
    }

    #[test]
    fn test_simple_ascii() {
        assert!(is_simple_ascii("hello world", false, false));
        assert!(!is_simple_ascii("tab\there", false, false));
        assert!(is_simple_ascii("tab\there", true, false));
        assert!(!is_simple_ascii("ångström", true, true));
    }

    #[test]
    fn test_file_ext() {
        assert_eq!(file_ext("foo.ncmat"), "ncmat");
        assert_eq!(file_ext("/path/to/foo.ncmat"), "ncmat");
        assert_eq!(file_ext("noext"), "");
        assert_eq!(file_ext("trailingdot."), "");
        assert_eq!(basename("/a/b/c.txt"), "c.txt");
    }

    #[test]
    fn test_digit_splits() {
        assert_eq!(split_trailing_digits("Bla123"), ("Bla", "123"));
        assert_eq!(split_trailing_digits("Bla"), ("Bla", ""));
        assert_eq!(split_leading_digits("12C"), ("12", "C"));
        assert_eq!(split_leading_digits("C"), ("", "C"));
    }
}
