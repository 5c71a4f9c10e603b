/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Sub-option decoding for string parameters
//!
//! String parameters selecting a factory can carry options of the form
//! `NAME[:flag][:opt@value]...`. Option names are lower-case identifiers,
//! value-less flags decode to the marker `<flag>`, and each option may
//! appear at most once.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::strings::{contains_any, contains_only, parse_f64, parse_i32};

/// Marker value of options given without a `@value` part
pub const FLAG_MARKER: &str = "<flag>";

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const LOWER_NUM_UNDERSCORE: &str = "abcdefghijklmnopqrstuvwxyz0123456789_";

/// Decode the options of a string like "name:flag:opt@value"
///
/// The leading name part is skipped when `skip_name` is set (the usual
/// case).
pub fn decode_opts(optstr: &str, skip_name: bool) -> Result<BTreeMap<String, String>> {
    let mut result = BTreeMap::new();
    let mut parts = optstr.split(':');
    if skip_name {
        let _ = parts.next();
    }
    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, value) = if part.contains('@') {
            let sub: Vec<&str> = part.split('@').map(str::trim).collect();
            if sub.len() != 2 || sub[0].is_empty() || sub[1].is_empty()
                || contains_any(sub[1], "<>:=")
            {
                return Err(Error::bad_input(format!(
                    "Syntax error in options: \"{}\"",
                    optstr
                )));
            }
            if !contains_only(sub[0], LOWER_NUM_UNDERSCORE)
                || !sub[0].starts_with(|c: char| LOWER.contains(c))
            {
                return Err(Error::bad_input(format!(
                    "Syntax error in options, invalid option name: \"{}\"",
                    sub[0]
                )));
            }
            (sub[0].to_string(), sub[1].to_string())
        } else {
            (part.to_string(), FLAG_MARKER.to_string())
        };
        if result.contains_key(&name) {
            return Err(Error::bad_input(format!(
                "Syntax error in options, option specified multiple times: \"{}\"",
                name
            )));
        }
        result.insert(name, value);
    }
    Ok(result)
}

/// The name part in front of any options
pub fn decode_opt_name(optstr: &str) -> String {
    match optstr.split_once(':') {
        Some((name, _)) => name.trim().to_string(),
        None => optstr.to_string(),
    }
}

/// Whether a value-less flag is present
pub fn decode_opt_flag(optstr: &str, flagname: &str) -> Result<bool> {
    if !optstr.contains(':') {
        return Ok(false);
    }
    let opts = decode_opts(optstr, true)?;
    match opts.get(flagname) {
        None => Ok(false),
        Some(v) if v == FLAG_MARKER => Ok(true),
        Some(_) => Err(Error::bad_input(format!(
            "Syntax error in flag \"{}\" (takes no value)",
            flagname
        ))),
    }
}

/// Double-valued option, with fallback
pub fn decode_opt_dbl(optstr: &str, name: &str, default: f64) -> Result<f64> {
    if !optstr.contains(':') {
        return Ok(default);
    }
    match decode_opts(optstr, true)?.get(name) {
        Some(v) => parse_f64(v),
        None => Ok(default),
    }
}

/// Integer-valued option, with fallback
pub fn decode_opt_int(optstr: &str, name: &str, default: i32) -> Result<i32> {
    if !optstr.contains(':') {
        return Ok(default);
    }
    match decode_opts(optstr, true)?.get(name) {
        Some(v) => parse_i32(v),
        None => Ok(default),
    }
}

/// Reject options not in the recognised set
pub fn validate_opts(optstr: &str, recognised: &[&str]) -> Result<()> {
    if !optstr.contains(':') {
        return Ok(());
    }
    let name = decode_opt_name(optstr);
    for key in decode_opts(optstr, true)?.keys() {
        if !recognised.contains(&key.as_str()) {
            return Err(Error::bad_input(format!(
                "The flag \"{}\" is not supported by the chosen factory for a mode of \"{}\"",
                key, name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_opts() {
        let opts = decode_opts("fact:myflag:tol@0.5", true).unwrap();
        assert_eq!(opts.get("myflag").unwrap(), FLAG_MARKER);
        assert_eq!(opts.get("tol").unwrap(), "0.5");
        assert!(decode_opts("fact:tol@0.5:tol@1.0", true).is_err());
        assert!(decode_opts("fact:Bad@1", true).is_err());
        assert!(decode_opts("fact:opt@a=b", true).is_err());
    }

    #[test]
    fn test_opt_accessors() {
        assert_eq!(decode_opt_name("fact:opt@1"), "fact");
        assert_eq!(decode_opt_name("fact"), "fact");
        assert!(decode_opt_flag("fact:myflag", "myflag").unwrap());
        assert!(!decode_opt_flag("fact", "myflag").unwrap());
        assert!(decode_opt_flag("fact:myflag@3", "myflag").is_err());
        assert_eq!(decode_opt_dbl("fact:tol@0.25", "tol", 1.0).unwrap(), 0.25);
        assert_eq!(decode_opt_dbl("fact", "tol", 1.0).unwrap(), 1.0);
        assert_eq!(decode_opt_int("fact:n@7", "n", 3).unwrap(), 7);
    }

    #[test]
    fn test_validate_opts() {
        assert!(validate_opts("fact:known@1", &["known"]).is_ok());
        assert!(validate_opts("fact:unknown@1", &["known"]).is_err());
        assert!(validate_opts("fact", &[]).is_ok());
    }

    #[test]
    fn test_value_verbatim() {
        let opts = decode_opts("fact:opt@some_value7", true).unwrap();
        assert_eq!(opts.get("opt").unwrap(), "some_value7");
    }
}
