/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Typed configuration values
//!
//! Each parameter of a configuration holds one of the value types defined
//! here. Values parsed from text remember their original representation so
//! that serialization reproduces the user's spelling losslessly; the
//! high-precision representation used for cache keys is produced on demand.

use crate::atoms;
use crate::error::{Error, Result};
use crate::utils::constants::{K_ARCMIN, K_ARCSEC, K_DEG};
use crate::utils::strings::{contains_any, is_simple_ascii, parse_f64, parse_i32};

/// Characters never allowed in parameter specifications, to avoid escaping
/// trouble in the contexts configuration strings travel through
pub const FORBIDDEN_CHARS: &str = "\"'|><(){}[]";

/// Unit class of a Double parameter, deciding which suffixes its textual
/// values accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitClass {
    None,
    /// Internal unit radian: rad, deg, arcmin, arcsec
    Angle,
    /// Internal unit angstrom: Aa, nm, mm, cm, m
    Length,
    /// Internal unit kelvin: K, C, F
    Temperature,
}

impl UnitClass {
    /// Scale factor and offset of a suffix, or `None` if not recognised
    fn decode_suffix(self, unit: &str) -> Option<(f64, f64)> {
        match self {
            UnitClass::Angle => match unit {
                "rad" => Some((1.0, 0.0)),
                "deg" => Some((K_DEG, 0.0)),
                "arcmin" => Some((K_ARCMIN, 0.0)),
                "arcsec" => Some((K_ARCSEC, 0.0)),
                _ => None,
            },
            UnitClass::Length => match unit {
                "Aa" => Some((1.0, 0.0)),
                "nm" => Some((10.0, 0.0)),
                "mm" => Some((1e7, 0.0)),
                "cm" => Some((1e8, 0.0)),
                "m" => Some((1e10, 0.0)),
                _ => None,
            },
            UnitClass::Temperature => match unit {
                "K" => Some((1.0, 0.0)),
                "C" => Some((1.0, 273.15)),
                "F" => Some((1.0 / 1.8, 273.15 - 32.0 / 1.8)),
                _ => None,
            },
            UnitClass::None => None,
        }
    }
}

/// Double value, with optional unit handling and original-text retention
#[derive(Debug, Clone)]
pub struct ValDbl {
    pub value: f64,
    orig: Option<String>,
}

impl ValDbl {
    pub fn from_str(s: &str, unit: UnitClass) -> Result<Self> {
        let trimmed = s.trim();
        let mut numeric = trimmed;
        let mut factor = 1.0;
        let mut offset = 0.0;
        let mut orig = trimmed.to_string();
        if unit != UnitClass::None && trimmed.len() > 1 {
            let suffix_start = trimmed
                .rfind(|c: char| !c.is_ascii_alphabetic())
                .map(|i| i + 1)
                .unwrap_or(0);
            if suffix_start < trimmed.len() {
                let suffix = &trimmed[suffix_start..];
                numeric = trimmed[..suffix_start].trim();
                orig = format!("{}{}", numeric, suffix);
                let (f, o) = unit
                    .decode_suffix(suffix)
                    .ok_or_else(|| Error::bad_input(format!("Invalid unit: {}", suffix)))?;
                factor = f;
                offset = o;
            }
        }
        let value = offset + factor * parse_f64(numeric)?;
        Ok(ValDbl {
            value,
            orig: Some(orig),
        })
    }

    pub fn from_value(value: f64) -> Result<Self> {
        if value.is_nan() {
            return Err(Error::bad_input("Attempting to set number to NaN"));
        }
        Ok(ValDbl { value, orig: None })
    }

    pub fn to_strrep(&self, for_cache: bool) -> String {
        if !for_cache {
            if let Some(orig) = &self.orig {
                return orig.clone();
            }
        }
        if for_cache {
            format!("{:.17e}", self.value)
        } else {
            format!("{}", self.value)
        }
    }
}

/// Integer value
#[derive(Debug, Clone)]
pub struct ValInt {
    pub value: i32,
}

impl ValInt {
    pub fn from_str(s: &str) -> Result<Self> {
        Ok(ValInt {
            value: parse_i32(s.trim())?,
        })
    }

    pub fn to_strrep(&self) -> String {
        format!("{}", self.value)
    }
}

/// Boolean value, accepting "true"/"1"/"false"/"0"
#[derive(Debug, Clone)]
pub struct ValBool {
    pub value: bool,
}

impl ValBool {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "true" | "1" => Ok(ValBool { value: true }),
            "false" | "0" => Ok(ValBool { value: false }),
            other => Err(Error::bad_input(format!(
                "Could not convert \"{}\" to boolean value (should be \"true\", \"1\", \
                 \"false\" or \"0\")",
                other
            ))),
        }
    }

    pub fn to_strrep(&self) -> String {
        if self.value { "true" } else { "false" }.to_string()
    }
}

/// String value, restricted to simple ASCII without forbidden characters
#[derive(Debug, Clone)]
pub struct ValStr {
    pub value: String,
}

impl ValStr {
    pub fn from_str(s: &str) -> Result<Self> {
        if !is_simple_ascii(s, false, false) {
            return Err(Error::bad_input(
                "Non-ASCII characters or tab/newlines in string value",
            ));
        }
        if contains_any(s, FORBIDDEN_CHARS) || contains_any(s, "=;") {
            return Err(Error::bad_input("Forbidden characters in string value"));
        }
        Ok(ValStr {
            value: s.to_string(),
        })
    }

    pub fn to_strrep(&self) -> String {
        self.value.clone()
    }
}

/// Single-crystal orientation direction: a crystal-frame direction (or hkl
/// plane normal) paired with the laboratory direction it maps to
#[derive(Debug, Clone)]
pub struct OrientDir {
    pub crystal_is_hkl: bool,
    pub crystal: [f64; 3],
    pub lab: [f64; 3],
    orig: Option<String>,
}

impl OrientDir {
    /// Parse "@crys:cx,cy,cz@lab:lx,ly,lz" or "@crys_hkl:...@lab:..."
    pub fn from_str(s: &str) -> Result<Self> {
        let syntax_err = || Error::bad_input(format!("Bad syntax for orientation: \"{}\"", s));
        let st = s.trim();
        let parts: Vec<&str> = st.split('@').collect();
        if parts.len() != 3 || !parts[0].is_empty() {
            return Err(syntax_err());
        }
        let (crystal_is_hkl, crystal_str) = if let Some(rest) = parts[1].strip_prefix("crys:") {
            (false, rest)
        } else if let Some(rest) = parts[1].strip_prefix("crys_hkl:") {
            (true, rest)
        } else {
            return Err(syntax_err());
        };
        let lab_str = parts[2].strip_prefix("lab:").ok_or_else(syntax_err)?;
        let decode3 = |txt: &str| -> Result<[f64; 3]> {
            let pieces: Vec<&str> = txt.trim().split(',').collect();
            if pieces.len() != 3 {
                return Err(syntax_err());
            }
            Ok([
                parse_f64(pieces[0].trim())?,
                parse_f64(pieces[1].trim())?,
                parse_f64(pieces[2].trim())?,
            ])
        };
        Ok(OrientDir {
            crystal_is_hkl,
            crystal: decode3(crystal_str)?,
            lab: decode3(lab_str)?,
            orig: Some(st.to_string()),
        })
    }

    pub fn from_values(crystal_is_hkl: bool, crystal: [f64; 3], lab: [f64; 3]) -> Result<Self> {
        if crystal.iter().chain(lab.iter()).any(|v| v.is_nan()) {
            return Err(Error::bad_input("Attempting to set number to NaN"));
        }
        Ok(OrientDir {
            crystal_is_hkl,
            crystal,
            lab,
            orig: None,
        })
    }

    pub fn to_strrep(&self) -> String {
        if let Some(orig) = &self.orig {
            return orig.clone();
        }
        format!(
            "{}{},{},{}@lab:{},{},{}",
            if self.crystal_is_hkl {
                "@crys_hkl:"
            } else {
                "@crys:"
            },
            self.crystal[0],
            self.crystal[1],
            self.crystal[2],
            self.lab[0],
            self.lab[1],
            self.lab[2]
        )
    }
}

/// Plain 3-vector value "x,y,z"
#[derive(Debug, Clone)]
pub struct ValVector {
    pub value: [f64; 3],
    orig: Option<String>,
}

impl ValVector {
    pub fn from_str(s: &str) -> Result<Self> {
        let st = s.trim();
        let pieces: Vec<&str> = st.split(',').collect();
        if pieces.len() != 3 {
            return Err(Error::bad_input(format!(
                "Bad syntax for vector value: \"{}\"",
                s
            )));
        }
        Ok(ValVector {
            value: [
                parse_f64(pieces[0].trim())?,
                parse_f64(pieces[1].trim())?,
                parse_f64(pieces[2].trim())?,
            ],
            orig: Some(st.to_string()),
        })
    }

    pub fn from_values(value: [f64; 3]) -> Result<Self> {
        if value.iter().any(|v| v.is_nan()) {
            return Err(Error::bad_input("Attempting to set number to NaN"));
        }
        Ok(ValVector { value, orig: None })
    }

    pub fn to_strrep(&self) -> String {
        if let Some(orig) = &self.orig {
            return orig.clone();
        }
        format!("{},{},{}", self.value[0], self.value[1], self.value[2])
    }
}

/// Atom database override lines in one-line form: '@' separates lines, ':'
/// separates tokens within a line
#[derive(Debug, Clone)]
pub struct ValAtomDb {
    pub lines: Vec<Vec<String>>,
    as_string: String,
}

impl ValAtomDb {
    pub fn from_str(s: &str) -> Result<Self> {
        let mut lines: Vec<Vec<String>> = Vec::new();
        for chunk in s.split('@') {
            let tokens: Vec<String> = chunk
                .replace(':', " ")
                .split_whitespace()
                .map(str::to_string)
                .collect();
            if tokens.is_empty() {
                continue;
            }
            lines.push(tokens);
        }
        Self::from_lines(lines)
    }

    pub fn from_lines(lines: Vec<Vec<String>>) -> Result<Self> {
        for (iline, line) in lines.iter().enumerate() {
            for word in line {
                if !is_simple_ascii(word, false, false) {
                    return Err(Error::bad_input(
                        "Non-ASCII characters or tab/newlines in atomdb parameter",
                    ));
                }
                if contains_any(word, FORBIDDEN_CHARS) || contains_any(word, "=;") {
                    return Err(Error::bad_input(
                        "Forbidden characters in atomdb parameter",
                    ));
                }
            }
            atoms::validate_atom_db_line(line).map_err(|e| {
                Error::bad_input(format!(
                    "Invalid entry in atomdb parameter in the line \"{}\": {}",
                    line.join(" "),
                    e.message()
                ))
            })?;
            if line.len() == 1 && line[0] == "nodefaults" && iline > 0 {
                return Err(Error::bad_input(
                    "Invalid entry in atomdb parameter (\"nodefaults\" must be the first line)",
                ));
            }
        }
        let as_string = lines
            .iter()
            .map(|line| line.join(":"))
            .collect::<Vec<_>>()
            .join("@");
        Ok(ValAtomDb { lines, as_string })
    }

    pub fn to_strrep(&self) -> String {
        self.as_string.clone()
    }
}

/// A typed configuration value
#[derive(Debug, Clone)]
pub enum CfgValue {
    Dbl(ValDbl),
    Int(ValInt),
    Bool(ValBool),
    Str(ValStr),
    OrientDir(OrientDir),
    Vector(ValVector),
    AtomDb(ValAtomDb),
}

impl CfgValue {
    pub fn to_strrep(&self, for_cache: bool) -> String {
        match self {
            CfgValue::Dbl(v) => v.to_strrep(for_cache),
            CfgValue::Int(v) => v.to_strrep(),
            CfgValue::Bool(v) => v.to_strrep(),
            CfgValue::Str(v) => v.to_strrep(),
            CfgValue::OrientDir(v) => v.to_strrep(),
            CfgValue::Vector(v) => v.to_strrep(),
            CfgValue::AtomDb(v) => v.to_strrep(),
        }
    }
}
