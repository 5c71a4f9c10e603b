/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Atom data and atom database resolution
//!
//! The builtin database provides default atom data for element and isotope
//! tokens. Materials can override or extend it with `@ATOMDB` lines from a
//! material file and `atomdb=` lines from a configuration; later lines win
//! over earlier ones, and a leading `nodefaults` line disables the builtin
//! defaults entirely.

pub mod data;
pub mod database;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::utils::strings::split_leading_digits;

pub use data::{AtomData, AtomDataSP};
pub use database::{builtin_atom_data, element_symbol, element_z, is_element_symbol};

/// Maximum length of user-defined atom labels
pub const MAX_LABEL_LENGTH: usize = 8;

/// True for labels of the form `[A-Za-z][A-Za-z0-9]*` up to the maximum
/// length
pub fn is_valid_custom_label(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_LABEL_LENGTH {
        return false;
    }
    let mut chars = s.chars();
    let first = chars.next().unwrap();
    first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric())
}

/// True for isotope markers: one to three leading digits followed by a
/// standard element symbol, e.g. "2H" or "235U"
pub fn is_isotope_marker(s: &str) -> bool {
    let (digits, symbol) = split_leading_digits(s);
    if digits.is_empty() || digits.len() > 3 || symbol.is_empty() {
        return false;
    }
    let value: u32 = match digits.parse() {
        Ok(v) => v,
        Err(_) => return false,
    };
    value >= 1 && is_element_symbol(symbol)
}

fn parse_suffixed_number(token: &str, suffix: &str, what: &str) -> Result<f64> {
    let stripped = token.strip_suffix(suffix).ok_or_else(|| {
        Error::bad_input(format!(
            "Expected {} with \"{}\" suffix, got \"{}\"",
            what, suffix, token
        ))
    })?;
    crate::utils::strings::parse_f64(stripped)
        .map_err(|_| Error::bad_input(format!("Could not decode {} in \"{}\"", what, token)))
}

/// Validate one atom database line (already tokenized)
///
/// Accepted forms:
///   `nodefaults`
///   `<name> is <other-name>`
///   `<name> <mass>u <bcoh>fm <incxs>b <absxs>b`
pub fn validate_atom_db_line(parts: &[String]) -> Result<()> {
    if parts.is_empty() {
        return Err(Error::bad_input("Empty atom database line"));
    }
    if parts[0] == "nodefaults" {
        if parts.len() != 1 {
            return Err(Error::bad_input(
                "The \"nodefaults\" keyword must appear alone on its line",
            ));
        }
        return Ok(());
    }
    let name_ok = |s: &str| {
        is_element_symbol(s) || is_isotope_marker(s) || s == "D" || s == "T"
            || is_valid_custom_label(s)
    };
    if !name_ok(&parts[0]) {
        return Err(Error::bad_input(format!(
            "Invalid atom name \"{}\" in atom database line",
            parts[0]
        )));
    }
    if parts.len() == 3 && parts[1] == "is" {
        if !name_ok(&parts[2]) {
            return Err(Error::bad_input(format!(
                "Invalid alias target \"{}\" in atom database line",
                parts[2]
            )));
        }
        return Ok(());
    }
    if parts.len() == 5 {
        let mass = parse_suffixed_number(&parts[1], "u", "mass")?;
        if !(mass > 0.0) {
            return Err(Error::bad_input(format!(
                "Mass must be positive in atom database line for \"{}\"",
                parts[0]
            )));
        }
        parse_suffixed_number(&parts[2], "fm", "coherent scattering length")?;
        let incxs = parse_suffixed_number(&parts[3], "b", "incoherent cross section")?;
        let absxs = parse_suffixed_number(&parts[4], "b", "absorption cross section")?;
        if incxs < 0.0 || absxs < 0.0 {
            return Err(Error::bad_input(format!(
                "Cross sections must be non-negative in atom database line for \"{}\"",
                parts[0]
            )));
        }
        return Ok(());
    }
    Err(Error::bad_input(format!(
        "Invalid atom database line starting with \"{}\" (expected \"<name> is \
         <other>\" or \"<name> <mass>u <bcoh>fm <incxs>b <absxs>b\")",
        parts[0]
    )))
}

enum DbEntry {
    Data(AtomDataSP),
    Alias(String),
}

/// Atom database with override lines layered over the builtin defaults
pub struct AtomDb {
    no_defaults: bool,
    entries: HashMap<String, DbEntry>,
}

impl AtomDb {
    /// Builtin defaults only
    pub fn new_defaults() -> Self {
        AtomDb {
            no_defaults: false,
            entries: HashMap::new(),
        }
    }

    /// Build from one group of override lines
    pub fn from_lines(lines: &[Vec<String>]) -> Result<Self> {
        Self::from_line_groups(&[lines])
    }

    /// Build from several groups of override lines, applied in order
    ///
    /// Each group is typically the `@ATOMDB` section of a material file
    /// followed by the `atomdb=` lines of a configuration. Within the
    /// combined sequence later lines override earlier ones. A `nodefaults`
    /// keyword is only legal as the first line of its group.
    pub fn from_line_groups(groups: &[&[Vec<String>]]) -> Result<Self> {
        let mut db = AtomDb::new_defaults();
        for group in groups {
            for (iline, line) in group.iter().enumerate() {
                validate_atom_db_line(line)?;
                if line[0] == "nodefaults" {
                    if iline != 0 {
                        return Err(Error::bad_input(
                            "The \"nodefaults\" keyword must be on the first line",
                        ));
                    }
                    db.no_defaults = true;
                    continue;
                }
                if line.len() == 3 {
                    db.entries
                        .insert(line[0].clone(), DbEntry::Alias(line[2].clone()));
                } else {
                    let name = &line[0];
                    let (z, a) = Self::classify_name(name);
                    let mass = parse_suffixed_number(&line[1], "u", "mass")?;
                    let bcoh = parse_suffixed_number(&line[2], "fm", "coherent scattering length")?;
                    let incxs = parse_suffixed_number(&line[3], "b", "incoherent cross section")?;
                    let absxs = parse_suffixed_number(&line[4], "b", "absorption cross section")?;
                    let data = AtomData::new(name.clone(), z, a, mass, bcoh, incxs, absxs)?;
                    db.entries
                        .insert(name.clone(), DbEntry::Data(Arc::new(data)));
                }
            }
        }
        Ok(db)
    }

    fn classify_name(name: &str) -> (u32, u32) {
        if let Some(z) = element_z(name) {
            return (z, 0);
        }
        let (digits, symbol) = split_leading_digits(name);
        if !digits.is_empty() {
            if let (Some(z), Ok(a)) = (element_z(symbol), digits.parse()) {
                return (z, a);
            }
        }
        (0, 0)
    }

    /// Resolve a name to shared atom data
    ///
    /// Override entries are consulted first, then the builtin database
    /// unless defaults are disabled. Alias chains are followed with cycle
    /// detection.
    pub fn lookup(&self, name: &str) -> Result<AtomDataSP> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = name.to_string();
        loop {
            if !visited.insert(current.clone()) {
                return Err(Error::bad_input(format!(
                    "Circular alias chain in atom database involving \"{}\"",
                    name
                )));
            }
            match self.entries.get(&current) {
                Some(DbEntry::Data(sp)) => return Ok(Arc::clone(sp)),
                Some(DbEntry::Alias(target)) => {
                    current = target.clone();
                    continue;
                }
                None => {}
            }
            if !self.no_defaults {
                if let Some(data) = builtin_atom_data(&current) {
                    return Ok(Arc::new(data));
                }
            }
            return Err(Error::bad_input(format!(
                "Atom data for \"{}\" is not available{}",
                current,
                if self.no_defaults {
                    " (builtin defaults are disabled by \"nodefaults\")"
                } else {
                    ""
                }
            )));
        }
    }
}
