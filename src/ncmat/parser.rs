/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! NCMAT format parser
//!
//! Consumes a [`TextInputStream`] and produces a [`RawNcmatData`] record.
//! Parsing is line oriented: each line is tokenized under strict byte rules
//! (ASCII outside comments, UTF-8 inside), and a state machine dispatches
//! tokens to the handler of the active `@SECTION`. When a section ends (a
//! new marker appears or input runs out) its handler is invoked once more
//! with an empty token list to finalize and validate the accumulated state.

use crate::error::{Error, Result};
use crate::ncmat::data::{DensityUnit, RawDynInfo, RawDynInfoType, RawNcmatData};
use crate::stream::TextInputStream;
use crate::utils::strings::{parse_f64, parse_i64};

/// Parse NCMAT data from a stream and run full record validation
pub fn parse_ncmat(input: Box<dyn TextInputStream>) -> Result<RawNcmatData> {
    let data = parse_ncmat_unvalidated(input)?;
    data.validate()?;
    Ok(data)
}

/// Parse NCMAT data without the final whole-record validation
///
/// Rudimentary syntax checking (section structure, per-section closing
/// validation) still happens; use [`parse_ncmat`] unless the caller performs
/// its own [`RawNcmatData::validate`] pass.
pub fn parse_ncmat_unvalidated(input: Box<dyn TextInputStream>) -> Result<RawNcmatData> {
    let mut parser = NcmatParser::new();
    parser.run(input)?;
    Ok(parser.data)
}

/// Keywords whose numeric vectors may continue over multiple lines
const LONG_VECTOR_FIELDS: &[&str] = &[
    "sab",
    "sab_scaled",
    "sqw",
    "alphagrid",
    "betagrid",
    "qgrid",
    "omegagrid",
    "egrid",
    "vdos_egrid",
    "vdos_density",
];

/// Long-vector keywords recognised but not yet supported
const UNSUPPORTED_FIELDS: &[&str] = &["sqw", "qgrid", "omegagrid"];

/// Long-vector keywords whose values may be negative
const NEGATIVE_OK_FIELDS: &[&str] = &["betagrid", "omegagrid"];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Head,
    Cell,
    AtomPositions,
    SpaceGroup,
    DebyeTemperature,
    DynInfo,
    Density,
    AtomDb,
    Custom,
}

struct NcmatParser {
    data: RawNcmatData,
    dyninfo_open: bool,
    dyninfo_active_field: Option<String>,
    dyninfo_allow_negative: bool,
}

impl NcmatParser {
    fn new() -> Self {
        NcmatParser {
            data: RawNcmatData::default(),
            dyninfo_open: false,
            dyninfo_active_field: None,
            dyninfo_allow_negative: false,
        }
    }

    fn err(&self, lineno: u64, msg: impl Into<String>) -> Error {
        Error::bad_input_at(&self.data.source_full_descr, lineno, msg)
    }

    /// Re-attribute a section-close validation error to the section end
    fn section_err(&self, e: Error, section: &str, lineno: u64) -> Error {
        Error::bad_input_at(
            &self.data.source_full_descr,
            lineno,
            format!(
                "{} (problem in the @{} section ending in line {})",
                e.message(),
                section,
                lineno
            ),
        )
    }

    fn run(&mut self, mut input: Box<dyn TextInputStream>) -> Result<()> {
        self.data.source_descr = input.description().to_string();
        self.data.source_type = input.stream_type().to_string();
        self.data.source_full_descr = input.full_description();

        // First line is special: must start with "NCMAT" at column 0 and
        // designate the format version.
        let first_line = input
            .next_line()?
            .ok_or_else(|| Error::bad_input(format!("Empty {}", self.data.source_full_descr)))?;
        if !first_line.starts_with("NCMAT") {
            return Err(self.err(
                1,
                "Not in NCMAT format: the first 5 characters of the first line must be \"NCMAT\"",
            ));
        }
        let parts = self.tokenize(&first_line, 1)?;
        if parts.len() == 2 {
            match parts[1].as_str() {
                "v1" => {
                    self.data.version = 1;
                    if first_line.contains('#') {
                        return Err(self.err(
                            1,
                            "Comments in the first line are not allowed in the NCMAT v1 format",
                        ));
                    }
                }
                "v2" => self.data.version = 2,
                "v3" => self.data.version = 3,
                other => {
                    return Err(self.err(
                        1,
                        format!(
                            "NCMAT format version \"{}\" is not recognised by this installation",
                            other
                        ),
                    ))
                }
            }
        }
        if self.data.version == 0 {
            return Err(self.err(
                1,
                "Missing clear NCMAT format version designation in the first line (expected \
                 e.g. \"NCMAT v1\")",
            ));
        }

        self.parse_body(&mut *input)?;
        self.data.unalias_element_names();
        Ok(())
    }

    fn parse_body(&mut self, input: &mut dyn TextInputStream) -> Result<()> {
        let mut current = Section::Head;
        let mut sections_seen: Vec<String> = Vec::new();
        let mut saw_any_section = false;
        let mut lineno: u64 = 1;

        while let Some(line) = input.next_line()? {
            lineno += 1;
            let parts = self.tokenize(&line, lineno)?;

            if self.data.version == 1 && line.contains('#') {
                let marker_line = parts.first().map(|p| p.starts_with('@')).unwrap_or(false);
                if saw_any_section || marker_line || !line.starts_with('#') {
                    return Err(self.err(
                        lineno,
                        "Comments in this position are not allowed in the NCMAT v1 format \
                         (they must appear before the first data section with the # marker \
                         at the beginning of the line)",
                    ));
                }
            }

            if parts.is_empty() {
                continue;
            }

            if parts[0].starts_with('@') {
                saw_any_section = true;
                if parts.len() > 1 {
                    return Err(self.err(
                        lineno,
                        format!(
                            "Non-comment entries are not allowed after a section marker (found \
                             \"{}\" after \"{}\")",
                            parts[1], parts[0]
                        ),
                    ));
                }
                if !line.starts_with('@') {
                    return Err(self.err(
                        lineno,
                        format!(
                            "Whitespace is not allowed before a section marker (problem with \
                             indented \"{}\")",
                            parts[0]
                        ),
                    ));
                }
                let new_section = parts[0][1..].to_string();
                if new_section.is_empty() {
                    return Err(self.err(lineno, "Missing section name after '@' symbol"));
                }

                // Close the current section before switching
                self.handle_section(current, &[], lineno.saturating_sub(1))?;

                let is_custom = new_section.starts_with("CUSTOM_") || new_section == "CUSTOM_";
                let multiple_allowed = is_custom || new_section == "DYNINFO";
                if !multiple_allowed {
                    if sections_seen.iter().any(|s| s == &new_section) {
                        return Err(self.err(
                            lineno,
                            format!("Multiple @{} sections are not allowed", new_section),
                        ));
                    }
                    sections_seen.push(new_section.clone());
                }

                current = self.resolve_section(&new_section, is_custom, lineno)?;
                if is_custom {
                    if new_section.len() <= 7 {
                        return Err(self.err(
                            lineno,
                            format!(
                                "Section @{} needs additional characters after \"CUSTOM_\"",
                                new_section
                            ),
                        ));
                    }
                    self.data
                        .custom_sections
                        .push((new_section[7..].to_string(), Vec::new()));
                }
                continue;
            }

            self.handle_section(current, &parts, lineno)?;
        }

        // End of input closes the active section
        self.handle_section(current, &[], lineno)?;
        Ok(())
    }

    fn resolve_section(&self, name: &str, is_custom: bool, lineno: u64) -> Result<Section> {
        let version = self.data.version;
        let section = match name {
            "CELL" => Some(Section::Cell),
            "ATOMPOSITIONS" => Some(Section::AtomPositions),
            "SPACEGROUP" => Some(Section::SpaceGroup),
            "DEBYETEMPERATURE" => Some(Section::DebyeTemperature),
            "DYNINFO" if version >= 2 => Some(Section::DynInfo),
            "DENSITY" if version >= 2 => Some(Section::Density),
            "ATOMDB" if version >= 3 => Some(Section::AtomDb),
            _ if is_custom && version >= 3 => Some(Section::Custom),
            _ => None,
        };
        if let Some(s) = section {
            return Ok(s);
        }
        if version == 1 && (name == "DYNINFO" || name == "DENSITY") {
            return Err(self.err(
                lineno,
                format!(
                    "The @{} section is not supported in the indicated NCMAT format version \
                     \"NCMAT v1\" (it is only available starting with \"NCMAT v2\")",
                    name
                ),
            ));
        }
        if version < 3 && (is_custom || name == "ATOMDB") {
            return Err(self.err(
                lineno,
                format!(
                    "The @{} section is not supported in the indicated NCMAT format version \
                     \"NCMAT v{}\" (it is only available starting with \"NCMAT v3\")",
                    name, version
                ),
            ));
        }
        Err(self.err(
            lineno,
            format!("@{} is not a supported section name", name),
        ))
    }

    fn handle_section(&mut self, section: Section, parts: &[String], lineno: u64) -> Result<()> {
        match section {
            Section::Head => self.handle_head(parts, lineno),
            Section::Cell => self.handle_cell(parts, lineno),
            Section::AtomPositions => self.handle_atompositions(parts, lineno),
            Section::SpaceGroup => self.handle_spacegroup(parts, lineno),
            Section::DebyeTemperature => self.handle_debyetemperature(parts, lineno),
            Section::DynInfo => self.handle_dyninfo(parts, lineno),
            Section::Density => self.handle_density(parts, lineno),
            Section::AtomDb => self.handle_atomdb(parts, lineno),
            Section::Custom => self.handle_custom(parts, lineno),
        }
    }

    /// Tokenize a line: split non-comment content on spaces and tabs,
    /// enforcing the byte rules (printable ASCII outside comments, UTF-8 and
    /// no stray control codes inside them, '\r' only as part of "\r\n").
    fn tokenize(&self, line: &str, lineno: u64) -> Result<Vec<String>> {
        let bytes = line.as_bytes();
        let mut parts: Vec<String> = Vec::new();
        let mut part_begin: Option<usize> = None;
        let mut comment_start = bytes.len();

        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i];
            if c < 127 && c > 32 && c != b'#' {
                if part_begin.is_none() {
                    part_begin = Some(i);
                }
                i += 1;
                continue;
            }
            if c == b' ' || c == b'\t' {
                if let Some(begin) = part_begin.take() {
                    parts.push(line[begin..i].to_string());
                }
                i += 1;
                continue;
            }
            if c == b'\n' || c == b'\r' || c == b'#' {
                if c == b'\r' && i + 1 != bytes.len() && bytes[i + 1] != b'\n' {
                    return Err(self.err(
                        lineno,
                        format!(
                            "Invalid character at position {}: carriage return codes are not \
                             allowed unless used as part of DOS line endings",
                            i
                        ),
                    ));
                }
                comment_start = i;
                break;
            }
            return Err(self.err(
                lineno,
                format!(
                    "Invalid character at position {}: only regular ASCII characters are \
                     allowed outside comments (comments can be UTF-8)",
                    i
                ),
            ));
        }
        if let Some(begin) = part_begin {
            parts.push(line[begin..comment_start.min(bytes.len())].to_string());
        }

        // Comment region: UTF-8 multi-byte sequences are fine, stray control
        // codes are not.
        let mut j = comment_start;
        while j < bytes.len() {
            let c = bytes[j];
            if (c >= 32 && c != 127) || c >= 128 || c == b'\t' || c == b'\n' {
                j += 1;
                continue;
            }
            if c == b'\r' {
                if j + 1 != bytes.len() && bytes[j + 1] != b'\n' {
                    return Err(self.err(
                        lineno,
                        format!(
                            "Invalid character at position {}: carriage return codes are not \
                             allowed unless used as part of DOS line endings",
                            j
                        ),
                    ));
                }
                j += 1;
                continue;
            }
            return Err(self.err(lineno, "Illegal control code character in comment"));
        }
        Ok(parts)
    }

    /// Parse a number which may, from NCMAT v2 on, be a rational "p/q"
    fn parse_number_with_fractions(&self, s: &str, lineno: u64) -> Result<f64> {
        if !s.contains('/') {
            return parse_f64(s).map_err(|e| self.err(lineno, e.message()));
        }
        if self.data.version == 1 {
            return Err(self.err(
                lineno,
                format!(
                    "Specification with fractions is not supported in NCMAT v1 files \
                     (offending parameter is \"{}\")",
                    s
                ),
            ));
        }
        let pieces: Vec<&str> = s.split('/').collect();
        if pieces.len() != 2 {
            return Err(self.err(
                lineno,
                format!("Multiple fractions in numbers are not supported: \"{}\"", s),
            ));
        }
        if pieces[0].is_empty() || pieces[1].is_empty() {
            return Err(self.err(
                lineno,
                format!("Empty numerator or denominator in \"{}\"", s),
            ));
        }
        let a = parse_f64(pieces[0]).map_err(|e| self.err(lineno, e.message()))?;
        let b = parse_f64(pieces[1]).map_err(|e| self.err(lineno, e.message()))?;
        if b == 0.0 {
            return Err(self.err(
                lineno,
                format!("Division by zero attempted in \"{}\"", s),
            ));
        }
        let result = a / b;
        if !result.is_finite() {
            return Err(self.err(
                lineno,
                format!("Invalid division attempted in \"{}\"", s),
            ));
        }
        Ok(result)
    }

    fn validate_element_name(&self, name: &str, lineno: u64) -> Result<()> {
        RawNcmatData::validate_element_name_by_version(name, self.data.version)
            .map_err(|e| self.err(lineno, e.message()))
    }

    fn handle_head(&mut self, parts: &[String], lineno: u64) -> Result<()> {
        if parts.is_empty() {
            return Ok(());
        }
        Err(self.err(
            lineno,
            format!(
                "Non-comment entries are not allowed before the first section (found \"{}\")",
                parts[0]
            ),
        ))
    }

    fn handle_cell(&mut self, parts: &[String], lineno: u64) -> Result<()> {
        if parts.is_empty() {
            return self
                .data
                .validate_cell()
                .map_err(|e| self.section_err(e, "CELL", lineno));
        }
        let keyword = parts[0].as_str();
        if keyword != "lengths" && keyword != "angles" {
            return Err(self.err(
                lineno,
                format!(
                    "Found \"{}\" where \"lengths\" or \"angles\" keyword was expected in \
                     @CELL section",
                    keyword
                ),
            ));
        }
        if parts.len() != 4 {
            return Err(self.err(
                lineno,
                format!(
                    "Wrong number of data entries after \"{}\" keyword (expected three numbers)",
                    keyword
                ),
            ));
        }
        let target = if keyword == "lengths" {
            &self.data.cell.lengths
        } else {
            &self.data.cell.angles
        };
        if target.is_some() {
            return Err(self.err(lineno, format!("Repeated keyword \"{}\"", keyword)));
        }
        let mut v = [0.0; 3];
        for (i, out) in v.iter_mut().enumerate() {
            *out = parse_f64(&parts[i + 1]).map_err(|e| {
                self.err(
                    lineno,
                    format!(
                        "Problem while decoding \"{}\" parameter #{}: {}",
                        keyword,
                        i + 1,
                        e.message()
                    ),
                )
            })?;
        }
        if v == [0.0, 0.0, 0.0] {
            return Err(self.err(lineno, format!("Vector \"{}\" is a null-vector", keyword)));
        }
        if keyword == "lengths" {
            self.data.cell.lengths = Some(v);
        } else {
            self.data.cell.angles = Some(v);
        }
        Ok(())
    }

    fn handle_atompositions(&mut self, parts: &[String], lineno: u64) -> Result<()> {
        if parts.is_empty() {
            if self.data.atompos.is_empty() {
                return Err(self.err(
                    lineno,
                    "No element positions specified in @ATOMPOSITIONS section",
                ));
            }
            return self
                .data
                .validate_atompos()
                .map_err(|e| self.section_err(e, "ATOMPOSITIONS", lineno));
        }
        self.validate_element_name(&parts[0], lineno)?;
        if parts.len() != 4 {
            return Err(self.err(
                lineno,
                format!(
                    "Wrong number of data entries after element name \"{}\" (expected three \
                     numbers)",
                    parts[0]
                ),
            ));
        }
        let mut v = [0.0; 3];
        for (i, out) in v.iter_mut().enumerate() {
            *out = self
                .parse_number_with_fractions(&parts[i + 1], lineno)
                .map_err(|e| {
                    self.err(
                        lineno,
                        format!(
                            "Problem while decoding position parameter #{} for element \
                             \"{}\": {}",
                            i + 1,
                            parts[0],
                            e.message()
                        ),
                    )
                })?;
        }
        self.data.atompos.push((parts[0].clone(), v));
        Ok(())
    }

    fn handle_spacegroup(&mut self, parts: &[String], lineno: u64) -> Result<()> {
        if parts.is_empty() {
            if self.data.spacegroup == 0 {
                return Err(self.err(lineno, "No spacegroup number specified in @SPACEGROUP section"));
            }
            return self
                .data
                .validate_spacegroup()
                .map_err(|e| self.section_err(e, "SPACEGROUP", lineno));
        }
        if self.data.spacegroup != 0 || parts.len() > 1 {
            return Err(self.err(
                lineno,
                "Multiple entries specified in @SPACEGROUP section (requires just a single \
                 number)",
            ));
        }
        let sg = parse_i64(&parts[0]).map_err(|e| {
            self.err(
                lineno,
                format!("Problem while decoding spacegroup parameter: {}", e.message()),
            )
        })?;
        if !(1..=230).contains(&sg) {
            return Err(self.err(
                lineno,
                format!("Space group number {} is not in the range 1..230", sg),
            ));
        }
        self.data.spacegroup = sg as u32;
        Ok(())
    }

    fn handle_debyetemperature(&mut self, parts: &[String], lineno: u64) -> Result<()> {
        if parts.is_empty() {
            if !self.data.has_debyetemp() {
                return Err(self.err(lineno, "Missing data in @DEBYETEMPERATURE section"));
            }
            return self
                .data
                .validate_debyetemperature()
                .map_err(|e| self.section_err(e, "DEBYETEMPERATURE", lineno));
        }
        if self.data.debyetemp_global != 0.0 {
            return Err(self.err(
                lineno,
                "Invalid entries found after the global Debye temperature was already specified",
            ));
        }
        match parts.len() {
            1 => {
                if !self.data.debyetemp_perelement.is_empty() {
                    return Err(self.err(
                        lineno,
                        "Invalid entries (missing element name or temperature?)",
                    ));
                }
                self.data.debyetemp_global = parse_f64(&parts[0]).map_err(|e| {
                    self.err(
                        lineno,
                        format!(
                            "Problem while decoding global Debye temperature: {}",
                            e.message()
                        ),
                    )
                })?;
            }
            2 => {
                self.validate_element_name(&parts[0], lineno)?;
                let temp = parse_f64(&parts[1]).map_err(|e| {
                    self.err(
                        lineno,
                        format!(
                            "Problem while decoding temperature for element \"{}\": {}",
                            parts[0],
                            e.message()
                        ),
                    )
                })?;
                self.data
                    .debyetemp_perelement
                    .push((parts[0].clone(), temp));
            }
            _ => {
                return Err(self.err(lineno, "Wrong number of data entries"));
            }
        }
        Ok(())
    }

    fn handle_dyninfo(&mut self, parts: &[String], lineno: u64) -> Result<()> {
        if parts.is_empty() {
            if !self.dyninfo_open {
                return Err(self.err(lineno, "No input found in @DYNINFO section"));
            }
            let di = self
                .data
                .dyninfos
                .last()
                .expect("open dyninfo implies a list entry");
            di.validate()
                .map_err(|e| self.section_err(e, "DYNINFO", lineno))?;
            self.dyninfo_open = false;
            self.dyninfo_active_field = None;
            self.dyninfo_allow_negative = false;
            return Ok(());
        }
        if !self.dyninfo_open {
            self.data.dyninfos.push(RawDynInfo::default());
            self.dyninfo_open = true;
        }

        let p0 = parts[0].as_str();
        let mut values_start = 0usize;
        let mut target_key: Option<String> = None;

        let is_keyword = p0
            .chars()
            .next()
            .map(|c| c.is_ascii_lowercase())
            .unwrap_or(false)
            && p0.chars().all(|c| c.is_ascii_lowercase() || c == '_');

        if is_keyword {
            if parts.len() < 2 {
                return Err(self.err(
                    lineno,
                    format!("No arguments provided for keyword \"{}\"", p0),
                ));
            }
            // A new keyword deactivates any long-vector continuation
            self.dyninfo_active_field = None;
            self.dyninfo_allow_negative = false;
            values_start = 1;

            if p0 == "fraction" || p0 == "element" || p0 == "type" {
                if parts.len() != 2 {
                    return Err(self.err(
                        lineno,
                        format!("Keyword \"{}\" requires exactly one argument", p0),
                    ));
                }
                let p1 = parts[1].as_str();
                let di = self.data.dyninfos.last().expect("dyninfo is open");
                let repeated = match p0 {
                    "fraction" => di.fraction != -1.0,
                    "element" => !di.element_name.is_empty(),
                    _ => di.dyninfo_type != RawDynInfoType::Undefined,
                };
                if repeated {
                    return Err(self.err(
                        lineno,
                        format!("Keyword \"{}\" is specified a second time", p0),
                    ));
                }
                match p0 {
                    "fraction" => {
                        let fraction = self.parse_number_with_fractions(p1, lineno).map_err(|e| {
                            self.err(
                                lineno,
                                format!(
                                    "Problem while decoding fraction parameter: {}",
                                    e.message()
                                ),
                            )
                        })?;
                        if !(fraction > 0.0) || !(fraction <= 1.0) {
                            return Err(self.err(
                                lineno,
                                "Fraction parameter must be a number greater than 0.0 and at \
                                 most 1.0",
                            ));
                        }
                        self.data.dyninfos.last_mut().expect("open").fraction = fraction;
                    }
                    "element" => {
                        self.validate_element_name(p1, lineno)?;
                        self.data.dyninfos.last_mut().expect("open").element_name =
                            p1.to_string();
                    }
                    _ => {
                        let dtype = match p1 {
                            "scatknl" => RawDynInfoType::ScatKnl,
                            "vdos" => RawDynInfoType::Vdos,
                            "vdosdebye" => RawDynInfoType::VdosDebye,
                            "freegas" => RawDynInfoType::FreeGas,
                            "sterile" => RawDynInfoType::Sterile,
                            _ => {
                                return Err(self.err(
                                    lineno,
                                    "Invalid @DYNINFO type specified (must be one of \
                                     \"scatknl\", \"vdos\", \"vdosdebye\", \"freegas\", \
                                     \"sterile\")",
                                ))
                            }
                        };
                        self.data.dyninfos.last_mut().expect("open").dyninfo_type = dtype;
                    }
                }
                return Ok(());
            }

            // Generic numeric vector field
            if UNSUPPORTED_FIELDS.contains(&p0) {
                return Err(self.err(
                    lineno,
                    format!(
                        "Support for kernels in S(q,w) format and the keyword \"{}\" is not \
                         yet available in NCMAT files (planned for inclusion in later format \
                         versions)",
                        p0
                    ),
                ));
            }
            let di = self.data.dyninfos.last_mut().expect("dyninfo is open");
            if di.fields.contains_key(p0) {
                return Err(self.err(
                    lineno,
                    format!("Keyword \"{}\" is specified a second time", p0),
                ));
            }
            di.fields.insert(p0.to_string(), Vec::new());
            if LONG_VECTOR_FIELDS.contains(&p0) {
                self.dyninfo_active_field = Some(p0.to_string());
                self.dyninfo_allow_negative = NEGATIVE_OK_FIELDS.contains(&p0);
            }
            target_key = Some(p0.to_string());
        }

        let key = match target_key.or_else(|| self.dyninfo_active_field.clone()) {
            Some(k) => k,
            None => {
                return Err(self.err(
                    lineno,
                    "Found data values with no preceding keyword in @DYNINFO section",
                ))
            }
        };
        let allow_negative = self.dyninfo_allow_negative;

        let mut values: Vec<f64> = Vec::new();
        for (idx, token) in parts.iter().enumerate().skip(values_start) {
            let entry = idx + 1 - values_start;
            // Compact notation "V rN" repeats the value N times
            let (numstr, repeatstr) = match token.find('r') {
                Some(ridx) => (&token[..ridx], Some(&token[ridx + 1..])),
                None => (token.as_str(), None),
            };
            let repeat_count = match repeatstr {
                Some(rs) => {
                    let count = parse_i64(rs).map_err(|e| {
                        self.err(
                            lineno,
                            format!(
                                "Problem while decoding vector entry #{}: {}",
                                entry,
                                e.message()
                            ),
                        )
                    })?;
                    if count < 2 {
                        return Err(self.err(
                            lineno,
                            format!(
                                "Problem while decoding vector entry #{}: repeated entry \
                                 count parameter must be >= 2",
                                entry
                            ),
                        ));
                    }
                    count as usize
                }
                None => 1,
            };
            let value = parse_f64(numstr).map_err(|e| {
                self.err(
                    lineno,
                    format!(
                        "Problem while decoding vector entry #{}: {}",
                        entry,
                        e.message()
                    ),
                )
            })?;
            if !allow_negative && value < 0.0 {
                return Err(self.err(
                    lineno,
                    format!(
                        "Problem while decoding vector entry #{}: negative number",
                        entry
                    ),
                ));
            }
            values.extend(std::iter::repeat(value).take(repeat_count));
        }

        self.data
            .dyninfos
            .last_mut()
            .expect("dyninfo is open")
            .fields
            .get_mut(&key)
            .expect("field was inserted above or is the active long vector")
            .extend(values);
        Ok(())
    }

    fn handle_density(&mut self, parts: &[String], lineno: u64) -> Result<()> {
        if parts.is_empty() {
            if !self.data.has_density() {
                return Err(self.err(lineno, "No input found in @DENSITY section"));
            }
            return self
                .data
                .validate_density()
                .map_err(|e| self.section_err(e, "DENSITY", lineno));
        }
        if self.data.has_density() {
            return Err(self.err(lineno, "Multiple entries in @DENSITY section"));
        }
        if parts.len() != 2 {
            return Err(self.err(lineno, "Wrong number of entries in @DENSITY section"));
        }
        let value = parse_f64(&parts[0]).map_err(|e| {
            self.err(
                lineno,
                format!("Problem while decoding density value: {}", e.message()),
            )
        })?;
        match parts[1].as_str() {
            "atoms_per_aa3" => {
                self.data.density_unit = DensityUnit::AtomsPerAa3;
                self.data.density = value;
            }
            "kg_per_m3" => {
                self.data.density_unit = DensityUnit::KgPerM3;
                self.data.density = value;
            }
            "g_per_cm3" => {
                self.data.density_unit = DensityUnit::KgPerM3;
                self.data.density = value * 1000.0;
            }
            _ => return Err(self.err(lineno, "Invalid density unit")),
        }
        Ok(())
    }

    fn handle_atomdb(&mut self, parts: &[String], lineno: u64) -> Result<()> {
        if parts.is_empty() {
            return Ok(());
        }
        if parts[0] != "nodefaults" {
            self.validate_element_name(&parts[0], lineno)?;
        }
        self.data.atomdb_lines.push(parts.to_vec());
        Ok(())
    }

    fn handle_custom(&mut self, parts: &[String], _lineno: u64) -> Result<()> {
        if parts.is_empty() {
            return Ok(());
        }
        self.data
            .custom_sections
            .last_mut()
            .expect("custom section was opened at its marker")
            .1
            .push(parts.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::stream_from_buffer;

    fn parse_str(content: &str) -> Result<RawNcmatData> {
        parse_ncmat(stream_from_buffer("testbuf", content))
    }

    #[test]
    fn test_tokenizer_comments_and_whitespace() {
        let parser = NcmatParser::new();
        let parts = parser.tokenize("  a\tbb   ccc # comment täxt", 1).unwrap();
        assert_eq!(parts, vec!["a", "bb", "ccc"]);
        assert!(parser.tokenize("bad\u{1}byte", 1).is_err());
        assert!(parser.tokenize("bad\rmiddle", 1).is_err());
        assert!(parser.tokenize("dos line ending\r", 1).is_ok());
        // Non-ASCII outside comments is rejected
        assert!(parser.tokenize("täxt", 1).is_err());
    }

    #[test]
    fn test_first_line_gate() {
        assert!(parse_str("").is_err());
        assert!(parse_str("nope\n").is_err());
        assert!(parse_str("NCMAT\n").is_err());
        assert!(parse_str("NCMAT v9\n").is_err());
        assert!(parse_str("NCMAT v1 extra\n").is_err());
        // '#' on line one is rejected for v1 at the gate
        let e = parse_str("NCMAT v1 # hello\n@CELL\n").unwrap_err();
        assert!(e.to_string().contains("first line"), "{}", e);
    }

    #[test]
    fn test_minimal_v2_parses() {
        let content = "NCMAT v2\n\
                       @CELL\n\
                       lengths 4.04958 4.04958 4.04958\n\
                       angles 90 90 90\n\
                       @SPACEGROUP\n\
                       225\n\
                       @ATOMPOSITIONS\n\
                       Al 0 0 0\n\
                       Al 0 1/2 1/2\n\
                       Al 1/2 0 1/2\n\
                       Al 1/2 1/2 0\n\
                       @DEBYETEMPERATURE\n\
                       Al 410\n";
        let data = parse_str(content).unwrap();
        assert_eq!(data.version, 2);
        assert_eq!(data.spacegroup, 225);
        assert_eq!(data.atompos.len(), 4);
        assert_eq!(data.atompos[1].1, [0.0, 0.5, 0.5]);
        assert_eq!(data.debyetemp_perelement, vec![("Al".to_string(), 410.0)]);
    }

    #[test]
    fn test_rational_coordinates_require_v2() {
        let content = "NCMAT v1\n\
                       @CELL\n\
                       lengths 4.04958 4.04958 4.04958\n\
                       angles 90 90 90\n\
                       @SPACEGROUP\n\
                       225\n\
                       @ATOMPOSITIONS\n\
                       Al 0 0 0\n\
                       Al 0 1/2 1/2\n\
                       @DEBYETEMPERATURE\n\
                       Al 410\n";
        let e = parse_str(content).unwrap_err();
        assert!(e.to_string().contains("fractions"), "{}", e);
    }

    #[test]
    fn test_duplicate_section_rejected() {
        let content = "NCMAT v2\n\
                       @CELL\n\
                       lengths 4 4 4\n\
                       angles 90 90 90\n\
                       @CELL\n\
                       lengths 4 4 4\n";
        let e = parse_str(content).unwrap_err();
        assert!(e.to_string().contains("Multiple @CELL"), "{}", e);
    }

    #[test]
    fn test_section_marker_syntax() {
        assert!(parse_str("NCMAT v2\n @CELL\nlengths 4 4 4\nangles 90 90 90\n").is_err());
        assert!(parse_str("NCMAT v2\n@CELL extra\n").is_err());
        assert!(parse_str("NCMAT v2\n@\n").is_err());
        assert!(parse_str("NCMAT v2\n@NOSUCH\n").is_err());
    }

    #[test]
    fn test_version_gating_of_sections() {
        let e = parse_str("NCMAT v1\n@DYNINFO\n").unwrap_err();
        assert!(e.to_string().contains("NCMAT v2"), "{}", e);
        let e = parse_str("NCMAT v2\n@ATOMDB\n").unwrap_err();
        assert!(e.to_string().contains("NCMAT v3"), "{}", e);
        let e = parse_str("NCMAT v2\n@CUSTOM_FOO\n").unwrap_err();
        assert!(e.to_string().contains("NCMAT v3"), "{}", e);
    }

    #[test]
    fn test_v1_comment_rules() {
        // Comments before any section, starting at column 0, are fine
        let ok = "NCMAT v1\n\
                  # a leading comment\n\
                  @CELL\n\
                  lengths 4 4 4\n\
                  angles 90 90 90\n\
                  @ATOMPOSITIONS\n\
                  Al 0 0 0\n\
                  @DEBYETEMPERATURE\n\
                  410\n";
        assert!(parse_str(ok).is_ok());
        // Same comment after a section marker is rejected
        let bad = "NCMAT v1\n\
                   @CELL\n\
                   # comment inside section\n\
                   lengths 4 4 4\n\
                   angles 90 90 90\n\
                   @ATOMPOSITIONS\n\
                   Al 0 0 0\n\
                   @DEBYETEMPERATURE\n\
                   410\n";
        assert!(parse_str(bad).is_err());
        // Indented comment before the first section is also rejected
        let bad2 = "NCMAT v1\n\
                    \t# indented comment\n\
                    @CELL\n\
                    lengths 4 4 4\n\
                    angles 90 90 90\n\
                    @ATOMPOSITIONS\n\
                    Al 0 0 0\n\
                    @DEBYETEMPERATURE\n\
                    410\n";
        assert!(parse_str(bad2).is_err());
    }

    #[test]
    fn test_dyninfo_repeat_notation() {
        let content = "NCMAT v2\n\
                       @DYNINFO\n\
                       element He\n\
                       fraction 1.0\n\
                       type vdos\n\
                       vdos_egrid 0.01 0.1\n\
                       vdos_density 0 0.1 0.2 0.2r5 0.3\n\
                       @DENSITY\n\
                       1.0 kg_per_m3\n";
        let data = parse_str(content).unwrap();
        let density = &data.dyninfos[0].fields["vdos_density"];
        assert_eq!(
            density,
            &vec![0.0, 0.1, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2, 0.3]
        );
    }

    #[test]
    fn test_dyninfo_repeat_count_must_be_at_least_two() {
        let content = "NCMAT v2\n\
                       @DYNINFO\n\
                       element He\n\
                       fraction 1.0\n\
                       type vdos\n\
                       vdos_egrid 0.01 0.1\n\
                       vdos_density 0 0.1 0.2r1 0.3 0.4\n\
                       @DENSITY\n\
                       1.0 kg_per_m3\n";
        assert!(parse_str(content).is_err());
    }

    #[test]
    fn test_dyninfo_long_vector_continuation() {
        let content = "NCMAT v2\n\
                       @DYNINFO\n\
                       element Al\n\
                       fraction 1.0\n\
                       type scatknl\n\
                       temperature 293.15\n\
                       alphagrid 0.1 0.2\n\
                       betagrid -1.0 0.0\n\
                       1.0\n\
                       sab 1 2 3\n\
                       4 5 6\n\
                       @DENSITY\n\
                       1.0 g_per_cm3\n";
        let data = parse_str(content).unwrap();
        let di = &data.dyninfos[0];
        assert_eq!(di.fields["betagrid"], vec![-1.0, 0.0, 1.0]);
        assert_eq!(di.fields["sab"], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_dyninfo_negative_values() {
        // Negative values allowed on betagrid, not on alphagrid
        let content = "NCMAT v2\n\
                       @DYNINFO\n\
                       element Al\n\
                       fraction 1.0\n\
                       type scatknl\n\
                       alphagrid -0.1 0.2\n\
                       betagrid -1.0 0.0\n\
                       sab 1 2 3 4\n\
                       @DENSITY\n\
                       1.0 g_per_cm3\n";
        let e = parse_str(content).unwrap_err();
        assert!(e.to_string().contains("negative"), "{}", e);
    }

    #[test]
    fn test_dyninfo_sqw_not_supported() {
        let content = "NCMAT v2\n\
                       @DYNINFO\n\
                       element Al\n\
                       fraction 1.0\n\
                       type scatknl\n\
                       sqw 1 2 3\n";
        let e = parse_str(content).unwrap_err();
        assert!(e.to_string().contains("not yet available"), "{}", e);
    }

    #[test]
    fn test_density_units() {
        let base = "NCMAT v2\n\
                    @DYNINFO\n\
                    element He\n\
                    fraction 1.0\n\
                    type freegas\n\
                    @DENSITY\n";
        let data = parse_str(&format!("{}0.17 g_per_cm3\n", base)).unwrap();
        assert_eq!(data.density_unit, DensityUnit::KgPerM3);
        assert!((data.density - 170.0).abs() < 1e-10);
        let data = parse_str(&format!("{}170 kg_per_m3\n", base)).unwrap();
        assert!((data.density - 170.0).abs() < 1e-10);
        let data = parse_str(&format!("{}0.025 atoms_per_aa3\n", base)).unwrap();
        assert_eq!(data.density_unit, DensityUnit::AtomsPerAa3);
        assert!(parse_str(&format!("{}1.0 stone_per_bushel\n", base)).is_err());
    }

    #[test]
    fn test_custom_sections_verbatim() {
        let content = "NCMAT v3\n\
                       @CELL\n\
                       lengths 4 4 4\n\
                       angles 90 90 90\n\
                       @ATOMPOSITIONS\n\
                       Al 0 0 0\n\
                       @DEBYETEMPERATURE\n\
                       410\n\
                       @CUSTOM_FOO\n\
                       a b c\n\
                       @CUSTOM_FOO\n\
                       d e\n";
        let data = parse_str(content).unwrap();
        assert_eq!(data.custom_sections.len(), 2);
        assert_eq!(data.custom_sections[0].0, "FOO");
        assert_eq!(data.custom_sections[0].1, vec![vec!["a", "b", "c"]]);
        assert_eq!(data.custom_sections[1].1, vec![vec!["d", "e"]]);
    }

    #[test]
    fn test_custom_section_requires_suffix() {
        assert!(parse_str("NCMAT v3\n@CUSTOM_\nx\n").is_err());
    }

    #[test]
    fn test_atomdb_section() {
        let content = "NCMAT v3\n\
                       @CELL\n\
                       lengths 4 4 4\n\
                       angles 90 90 90\n\
                       @ATOMPOSITIONS\n\
                       Al 0 0 0\n\
                       @DEBYETEMPERATURE\n\
                       410\n\
                       @ATOMDB\n\
                       nodefaults\n\
                       Al 26.98u 3.449fm 0.0082b 0.231b\n";
        let data = parse_str(content).unwrap();
        assert_eq!(data.atomdb_lines.len(), 2);
        assert_eq!(data.atomdb_lines[0], vec!["nodefaults"]);
    }

    #[test]
    fn test_deuterium_alias_unaliased() {
        let content = "NCMAT v2\n\
                       @CELL\n\
                       lengths 3 3 3\n\
                       angles 90 90 90\n\
                       @ATOMPOSITIONS\n\
                       D 0 0 0\n\
                       @DEBYETEMPERATURE\n\
                       D 300\n";
        let data = parse_str(content).unwrap();
        assert_eq!(data.atompos[0].0, "2H");
        assert_eq!(data.debyetemp_perelement[0].0, "2H");
    }

    #[test]
    fn test_parser_determinism() {
        let content = "NCMAT v2\n\
                       @CELL\n\
                       lengths 4.04958 4.04958 4.04958\n\
                       angles 90 90 90\n\
                       @SPACEGROUP\n\
                       225\n\
                       @ATOMPOSITIONS\n\
                       Al 0 0 0\n\
                       Al 0 1/2 1/2\n\
                       Al 1/2 0 1/2\n\
                       Al 1/2 1/2 0\n\
                       @DEBYETEMPERATURE\n\
                       Al 410\n";
        let a = parse_str(content).unwrap();
        let b = parse_str(content).unwrap();
        assert_eq!(format!("{:?}", a), format!("{:?}", b));
    }
}
