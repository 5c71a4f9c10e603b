/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Raw material data record
//!
//! [`RawNcmatData`] is the syntactically parsed, pre-semantic output of the
//! NCMAT parser. Per-section validation methods are invoked by the parser
//! when a section closes; [`RawNcmatData::validate`] checks whole-record
//! invariants (version gating, mutual exclusions, fraction sums) before the
//! record is handed to the info builder.

use std::collections::{BTreeMap, HashSet};

use crate::atoms;
use crate::error::{Error, Result};

/// Highest supported NCMAT format version
pub const NCMAT_MAX_VERSION: u32 = 3;

/// Tolerance on the dynamic-info fraction sum
pub const FRACTION_SUM_TOLERANCE: f64 = 1e-6;

/// Unit cell section data
#[derive(Debug, Clone, Default)]
pub struct CellData {
    /// Lattice lengths a, b, c in angstrom
    pub lengths: Option<[f64; 3]>,
    /// Lattice angles alpha, beta, gamma in degrees
    pub angles: Option<[f64; 3]>,
}

/// Unit of the `@DENSITY` section value (g/cm3 input is reduced to kg/m3 at
/// parse time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DensityUnit {
    #[default]
    AtomsPerAa3,
    KgPerM3,
}

/// Dynamic-info model selector of a `@DYNINFO` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawDynInfoType {
    #[default]
    Undefined,
    Sterile,
    FreeGas,
    ScatKnl,
    Vdos,
    VdosDebye,
}

/// One `@DYNINFO` section, as parsed
#[derive(Debug, Clone)]
pub struct RawDynInfo {
    pub dyninfo_type: RawDynInfoType,
    /// Fraction in (0,1]; -1 while unset
    pub fraction: f64,
    pub element_name: String,
    /// Keyword fields with their numeric vectors
    pub fields: BTreeMap<String, Vec<f64>>,
}

impl Default for RawDynInfo {
    fn default() -> Self {
        RawDynInfo {
            dyninfo_type: RawDynInfoType::Undefined,
            fraction: -1.0,
            element_name: String::new(),
            fields: BTreeMap::new(),
        }
    }
}

impl RawDynInfo {
    fn require_no_fields_except(&self, allowed: &[&str]) -> Result<()> {
        for key in self.fields.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(Error::bad_input(format!(
                    "Keyword \"{}\" is not valid in a @DYNINFO section of type \"{}\"",
                    key,
                    self.type_name()
                )));
            }
        }
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        match self.dyninfo_type {
            RawDynInfoType::Undefined => "undefined",
            RawDynInfoType::Sterile => "sterile",
            RawDynInfoType::FreeGas => "freegas",
            RawDynInfoType::ScatKnl => "scatknl",
            RawDynInfoType::Vdos => "vdos",
            RawDynInfoType::VdosDebye => "vdosdebye",
        }
    }

    fn grid_strictly_increasing(values: &[f64]) -> bool {
        values.windows(2).all(|w| w[0] < w[1])
    }

    /// Validate one dynamic-info section after all its lines were consumed
    pub fn validate(&self) -> Result<()> {
        if self.fraction == -1.0 {
            return Err(Error::bad_input(
                "Missing \"fraction\" keyword in @DYNINFO section",
            ));
        }
        if self.element_name.is_empty() {
            return Err(Error::bad_input(
                "Missing \"element\" keyword in @DYNINFO section",
            ));
        }
        if self.dyninfo_type == RawDynInfoType::Undefined {
            return Err(Error::bad_input(
                "Missing \"type\" keyword in @DYNINFO section",
            ));
        }
        match self.dyninfo_type {
            RawDynInfoType::Sterile | RawDynInfoType::FreeGas | RawDynInfoType::VdosDebye => {
                self.require_no_fields_except(&[])?;
            }
            RawDynInfoType::Vdos => {
                self.require_no_fields_except(&["vdos_egrid", "vdos_density", "egrid"])?;
                let egrid = self.fields.get("vdos_egrid").ok_or_else(|| {
                    Error::bad_input("Missing \"vdos_egrid\" in @DYNINFO section of type vdos")
                })?;
                if egrid.len() != 2 || !(egrid[0] > 0.0) || !(egrid[1] > egrid[0]) {
                    return Err(Error::bad_input(
                        "The \"vdos_egrid\" keyword requires two increasing positive values",
                    ));
                }
                let density = self.fields.get("vdos_density").ok_or_else(|| {
                    Error::bad_input("Missing \"vdos_density\" in @DYNINFO section of type vdos")
                })?;
                if density.len() < 5 {
                    return Err(Error::bad_input(
                        "The \"vdos_density\" keyword requires at least five values",
                    ));
                }
                if !density.iter().any(|&v| v > 0.0) {
                    return Err(Error::bad_input(
                        "The \"vdos_density\" values must not all vanish",
                    ));
                }
            }
            RawDynInfoType::ScatKnl => {
                self.require_no_fields_except(&[
                    "alphagrid",
                    "betagrid",
                    "sab",
                    "sab_scaled",
                    "egrid",
                    "temperature",
                ])?;
                let alphagrid = self.fields.get("alphagrid").ok_or_else(|| {
                    Error::bad_input("Missing \"alphagrid\" in @DYNINFO section of type scatknl")
                })?;
                let betagrid = self.fields.get("betagrid").ok_or_else(|| {
                    Error::bad_input("Missing \"betagrid\" in @DYNINFO section of type scatknl")
                })?;
                if alphagrid.len() < 2 || !Self::grid_strictly_increasing(alphagrid) {
                    return Err(Error::bad_input(
                        "The \"alphagrid\" values must be at least two strictly increasing numbers",
                    ));
                }
                if betagrid.len() < 2 || !Self::grid_strictly_increasing(betagrid) {
                    return Err(Error::bad_input(
                        "The \"betagrid\" values must be at least two strictly increasing numbers",
                    ));
                }
                let sab = self.fields.get("sab");
                let sab_scaled = self.fields.get("sab_scaled");
                let kernel = match (sab, sab_scaled) {
                    (Some(k), None) | (None, Some(k)) => k,
                    (Some(_), Some(_)) => {
                        return Err(Error::bad_input(
                            "Only one of \"sab\" and \"sab_scaled\" may be specified",
                        ))
                    }
                    (None, None) => {
                        return Err(Error::bad_input(
                            "Missing \"sab\" or \"sab_scaled\" in @DYNINFO section of type scatknl",
                        ))
                    }
                };
                if kernel.len() != alphagrid.len() * betagrid.len() {
                    return Err(Error::bad_input(format!(
                        "Kernel size {} does not equal len(alphagrid)*len(betagrid) = {}",
                        kernel.len(),
                        alphagrid.len() * betagrid.len()
                    )));
                }
                if let Some(tt) = self.fields.get("temperature") {
                    if tt.len() != 1 || !(tt[0] > 0.0) {
                        return Err(Error::bad_input(
                            "The \"temperature\" keyword requires a single positive value",
                        ));
                    }
                }
            }
            RawDynInfoType::Undefined => unreachable!(),
        }
        if let Some(egrid) = self.fields.get("egrid") {
            if egrid.len() < 3 {
                return Err(Error::bad_input(
                    "The \"egrid\" keyword requires at least three values",
                ));
            }
            if egrid.len() > 3 && !Self::grid_strictly_increasing(egrid) {
                return Err(Error::bad_input(
                    "The \"egrid\" values must be strictly increasing",
                ));
            }
        }
        Ok(())
    }
}

/// Raw material data, produced by the parser
#[derive(Debug, Clone, Default)]
pub struct RawNcmatData {
    /// Format version, 1..=3
    pub version: u32,
    pub source_descr: String,
    pub source_type: String,
    /// Combined "type \"description\"" string used in error messages
    pub source_full_descr: String,
    pub cell: CellData,
    /// Atom positions in fractional unit-cell coordinates
    pub atompos: Vec<(String, [f64; 3])>,
    /// Space group number 1..=230, 0 when unset
    pub spacegroup: u32,
    /// Global Debye temperature in kelvin, 0 when unset
    pub debyetemp_global: f64,
    pub debyetemp_perelement: Vec<(String, f64)>,
    pub dyninfos: Vec<RawDynInfo>,
    /// Density value, 0 when unset
    pub density: f64,
    pub density_unit: DensityUnit,
    /// Verbatim token sequences of the `@ATOMDB` section
    pub atomdb_lines: Vec<Vec<String>>,
    /// `(tag, lines)` for each `@CUSTOM_<tag>` section, in file order
    pub custom_sections: Vec<(String, Vec<Vec<String>>)>,
}

impl RawNcmatData {
    pub fn has_cell(&self) -> bool {
        self.cell.lengths.is_some() || self.cell.angles.is_some()
    }

    pub fn has_atompos(&self) -> bool {
        !self.atompos.is_empty()
    }

    pub fn has_spacegroup(&self) -> bool {
        self.spacegroup != 0
    }

    pub fn has_debyetemp(&self) -> bool {
        self.debyetemp_global != 0.0 || !self.debyetemp_perelement.is_empty()
    }

    pub fn has_density(&self) -> bool {
        self.density != 0.0
    }

    pub fn has_dyninfo(&self) -> bool {
        !self.dyninfos.is_empty()
    }

    pub fn has_atomdb(&self) -> bool {
        !self.atomdb_lines.is_empty()
    }

    pub fn has_custom_sections(&self) -> bool {
        !self.custom_sections.is_empty()
    }

    pub fn is_crystalline(&self) -> bool {
        self.has_cell() || self.has_atompos() || self.has_spacegroup()
    }

    fn bad(&self, msg: impl Into<String>) -> Error {
        Error::BadInput(crate::error::BadInput {
            message: msg.into(),
            source_descr: if self.source_full_descr.is_empty() {
                None
            } else {
                Some(self.source_full_descr.clone())
            },
            line: None,
        })
    }

    /// Validate an element/atom name against the version-gated grammar
    ///
    /// v1 admits standard chemical element symbols only; v2 adds isotope
    /// markers ("2H") and the aliases "D"/"T"; v3 additionally admits
    /// user-defined labels of the form `[A-Za-z][A-Za-z0-9]*` up to a fixed
    /// length.
    pub fn validate_element_name_by_version(name: &str, version: u32) -> Result<()> {
        if name.is_empty() {
            return Err(Error::bad_input("Empty element name"));
        }
        if atoms::is_element_symbol(name) {
            return Ok(());
        }
        if name == "D" || name == "T" || atoms::is_isotope_marker(name) {
            if version < 2 {
                return Err(Error::bad_input(format!(
                    "Element name \"{}\" requires NCMAT v2 or later (NCMAT v1 only \
                     supports standard element symbols)",
                    name
                )));
            }
            return Ok(());
        }
        if atoms::is_valid_custom_label(name) {
            if version < 3 {
                return Err(Error::bad_input(format!(
                    "Custom atom label \"{}\" requires NCMAT v3 or later",
                    name
                )));
            }
            return Ok(());
        }
        Err(Error::bad_input(format!(
            "Invalid element name \"{}\"",
            name
        )))
    }

    /// Replace the reserved aliases "D" and "T" with their isotope markers
    pub fn unalias_element_names(&mut self) {
        fn unalias(name: &mut String) {
            if name == "D" {
                *name = "2H".to_string();
            } else if name == "T" {
                *name = "3H".to_string();
            }
        }
        for (name, _) in &mut self.atompos {
            unalias(name);
        }
        for (name, _) in &mut self.debyetemp_perelement {
            unalias(name);
        }
        for di in &mut self.dyninfos {
            unalias(&mut di.element_name);
        }
        for line in &mut self.atomdb_lines {
            if let Some(first) = line.first_mut() {
                if first != "nodefaults" {
                    unalias(first);
                }
            }
            if line.len() == 3 && line[1] == "is" {
                unalias(&mut line[2]);
            }
        }
    }

    pub fn validate_cell(&self) -> Result<()> {
        let lengths = self
            .cell
            .lengths
            .ok_or_else(|| self.bad("Missing \"lengths\" data in @CELL section"))?;
        let angles = self
            .cell
            .angles
            .ok_or_else(|| self.bad("Missing \"angles\" data in @CELL section"))?;
        for &v in &lengths {
            if !(v > 0.0) || !v.is_finite() {
                return Err(self.bad("Cell lengths must be positive numbers"));
            }
        }
        for &v in &angles {
            if !v.is_finite() || !(v > 0.0) || !(v < 180.0) {
                return Err(self.bad("Cell angles must be in the open interval (0,180) degrees"));
            }
        }
        Ok(())
    }

    pub fn validate_atompos(&self) -> Result<()> {
        if self.atompos.is_empty() {
            return Err(self.bad("No atom positions specified"));
        }
        for (name, pos) in &self.atompos {
            Self::validate_element_name_by_version(name, self.version)?;
            for &c in pos {
                if !c.is_finite() || !(0.0..1.0).contains(&c) {
                    return Err(self.bad(format!(
                        "Atom position coordinates of element \"{}\" must be in [0,1)",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn validate_spacegroup(&self) -> Result<()> {
        if self.spacegroup != 0 && !(1..=230).contains(&self.spacegroup) {
            return Err(self.bad("Space group number must be in the range 1..230"));
        }
        Ok(())
    }

    pub fn validate_debyetemperature(&self) -> Result<()> {
        if self.debyetemp_global != 0.0 && !self.debyetemp_perelement.is_empty() {
            return Err(self.bad(
                "Both global and per-element Debye temperatures specified (they are \
                 mutually exclusive)",
            ));
        }
        if self.debyetemp_global != 0.0
            && (!(self.debyetemp_global > 0.0) || !self.debyetemp_global.is_finite())
        {
            return Err(self.bad("Global Debye temperature must be a positive number"));
        }
        let mut seen = HashSet::new();
        for (name, temp) in &self.debyetemp_perelement {
            Self::validate_element_name_by_version(name, self.version)?;
            if !(*temp > 0.0) || !temp.is_finite() {
                return Err(self.bad(format!(
                    "Debye temperature of element \"{}\" must be a positive number",
                    name
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(self.bad(format!(
                    "Element \"{}\" appears more than once in the @DEBYETEMPERATURE section",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn validate_density(&self) -> Result<()> {
        if !(self.density > 0.0) || !self.density.is_finite() {
            return Err(self.bad("Density must be a positive number"));
        }
        Ok(())
    }

    pub fn validate_atomdb(&self) -> Result<()> {
        for (iline, line) in self.atomdb_lines.iter().enumerate() {
            atoms::validate_atom_db_line(line)?;
            if line[0] == "nodefaults" && iline != 0 {
                return Err(self.bad(
                    "The \"nodefaults\" keyword is only legal as the first line of the \
                     @ATOMDB section",
                ));
            }
        }
        Ok(())
    }

    /// Whole-record validation
    pub fn validate(&self) -> Result<()> {
        if !(1..=NCMAT_MAX_VERSION).contains(&self.version) {
            return Err(self.bad(format!("Invalid NCMAT format version {}", self.version)));
        }
        if self.version < 2 && (self.has_dyninfo() || self.has_density()) {
            return Err(self.bad(
                "@DYNINFO and @DENSITY sections are only available from NCMAT v2 onwards",
            ));
        }
        if self.version < 3 && (self.has_atomdb() || self.has_custom_sections()) {
            return Err(self.bad(
                "@ATOMDB and @CUSTOM_ sections are only available from NCMAT v3 onwards",
            ));
        }

        if self.has_cell() {
            self.validate_cell()?;
        }
        self.validate_spacegroup()?;
        if self.has_atompos() {
            self.validate_atompos()?;
        }
        self.validate_debyetemperature()?;
        if self.has_density() {
            self.validate_density()?;
        }
        self.validate_atomdb()?;

        // Crystalline sections come as a package
        if self.has_spacegroup() && !self.has_cell() {
            return Err(self.bad("@SPACEGROUP section requires a @CELL section"));
        }
        if self.has_atompos() != self.has_cell() {
            return Err(self.bad("@CELL and @ATOMPOSITIONS sections require each other"));
        }
        if self.has_density() && self.is_crystalline() {
            return Err(self.bad(
                "@DENSITY sections are only for materials without unit cell structure",
            ));
        }
        if !self.is_crystalline() && !(self.has_dyninfo() && self.has_density()) {
            return Err(self.bad(
                "Materials without unit cell structure must provide both @DYNINFO and \
                 @DENSITY sections",
            ));
        }

        // Per-element Debye temperatures must refer to atoms actually present
        if self.has_atompos() {
            let present: HashSet<&str> =
                self.atompos.iter().map(|(n, _)| n.as_str()).collect();
            for (name, _) in &self.debyetemp_perelement {
                if !present.contains(name.as_str()) {
                    return Err(self.bad(format!(
                        "Element \"{}\" has a Debye temperature but no atom positions",
                        name
                    )));
                }
            }
        }

        if self.has_dyninfo() {
            let mut seen = HashSet::new();
            let mut fraction_sum = 0.0;
            for di in &self.dyninfos {
                di.validate()?;
                Self::validate_element_name_by_version(&di.element_name, self.version)?;
                if !seen.insert(di.element_name.clone()) {
                    return Err(self.bad(format!(
                        "Multiple @DYNINFO sections for element \"{}\"",
                        di.element_name
                    )));
                }
                fraction_sum += di.fraction;
            }
            if (fraction_sum - 1.0).abs() > FRACTION_SUM_TOLERANCE {
                return Err(self.bad(format!(
                    "The @DYNINFO fractions do not sum to unity (sum = {})",
                    fraction_sum
                )));
            }
        }

        for (tag, _) in &self.custom_sections {
            if tag.is_empty() {
                return Err(self.bad("Empty tag in @CUSTOM_ section"));
            }
        }
        Ok(())
    }
}
