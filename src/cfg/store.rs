/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Material configuration store
//!
//! [`MatCfg`] pairs a data source name with a typed parameter table. Handles
//! are cheap to clone and share the underlying table; any setter first
//! ensures exclusive ownership by cloning the table when it is shared, so
//! holders of other handles observe snapshot semantics. Typed reads can be
//! observed by installed access spies, and the canonical serialization (set
//! parameters in alphabetical order) doubles as the configuration's identity
//! for caching.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::cfg::options;
use crate::cfg::value::{
    CfgValue, OrientDir, UnitClass, ValAtomDb, ValBool, ValDbl, ValInt, ValStr, ValVector,
    FORBIDDEN_CHARS,
};
use crate::error::{Error, Result};
use crate::stream::{open_text_input, stream_from_buffer, TextInputStream};
use crate::utils::constants::{K_INFINITY, K_PI};
use crate::utils::strings::{basename, contains_any, contains_only, file_ext, is_simple_ascii};

/// Marker of configuration data embedded in material input
pub const EMBEDDED_CFG_PATTERN: &str = "NCRYSTALMATCFG";

const LOWER_NUM_UNDERSCORE: &str = "abcdefghijklmnopqrstuvwxyz_0123456789";

/// Number of parameters in the catalog
const PAR_COUNT: usize = 21;

/// The closed parameter catalog, in alphabetical order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Param {
    Absnfactory,
    Atomdb,
    CohElas,
    Dcutoff,
    Dcutoffup,
    Dir1,
    Dir2,
    Dirtol,
    IncohElas,
    Inelas,
    Infofactory,
    Lcaxis,
    Lcmode,
    Mos,
    Mosprec,
    Overridefileext,
    Packfact,
    Scatfactory,
    Sccutoff,
    Temp,
    Vdoslux,
}

const ALL_PARAMS: [Param; PAR_COUNT] = [
    Param::Absnfactory,
    Param::Atomdb,
    Param::CohElas,
    Param::Dcutoff,
    Param::Dcutoffup,
    Param::Dir1,
    Param::Dir2,
    Param::Dirtol,
    Param::IncohElas,
    Param::Inelas,
    Param::Infofactory,
    Param::Lcaxis,
    Param::Lcmode,
    Param::Mos,
    Param::Mosprec,
    Param::Overridefileext,
    Param::Packfact,
    Param::Scatfactory,
    Param::Sccutoff,
    Param::Temp,
    Param::Vdoslux,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValType {
    Dbl,
    Int,
    Bool,
    Str,
    OrientDir,
    Vector,
    AtomDb,
}

struct ParInfo {
    name: &'static str,
    vtype: ValType,
    unit: UnitClass,
}

// Keep sorted by name and synchronised with the Param enum
const PAR_INFOS: [ParInfo; PAR_COUNT] = [
    ParInfo { name: "absnfactory", vtype: ValType::Str, unit: UnitClass::None },
    ParInfo { name: "atomdb", vtype: ValType::AtomDb, unit: UnitClass::None },
    ParInfo { name: "coh_elas", vtype: ValType::Bool, unit: UnitClass::None },
    ParInfo { name: "dcutoff", vtype: ValType::Dbl, unit: UnitClass::Length },
    ParInfo { name: "dcutoffup", vtype: ValType::Dbl, unit: UnitClass::Length },
    ParInfo { name: "dir1", vtype: ValType::OrientDir, unit: UnitClass::None },
    ParInfo { name: "dir2", vtype: ValType::OrientDir, unit: UnitClass::None },
    ParInfo { name: "dirtol", vtype: ValType::Dbl, unit: UnitClass::Angle },
    ParInfo { name: "incoh_elas", vtype: ValType::Bool, unit: UnitClass::None },
    ParInfo { name: "inelas", vtype: ValType::Str, unit: UnitClass::None },
    ParInfo { name: "infofactory", vtype: ValType::Str, unit: UnitClass::None },
    ParInfo { name: "lcaxis", vtype: ValType::Vector, unit: UnitClass::None },
    ParInfo { name: "lcmode", vtype: ValType::Int, unit: UnitClass::None },
    ParInfo { name: "mos", vtype: ValType::Dbl, unit: UnitClass::Angle },
    ParInfo { name: "mosprec", vtype: ValType::Dbl, unit: UnitClass::None },
    ParInfo { name: "overridefileext", vtype: ValType::Str, unit: UnitClass::None },
    ParInfo { name: "packfact", vtype: ValType::Dbl, unit: UnitClass::None },
    ParInfo { name: "scatfactory", vtype: ValType::Str, unit: UnitClass::None },
    ParInfo { name: "sccutoff", vtype: ValType::Dbl, unit: UnitClass::None },
    ParInfo { name: "temp", vtype: ValType::Dbl, unit: UnitClass::Temperature },
    ParInfo { name: "vdoslux", vtype: ValType::Int, unit: UnitClass::None },
];

fn par_from_name(name: &str) -> Option<Param> {
    PAR_INFOS
        .binary_search_by(|p| p.name.cmp(name))
        .ok()
        .map(|idx| ALL_PARAMS[idx])
}

/// Observer of typed parameter reads
pub trait AccessSpy: Send + Sync {
    fn par_accessed(&self, name: &str);
}

#[derive(Clone)]
struct CfgData {
    datafile_resolved: String,
    datafile_orig: String,
    datafileext: String,
    ignoredfilecfg: bool,
    parlist: [Option<CfgValue>; PAR_COUNT],
}

impl Default for CfgData {
    fn default() -> Self {
        CfgData {
            datafile_resolved: String::new(),
            datafile_orig: String::new(),
            datafileext: String::new(),
            ignoredfilecfg: false,
            parlist: Default::default(),
        }
    }
}

/// Single-crystal orientation: two crystal/laboratory direction pairs plus
/// the tolerance used when reconciling them
#[derive(Debug, Clone)]
pub struct SCOrientation {
    pub dir1: OrientDir,
    pub dir2: OrientDir,
    pub dirtol: f64,
}

/// Restores suspended spies when dropped
struct SpySuspender<'a> {
    slot: &'a Mutex<Vec<Weak<dyn AccessSpy>>>,
    stash: Vec<Weak<dyn AccessSpy>>,
}

impl<'a> SpySuspender<'a> {
    fn new(slot: &'a Mutex<Vec<Weak<dyn AccessSpy>>>) -> Self {
        let stash = std::mem::take(&mut *slot.lock().unwrap());
        SpySuspender { slot, stash }
    }
}

impl Drop for SpySuspender<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap() = std::mem::take(&mut self.stash);
    }
}

/// A shareable handle to a validated material configuration
pub struct MatCfg {
    data: Arc<CfgData>,
    spies: Mutex<Vec<Weak<dyn AccessSpy>>>,
}

impl Clone for MatCfg {
    /// Clones share the parameter table (copy-on-write); installed spies
    /// stay with the original handle.
    fn clone(&self) -> Self {
        MatCfg {
            data: Arc::clone(&self.data),
            spies: Mutex::new(Vec::new()),
        }
    }
}

impl MatCfg {
    /// Parse a configuration string of the form
    /// `<source-name>[;ignorefilecfg][;key=value]...`
    ///
    /// The source name is resolved to a text input which is scanned for an
    /// embedded `NCRYSTALMATCFG[...]` block (unless `ignorefilecfg` is
    /// given); embedded parameters are applied before the user-specified
    /// ones, so the user wins on conflicts.
    pub fn new(datafile_and_parameters: &str) -> Result<MatCfg> {
        let input = datafile_and_parameters.trim();
        let (filename, rest) = match input.split_once(';') {
            Some((f, r)) => (f.trim(), Some(r)),
            None => (input, None),
        };
        if filename.is_empty() {
            return Err(Error::missing_info("Please supply name of data file"));
        }
        if filename.contains('=') {
            return Err(Error::bad_input(format!(
                "Filename contains a forbidden character ('='): {}",
                filename
            )));
        }
        let stream = open_text_input(filename)?;
        Self::with_stream(filename, stream, rest)
    }

    /// Build a configuration around an in-memory material source
    ///
    /// `parameters` uses the same `[ignorefilecfg;]key=value;...` syntax as
    /// the part after the source name in [`MatCfg::new`].
    pub fn from_buffer(name: &str, content: &str, parameters: &str) -> Result<MatCfg> {
        if name.trim().is_empty() {
            return Err(Error::missing_info("Please supply name of data buffer"));
        }
        let stream = stream_from_buffer(name, content);
        let rest = parameters.trim();
        Self::with_stream(name, stream, if rest.is_empty() { None } else { Some(rest) })
    }

    fn with_stream(
        filename: &str,
        mut stream: Box<dyn TextInputStream>,
        rest: Option<&str>,
    ) -> Result<MatCfg> {
        let mut data = CfgData {
            datafile_resolved: stream
                .on_disk_resolved_path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            ..Default::default()
        };
        if filename != data.datafile_resolved {
            data.datafile_orig = filename.to_string();
        }
        data.datafileext = file_ext(filename).to_string();

        let (ignoredfilecfg, extracfg) = match rest {
            None => (false, String::new()),
            Some(rest) => match rest.split_once(';') {
                Some((first, tail)) if first.trim() == "ignorefilecfg" => {
                    (true, tail.to_string())
                }
                None if rest.trim() == "ignorefilecfg" => (true, String::new()),
                _ => (false, rest.to_string()),
            },
        };
        data.ignoredfilecfg = ignoredfilecfg;

        let mut cfg = MatCfg {
            data: Arc::new(data),
            spies: Mutex::new(Vec::new()),
        };

        if !ignoredfilecfg {
            if let Some(embedded) = extract_embedded_cfg(&mut *stream)? {
                cfg.apply_str_cfg(&embedded)?;
            }
        }
        if !extracfg.trim().is_empty() {
            cfg.apply_str_cfg(&extracfg)?;
        }

        if cfg.get_datafile_extension().is_empty() {
            return Err(Error::bad_input(format!(
                "Unsupported data file (can not determine extension): {}",
                cfg.get_datafile_as_specified()
            )));
        }
        Ok(cfg)
    }

    // ------------------------------------------------------------------
    // Spy machinery

    fn trigger_spy(&self, par: Param) {
        let guard = self.spies.lock().unwrap();
        if guard.is_empty() {
            return;
        }
        let name = PAR_INFOS[par as usize].name;
        for weak in guard.iter() {
            if let Some(spy) = weak.upgrade() {
                spy.par_accessed(name);
            }
        }
    }

    fn ensure_no_spy(&self) -> Result<()> {
        let guard = self.spies.lock().unwrap();
        if guard.iter().any(|w| w.strong_count() > 0) {
            return Err(Error::logic(
                "Modification of configuration object whose access is being monitored is \
                 forbidden",
            ));
        }
        Ok(())
    }

    /// Install an access spy; it is invoked with the parameter name on every
    /// typed read through this handle.
    pub fn add_access_spy(&self, spy: &Arc<dyn AccessSpy>) -> Result<()> {
        let mut guard = self.spies.lock().unwrap();
        if guard.iter().any(|w| Weak::ptr_eq(w, &Arc::downgrade(spy))) {
            return Err(Error::bad_input(
                "Attempt to install the same access spy more than once",
            ));
        }
        guard.push(Arc::downgrade(spy));
        Ok(())
    }

    pub fn has_access_spy(&self, spy: &Arc<dyn AccessSpy>) -> bool {
        self.spies
            .lock()
            .unwrap()
            .iter()
            .any(|w| Weak::ptr_eq(w, &Arc::downgrade(spy)))
    }

    pub fn remove_access_spy(&self, spy: &Arc<dyn AccessSpy>) -> Result<()> {
        let mut guard = self.spies.lock().unwrap();
        let before = guard.len();
        guard.retain(|w| !Weak::ptr_eq(w, &Arc::downgrade(spy)));
        if guard.len() == before {
            return Err(Error::bad_input(
                "Could not remove access spy which was never installed",
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internal typed access

    fn get_val(&self, par: Param) -> Option<&CfgValue> {
        self.trigger_spy(par);
        self.data.parlist[par as usize].as_ref()
    }

    fn has_par(&self, par: Param) -> bool {
        self.get_val(par).is_some()
    }

    fn cow(&mut self) -> Result<&mut CfgData> {
        self.ensure_no_spy()?;
        Ok(Arc::make_mut(&mut self.data))
    }

    fn set_par(&mut self, par: Param, value: CfgValue) -> Result<()> {
        self.cow()?.parlist[par as usize] = Some(value);
        Ok(())
    }

    fn get_dbl(&self, par: Param, default: f64) -> f64 {
        match self.get_val(par) {
            Some(CfgValue::Dbl(v)) => v.value,
            _ => default,
        }
    }

    fn get_dbl_no_fallback(&self, par: Param) -> Result<f64> {
        match self.get_val(par) {
            Some(CfgValue::Dbl(v)) => Ok(v.value),
            _ => Err(Error::missing_info(format!(
                "Value for parameter {} not available",
                PAR_INFOS[par as usize].name
            ))),
        }
    }

    fn get_bool(&self, par: Param, default: bool) -> bool {
        match self.get_val(par) {
            Some(CfgValue::Bool(v)) => v.value,
            _ => default,
        }
    }

    fn get_int(&self, par: Param, default: i32) -> i32 {
        match self.get_val(par) {
            Some(CfgValue::Int(v)) => v.value,
            _ => default,
        }
    }

    fn get_str(&self, par: Param, default: &str) -> String {
        match self.get_val(par) {
            Some(CfgValue::Str(v)) => v.value.clone(),
            _ => default.to_string(),
        }
    }

    fn get_orientdir(&self, par: Param) -> Result<OrientDir> {
        match self.get_val(par) {
            Some(CfgValue::OrientDir(v)) => Ok(v.clone()),
            _ => Err(Error::missing_info(format!(
                "Value for parameter {} not available",
                PAR_INFOS[par as usize].name
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Typed getters (code-level defaults as documented in the catalog)

    pub fn get_temp(&self) -> f64 {
        self.get_dbl(Param::Temp, -1.0)
    }

    pub fn get_dcutoff(&self) -> f64 {
        self.get_dbl(Param::Dcutoff, 0.0)
    }

    pub fn get_dcutoffup(&self) -> f64 {
        self.get_dbl(Param::Dcutoffup, K_INFINITY)
    }

    pub fn get_packfact(&self) -> f64 {
        self.get_dbl(Param::Packfact, 1.0)
    }

    /// Mosaicity has no code-level default; it must be set for single
    /// crystals.
    pub fn get_mos(&self) -> Result<f64> {
        self.get_dbl_no_fallback(Param::Mos)
    }

    pub fn get_mosprec(&self) -> f64 {
        self.get_dbl(Param::Mosprec, 1e-3)
    }

    pub fn get_sccutoff(&self) -> f64 {
        self.get_dbl(Param::Sccutoff, 0.4)
    }

    pub fn get_dirtol(&self) -> f64 {
        self.get_dbl(Param::Dirtol, 1e-4)
    }

    pub fn get_coh_elas(&self) -> bool {
        self.get_bool(Param::CohElas, true)
    }

    pub fn get_incoh_elas(&self) -> bool {
        self.get_bool(Param::IncohElas, true)
    }

    /// Inelastic model name; the aliases "none"/"0"/"sterile"/"false" all
    /// normalise to "none".
    pub fn get_inelas(&self) -> String {
        let value = self.get_str(Param::Inelas, "auto");
        match value.as_str() {
            "none" | "0" | "sterile" | "false" => "none".to_string(),
            _ => value,
        }
    }

    pub fn get_infofactory(&self) -> String {
        self.get_str(Param::Infofactory, "")
    }

    pub fn get_scatfactory(&self) -> String {
        self.get_str(Param::Scatfactory, "")
    }

    pub fn get_absnfactory(&self) -> String {
        self.get_str(Param::Absnfactory, "")
    }

    pub fn get_overridefileext(&self) -> String {
        self.get_str(Param::Overridefileext, "")
    }

    pub fn get_lcmode(&self) -> i32 {
        self.get_int(Param::Lcmode, 0)
    }

    pub fn get_vdoslux(&self) -> i32 {
        self.get_int(Param::Vdoslux, 3)
    }

    pub fn get_dir1(&self) -> Result<OrientDir> {
        self.get_orientdir(Param::Dir1)
    }

    pub fn get_dir2(&self) -> Result<OrientDir> {
        self.get_orientdir(Param::Dir2)
    }

    pub fn get_lcaxis(&self) -> Result<[f64; 3]> {
        match self.get_val(Param::Lcaxis) {
            Some(CfgValue::Vector(v)) => Ok(v.value),
            _ => Err(Error::missing_info("Value for parameter lcaxis not available")),
        }
    }

    /// Atomdb override in its one-line form, empty when unset
    pub fn get_atomdb(&self) -> String {
        match self.get_val(Param::Atomdb) {
            Some(CfgValue::AtomDb(v)) => v.to_strrep(),
            _ => String::new(),
        }
    }

    /// Atomdb override as token lines
    pub fn get_atomdb_parsed(&self) -> Vec<Vec<String>> {
        match self.get_val(Param::Atomdb) {
            Some(CfgValue::AtomDb(v)) => v.lines.clone(),
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Typed setters (logical mutation; triggers copy-on-write)

    pub fn set_temp(&mut self, v: f64) -> Result<()> {
        self.set_par(Param::Temp, CfgValue::Dbl(ValDbl::from_value(v)?))
    }

    pub fn set_dcutoff(&mut self, v: f64) -> Result<()> {
        self.set_par(Param::Dcutoff, CfgValue::Dbl(ValDbl::from_value(v)?))
    }

    pub fn set_dcutoffup(&mut self, v: f64) -> Result<()> {
        self.set_par(Param::Dcutoffup, CfgValue::Dbl(ValDbl::from_value(v)?))
    }

    pub fn set_packfact(&mut self, v: f64) -> Result<()> {
        self.set_par(Param::Packfact, CfgValue::Dbl(ValDbl::from_value(v)?))
    }

    pub fn set_mos(&mut self, v: f64) -> Result<()> {
        self.set_par(Param::Mos, CfgValue::Dbl(ValDbl::from_value(v)?))
    }

    pub fn set_mosprec(&mut self, v: f64) -> Result<()> {
        self.set_par(Param::Mosprec, CfgValue::Dbl(ValDbl::from_value(v)?))
    }

    pub fn set_sccutoff(&mut self, v: f64) -> Result<()> {
        self.set_par(Param::Sccutoff, CfgValue::Dbl(ValDbl::from_value(v)?))
    }

    pub fn set_dirtol(&mut self, v: f64) -> Result<()> {
        self.set_par(Param::Dirtol, CfgValue::Dbl(ValDbl::from_value(v)?))
    }

    pub fn set_coh_elas(&mut self, v: bool) -> Result<()> {
        self.set_par(Param::CohElas, CfgValue::Bool(ValBool { value: v }))
    }

    pub fn set_incoh_elas(&mut self, v: bool) -> Result<()> {
        self.set_par(Param::IncohElas, CfgValue::Bool(ValBool { value: v }))
    }

    pub fn set_inelas(&mut self, v: &str) -> Result<()> {
        self.set_par(Param::Inelas, CfgValue::Str(ValStr::from_str(v)?))
    }

    pub fn set_infofactory(&mut self, v: &str) -> Result<()> {
        self.set_par(Param::Infofactory, CfgValue::Str(ValStr::from_str(v)?))
    }

    pub fn set_scatfactory(&mut self, v: &str) -> Result<()> {
        self.set_par(Param::Scatfactory, CfgValue::Str(ValStr::from_str(v)?))
    }

    pub fn set_absnfactory(&mut self, v: &str) -> Result<()> {
        self.set_par(Param::Absnfactory, CfgValue::Str(ValStr::from_str(v)?))
    }

    pub fn set_overridefileext(&mut self, v: &str) -> Result<()> {
        self.set_par(Param::Overridefileext, CfgValue::Str(ValStr::from_str(v)?))
    }

    pub fn set_lcmode(&mut self, v: i32) -> Result<()> {
        self.set_par(Param::Lcmode, CfgValue::Int(ValInt { value: v }))
    }

    pub fn set_vdoslux(&mut self, v: i32) -> Result<()> {
        self.set_par(Param::Vdoslux, CfgValue::Int(ValInt { value: v }))
    }

    pub fn set_lcaxis(&mut self, axis: [f64; 3]) -> Result<()> {
        self.set_par(Param::Lcaxis, CfgValue::Vector(ValVector::from_values(axis)?))
    }

    pub fn set_dir1(&mut self, dir: OrientDir) -> Result<()> {
        self.set_par(Param::Dir1, CfgValue::OrientDir(dir))
    }

    pub fn set_dir2(&mut self, dir: OrientDir) -> Result<()> {
        self.set_par(Param::Dir2, CfgValue::OrientDir(dir))
    }

    pub fn set_atomdb(&mut self, v: &str) -> Result<()> {
        self.set_par(Param::Atomdb, CfgValue::AtomDb(ValAtomDb::from_str(v)?))
    }

    /// Set a parameter from its textual representation, resolving aliases
    /// and backwards-compatibility names.
    pub fn set_val_by_str(&mut self, name: &str, value: &str) -> Result<()> {
        // Pseudo-parameters (aliases and backwards compatibility)
        let name = match name {
            "bragg" => "coh_elas",
            "elas" => {
                let v = ValBool::from_str(value)?.value;
                self.set_coh_elas(v)?;
                self.set_incoh_elas(v)?;
                return Ok(());
            }
            "bkgd" => {
                if value == "none" || value == "0" {
                    self.set_incoh_elas(false)?;
                    self.set_inelas("none")?;
                    return Ok(());
                }
                return Err(Error::bad_input(
                    "The \"bkgd\" parameter is obsolete and is available for backwards \
                     compatibility only with the values \"0\" or \"none\". For control of \
                     inelastic or incoherent-elastic scattering, use the parameters \
                     \"incoh_elas\" and \"inelas\" instead.",
                ));
            }
            other => other,
        };
        let par = par_from_name(name)
            .ok_or_else(|| Error::bad_input(format!("Unknown parameter: \"{}\"", name)))?;
        let info = &PAR_INFOS[par as usize];
        if value.is_empty() && info.vtype != ValType::Str {
            return Err(Error::bad_input(format!(
                "Missing parameter value for parameter \"{}\"",
                name
            )));
        }
        let value = match info.vtype {
            ValType::Dbl => CfgValue::Dbl(ValDbl::from_str(value, info.unit)?),
            ValType::Int => CfgValue::Int(ValInt::from_str(value)?),
            ValType::Bool => CfgValue::Bool(ValBool::from_str(value)?),
            ValType::Str => CfgValue::Str(ValStr::from_str(value)?),
            ValType::OrientDir => CfgValue::OrientDir(OrientDir::from_str(value)?),
            ValType::Vector => CfgValue::Vector(ValVector::from_str(value)?),
            ValType::AtomDb => CfgValue::AtomDb(ValAtomDb::from_str(value)?),
        };
        self.set_par(par, value)
    }

    /// Apply a `;`-separated `key=value` parameter string
    pub fn apply_str_cfg(&mut self, s: &str) -> Result<()> {
        if !is_simple_ascii(s, true, true) {
            return Err(Error::bad_input(
                "Non-ASCII characters in parameter specification",
            ));
        }
        if contains_any(s, FORBIDDEN_CHARS) {
            return Err(Error::bad_input(
                "Forbidden characters in parameter specification",
            ));
        }
        for part in s.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if part == "ignorefilecfg" {
                return Err(Error::bad_input(
                    "The \"ignorefilecfg\" keyword can only be used directly after the \
                     filename",
                ));
            }
            let pieces: Vec<&str> = part.split('=').collect();
            if pieces.len() != 2 {
                return Err(Error::bad_input(format!(
                    "Bad syntax in parameter specification: \"{}\"",
                    part
                )));
            }
            let key = pieces[0].trim();
            let value = pieces[1].trim();
            if key.is_empty() {
                return Err(Error::bad_input("Missing parameter name"));
            }
            self.set_val_by_str(key, value)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Data file accessors

    /// The source name exactly as given to the constructor
    pub fn get_datafile_as_specified(&self) -> &str {
        if self.data.datafile_orig.is_empty() {
            &self.data.datafile_resolved
        } else {
            &self.data.datafile_orig
        }
    }

    /// Resolved on-disk path (empty for e.g. in-memory sources)
    pub fn get_datafile(&self) -> &str {
        &self.data.datafile_resolved
    }

    /// Extension used for factory selection, honouring `overridefileext`
    pub fn get_datafile_extension(&self) -> String {
        let override_ext = self.get_overridefileext();
        if override_ext.is_empty() {
            self.data.datafileext.clone()
        } else {
            override_ext
        }
    }

    /// Whether an embedded config block in the input was deliberately
    /// ignored
    pub fn ignored_embedded_config(&self) -> bool {
        self.data.ignoredfilecfg
    }

    // ------------------------------------------------------------------
    // Factory sub-options

    pub fn get_infofact_name(&self) -> String {
        options::decode_opt_name(&self.get_infofactory())
    }

    pub fn get_infofactopt_flag(&self, flagname: &str) -> Result<bool> {
        options::decode_opt_flag(&self.get_infofactory(), flagname)
    }

    pub fn get_infofactopt_dbl(&self, name: &str, default: f64) -> Result<f64> {
        options::decode_opt_dbl(&self.get_infofactory(), name, default)
    }

    pub fn get_infofactopt_int(&self, name: &str, default: i32) -> Result<i32> {
        options::decode_opt_int(&self.get_infofactory(), name, default)
    }

    pub fn infofactopt_validate(&self, recognised: &[&str]) -> Result<()> {
        options::validate_opts(&self.get_infofactory(), recognised)
    }

    // ------------------------------------------------------------------
    // Crystal mode

    pub fn is_single_crystal(&self) -> bool {
        self.has_par(Param::Mos)
            || self.has_par(Param::Dir1)
            || self.has_par(Param::Dir2)
            || self.has_par(Param::Dirtol)
    }

    pub fn is_poly_crystal(&self) -> bool {
        !self.is_single_crystal()
    }

    pub fn is_layered_crystal(&self) -> bool {
        self.has_par(Param::Lcaxis)
    }

    /// Extract the complete single-crystal orientation
    pub fn create_sc_orientation(&self) -> Result<SCOrientation> {
        self.check_consistency()?;
        if !self.is_single_crystal() {
            return Err(Error::missing_info(
                "Can not supply orientation for poly crystals",
            ));
        }
        Ok(SCOrientation {
            dir1: self.get_dir1()?,
            dir2: self.get_dir2()?,
            dirtol: self.get_dirtol(),
        })
    }

    /// Install a complete single-crystal orientation
    pub fn set_orientation(&mut self, sco: SCOrientation) -> Result<()> {
        self.set_dir1(sco.dir1)?;
        self.set_dir2(sco.dir2)?;
        self.set_dirtol(sco.dirtol)
    }

    // ------------------------------------------------------------------
    // Serialization

    /// Canonical serialization: set parameters in alphabetical order
    ///
    /// Spies are suspended for the duration, since this output is meant for
    /// caching and diagnostics rather than parameter consumption.
    pub fn to_str_cfg(&self, include_datafile: bool, only_parnames: Option<&BTreeSet<String>>) -> String {
        let _nospy = SpySuspender::new(&self.spies);
        let mut out = String::new();
        if include_datafile {
            out.push_str(self.get_datafile_as_specified());
            if self.data.ignoredfilecfg {
                out.push_str(";ignorefilecfg");
            }
        }
        for (idx, info) in PAR_INFOS.iter().enumerate() {
            if let Some(value) = &self.data.parlist[idx] {
                if let Some(only) = only_parnames {
                    if !only.contains(info.name) {
                        continue;
                    }
                }
                if !out.is_empty() {
                    out.push(';');
                }
                out.push_str(info.name);
                out.push('=');
                out.push_str(&value.to_strrep(false));
            }
        }
        out
    }

    /// Render the configuration as an embeddable `NCRYSTALMATCFG[...]` block
    pub fn to_embeddable_cfg(&self) -> String {
        format!("{}[{}]", EMBEDDED_CFG_PATTERN, self.to_str_cfg(false, None))
    }

    /// High-precision serialization of selected parameters for cache keying
    ///
    /// Unset parameters serialize as `<>` so that the signature also fixes
    /// which parameters were defaulted.
    pub fn cache_signature(&self, parnames: &BTreeSet<String>) -> Result<String> {
        let mut out = String::new();
        for name in parnames {
            let par = par_from_name(name)
                .ok_or_else(|| Error::bad_input(format!("Unknown parameter: \"{}\"", name)))?;
            if !out.is_empty() {
                out.push(';');
            }
            out.push_str(name);
            out.push('=');
            match &self.data.parlist[par as usize] {
                Some(value) => out.push_str(&value.to_strrep(true)),
                None => out.push_str("<>"),
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Consistency validation

    /// Enforce domain constraints across all parameters
    pub fn check_consistency(&self) -> Result<()> {
        let _nospy = SpySuspender::new(&self.spies);

        let temp = self.get_temp();
        if temp != -1.0 && !(temp > 0.0 && temp <= 1e5) {
            return Err(Error::bad_input("temp must be -1.0 or in the range (0.0,1e5]"));
        }
        let dcutoff = self.get_dcutoff();
        let dcutoffup = self.get_dcutoffup();
        if dcutoff != -1.0 {
            if dcutoff < 0.0 {
                return Err(Error::bad_input("dcutoff must be -1.0 or >=0.0"));
            }
            if dcutoff >= dcutoffup {
                return Err(Error::bad_input("dcutoff must be less than dcutoffup"));
            }
            if !(1e-3..=1e5).contains(&dcutoff) && dcutoff != 0.0 {
                return Err(Error::bad_input(
                    "dcutoff must be -1 (hkl lists disabled), 0 (for automatic selection), \
                     or in range [1e-3,1e5]",
                ));
            }
        }
        let packfact = self.get_packfact();
        if !(packfact > 0.0 && packfact <= 1.0) {
            return Err(Error::bad_input("packfact must be in range (0.0,1.0]"));
        }
        if self.get_sccutoff() < 0.0 {
            return Err(Error::bad_input("sccutoff must be >=0.0"));
        }
        let dirtol = self.get_dirtol();
        if !(dirtol > 0.0 && dirtol <= K_PI) {
            return Err(Error::bad_input("dirtol must be in range (0.0,pi]"));
        }
        let mosprec = self.get_mosprec();
        if !(0.9999e-7..=0.10000001).contains(&mosprec) {
            return Err(Error::bad_input("mosprec must be in the range [1e-7,1e-1]"));
        }

        let inelas = self.get_inelas();
        if inelas.is_empty() || !contains_only(&inelas, LOWER_NUM_UNDERSCORE) {
            return Err(Error::bad_input(format!(
                "Invalid inelas name specified: \"{}\"",
                inelas
            )));
        }

        let infofactory = self.get_infofactory();
        let infofact_name = self.get_infofact_name();
        if !contains_only(&infofact_name, LOWER_NUM_UNDERSCORE) {
            return Err(Error::bad_input(format!(
                "Invalid infofactory name specified: \"{}\"",
                infofact_name
            )));
        }
        if infofact_name.is_empty() && infofactory.contains(':') {
            return Err(Error::bad_input(
                "infofactory options not allowed when not specifying specific factory",
            ));
        }
        options::decode_opts(&infofactory, true)?;

        // The single-crystal parameters come as a package
        let n_orient = [Param::Dir1, Param::Dir2, Param::Mos]
            .iter()
            .filter(|&&p| self.has_par(p))
            .count();
        if n_orient != 0 && n_orient < 3 {
            return Err(Error::bad_input(
                "Must set all or none of mos, dir1 and dir2 parameters",
            ));
        }
        if n_orient == 0 && self.has_par(Param::Dirtol) {
            return Err(Error::bad_input(
                "mos, dir1 and dir2 parameters must all be set when dirtol is set",
            ));
        }

        if n_orient != 0 {
            let mos = self.get_mos()?;
            if !(mos > 0.0 && mos <= K_PI / 2.0) {
                return Err(Error::bad_input("mos must be in range (0.0,pi/2]"));
            }
            if packfact != 1.0 {
                return Err(Error::bad_input(
                    "Single crystal parameters are set, so packfact must be 1.0",
                ));
            }
            let dirs = [self.get_dir1()?, self.get_dir2()?];
            for dir in &dirs {
                if mag2(dir.crystal) == 0.0 {
                    return Err(Error::bad_input(if dir.crystal_is_hkl {
                        "Specified point in hkl space is a null-vector"
                    } else {
                        "Specified direction in crystal frame is a null-vector"
                    }));
                }
                if mag2(dir.lab) == 0.0 {
                    return Err(Error::bad_input(
                        "Specified direction in laboratory frame is a null-vector",
                    ));
                }
            }
            if is_parallel(dirs[0].lab, dirs[1].lab, 1e-6) {
                return Err(Error::bad_input(
                    "Specified primary and secondary lab directions are parallel",
                ));
            }
            if dirs[0].crystal_is_hkl == dirs[1].crystal_is_hkl
                && is_parallel(dirs[0].crystal, dirs[1].crystal, 1e-6)
            {
                return Err(Error::bad_input(if dirs[0].crystal_is_hkl {
                    "Specified primary and secondary hkl points have planes with parallel \
                     normals"
                } else {
                    "Specified primary and secondary directions in the crystal frame are \
                     parallel"
                }));
            }
        }

        if self.has_par(Param::Lcaxis) {
            let axis = self.get_lcaxis()?;
            let mag = mag2(axis).sqrt();
            if axis.iter().any(|v| v.is_infinite()) || mag.is_infinite() {
                return Err(Error::bad_input(
                    "Infinities or too large values specified in lcaxis vector",
                ));
            }
            if mag == 0.0 {
                return Err(Error::bad_input(
                    "Null vector or too small values specified in lcaxis vector",
                ));
            }
        }

        let vdoslux = self.get_vdoslux();
        if !(0..=5).contains(&vdoslux) {
            return Err(Error::bad_input(format!(
                "Specified invalid vdoslux value of {} (must be integer from 0 to 5)",
                vdoslux
            )));
        }
        Ok(())
    }
}

impl fmt::Display for MatCfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strcfg = self.to_str_cfg(false, None);
        write!(f, "MatCfg(\"{}", basename(self.get_datafile_as_specified()))?;
        if self.data.ignoredfilecfg {
            write!(f, ";ignorefilecfg")?;
        }
        if !strcfg.is_empty() {
            write!(f, ";{}", strcfg)?;
        }
        write!(f, "\")")
    }
}

fn mag2(v: [f64; 3]) -> f64 {
    v[0] * v[0] + v[1] * v[1] + v[2] * v[2]
}

fn is_parallel(a: [f64; 3], b: [f64; 3], epsilon: f64) -> bool {
    let cross = [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ];
    mag2(cross) <= epsilon * epsilon * mag2(a) * mag2(b)
}

/// Scan an input stream for a single embedded `NCRYSTALMATCFG[...]` block
fn extract_embedded_cfg(stream: &mut dyn TextInputStream) -> Result<Option<String>> {
    let source = stream.full_description();
    let mut result: Option<String> = None;
    while let Some(line) = stream.next_line()? {
        let pos = match line.find(EMBEDDED_CFG_PATTERN) {
            Some(p) => p,
            None => continue,
        };
        if result.is_some() {
            return Err(Error::bad_input(format!(
                "Input contains more than one {} specification: {}",
                EMBEDDED_CFG_PATTERN, source
            )));
        }
        let rest = &line[pos + EMBEDDED_CFG_PATTERN.len()..];
        if !rest.starts_with('[') {
            return Err(Error::bad_input(format!(
                "Input contains {} which is not followed by a '[' character: {}",
                EMBEDDED_CFG_PATTERN, source
            )));
        }
        if rest.contains(EMBEDDED_CFG_PATTERN) {
            return Err(Error::bad_input(format!(
                "Input contains more than one {} specification on a single line: {}",
                EMBEDDED_CFG_PATTERN, source
            )));
        }
        let rest = &rest[1..];
        let close = rest.find(']').ok_or_else(|| {
            Error::bad_input(format!(
                "Input contains {} without a closing ']' character: {}",
                EMBEDDED_CFG_PATTERN, source
            ))
        })?;
        result = Some(rest[..close].trim().to_string());
    }
    Ok(result)
}
