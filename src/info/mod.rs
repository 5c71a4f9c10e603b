/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Material info data model
//!
//! [`Info`] is the high-level description of a material: structure,
//! composition, dynamics, density and cross sections. Instances are
//! assembled in a writable phase by a factory (see [`builder`]) and then
//! sealed: [`Info::seal`] sorts the atom and HKL lists, computes the unique
//! display labels and assigns a process-wide unique id, after which any
//! mutation is a logic error. Physics models are initialised from sealed
//! info objects, providing a separation between data sources and the
//! algorithms working on the data.

pub mod builder;

use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};

use crate::atoms::{AtomData, AtomDataSP};
use crate::error::{Error, Result};
use crate::utils::constants::K_DEG;

static UNIQUE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static LIVE_INFO_COUNT: AtomicI64 = AtomicI64::new(0);

/// Diagnostic verbosity of the info reference-tracking facility, read once
/// from the `NCMAT_DEBUG` environment variable
static DEBUG_LEVEL: Lazy<u8> = Lazy::new(|| {
    env::var("NCMAT_DEBUG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
});

/// Number of live (not yet dropped) info objects
pub fn live_info_count() -> i64 {
    LIVE_INFO_COUNT.load(Ordering::Relaxed)
}

/// Dense identifier of an atom role within a single info object
///
/// Only valid in association with the info object that assigned it: the
/// same fundamental atom can play more than one role in a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtomIndex(pub u32);

/// Shared atom data plus its role index
#[derive(Debug, Clone)]
pub struct IndexedAtomData {
    pub data: AtomDataSP,
    pub index: AtomIndex,
}

impl IndexedAtomData {
    pub fn atom_data(&self) -> &AtomData {
        &self.data
    }
}

impl PartialEq for IndexedAtomData {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for IndexedAtomData {}

impl PartialOrd for IndexedAtomData {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexedAtomData {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

/// Crystal structure summary
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StructureInfo {
    /// Space group number 1..=230, 0 if not available
    pub spacegroup: u32,
    pub lattice_a: f64,
    pub lattice_b: f64,
    pub lattice_c: f64,
    /// Cell angles in degrees
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Cell volume in cubic angstrom
    pub volume: f64,
    /// Number of atoms per unit cell
    pub n_atoms: u32,
}

/// One family of Bragg planes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HklInfo {
    /// d-spacing in angstrom
    pub dspacing: f64,
    /// Structure factor squared in barn
    pub fsquared: f64,
    pub h: i32,
    pub k: i32,
    pub l: i32,
    pub multiplicity: u32,
}

/// One atom role in the unit cell
#[derive(Debug, Clone)]
pub struct AtomInfo {
    pub atom: IndexedAtomData,
    pub number_per_unit_cell: u32,
    /// Per-element Debye temperature in kelvin, 0 if not available
    pub debye_temp: f64,
    /// Fractional unit-cell coordinates (empty or `number_per_unit_cell`
    /// entries)
    pub positions: Vec<[f64; 3]>,
    /// Isotropic mean-square displacement in square angstrom, 0 if not
    /// available
    pub mean_square_displacement: f64,
}

/// Entry of the basic composition (fractions sum to one)
#[derive(Debug, Clone)]
pub struct CompositionEntry {
    pub fraction: f64,
    pub atom: IndexedAtomData,
}

/// Normalized scattering kernel S(alpha,beta) on its grids
#[derive(Debug)]
pub struct SabData {
    pub alpha_grid: Vec<f64>,
    pub beta_grid: Vec<f64>,
    /// Kernel values, beta-major: `sab[ibeta*nalpha + ialpha]`
    pub sab: Vec<f64>,
    pub temperature: f64,
}

impl SabData {
    pub fn value_at(&self, ialpha: usize, ibeta: usize) -> f64 {
        self.sab[ibeta * self.alpha_grid.len() + ialpha]
    }
}

/// Raw kernel data plus the deferred normalization
///
/// The normalized kernel is built on first request only. The build is
/// guarded so at most one thread performs it; all callers observe the same
/// finished artifact.
#[derive(Debug)]
pub struct SabBuildData {
    alphagrid: Vec<f64>,
    betagrid: Vec<f64>,
    sab_raw: Vec<f64>,
    scaled: bool,
    temperature: f64,
    built: OnceCell<Arc<SabData>>,
}

impl SabBuildData {
    pub fn new(
        alphagrid: Vec<f64>,
        betagrid: Vec<f64>,
        sab_raw: Vec<f64>,
        scaled: bool,
        temperature: f64,
    ) -> Result<Self> {
        if sab_raw.len() != alphagrid.len() * betagrid.len() {
            return Err(Error::bad_input(
                "Kernel size does not match the alpha and beta grids",
            ));
        }
        Ok(SabBuildData {
            alphagrid,
            betagrid,
            sab_raw,
            scaled,
            temperature,
            built: OnceCell::new(),
        })
    }

    pub fn has_built_sab(&self) -> bool {
        self.built.get().is_some()
    }

    /// Build the normalized kernel if needed and return it
    pub fn ensure_build_then_sab(&self) -> Result<Arc<SabData>> {
        self.built
            .get_or_try_init(|| self.build().map(Arc::new))
            .map(Arc::clone)
    }

    fn build(&self) -> Result<SabData> {
        let nalpha = self.alphagrid.len();
        let mut sab = self.sab_raw.clone();
        if self.scaled {
            // Unscale: S = S_scaled * exp(-beta/2), switching to log space
            // where the factor alone would overflow
            for (ibeta, &beta) in self.betagrid.iter().enumerate() {
                let exparg = -0.5 * beta;
                let row = &mut sab[ibeta * nalpha..(ibeta + 1) * nalpha];
                if exparg < 700.0 {
                    let factor = exparg.exp();
                    for entry in row {
                        *entry *= factor;
                    }
                } else {
                    for entry in row {
                        if *entry == 0.0 {
                            continue;
                        }
                        let combined = exparg + entry.ln();
                        if combined < 700.0 {
                            *entry = combined.exp();
                        } else {
                            return Err(Error::bad_input(format!(
                                "Problems unscaling S(alpha,beta) at beta={}: the result \
                                 overflows double precision",
                                beta
                            )));
                        }
                    }
                }
            }
        }
        Ok(SabData {
            alpha_grid: self.alphagrid.clone(),
            beta_grid: self.betagrid.clone(),
            sab,
            temperature: self.temperature,
        })
    }
}

/// Vibrational density of states parameterisation
#[derive(Debug, Clone)]
pub struct VdosData {
    /// Energy range (emin, emax) of the density grid, in eV
    pub egrid_range: (f64, f64),
    pub density: Vec<f64>,
}

/// Fields shared by every dynamic-info variant
#[derive(Debug, Clone)]
pub struct DynInfoCommon {
    pub fraction: f64,
    pub atom: IndexedAtomData,
    /// Same as on the associated info object, in kelvin
    pub temperature: f64,
}

/// Variant payload of a scattering-kernel dynamic info
#[derive(Debug)]
pub enum ScatKnlKind {
    /// Pre-calculated kernel needing only deferred normalization
    Direct(SabBuildData),
    /// Phonon spectrum to be expanded into a kernel by consuming code
    Vdos(VdosData),
    /// Idealised Debye-model spectrum below the Debye energy cutoff
    VdosDebye { debye_temperature: f64 },
}

/// Dynamic info which can, directly or indirectly, yield a scattering
/// kernel
#[derive(Debug)]
pub struct DiScatKnl {
    pub common: DynInfoCommon,
    pub kind: ScatKnlKind,
    /// Optional energy grid hint: 3 entries mean [emin,emax,npts] (0 leaves
    /// the choice to consuming code), 4 or more entries are a proper grid
    pub energy_grid: Option<Arc<Vec<f64>>>,
}

/// How inelastic scattering is modelled for one atom role
#[derive(Debug)]
pub enum DynamicInfo {
    /// Inelastic scattering absent or disabled
    Sterile(DynInfoCommon),
    /// Scattering on a free gas
    FreeGas(DynInfoCommon),
    ScatKnl(DiScatKnl),
}

impl DynamicInfo {
    pub fn common(&self) -> &DynInfoCommon {
        match self {
            DynamicInfo::Sterile(c) | DynamicInfo::FreeGas(c) => c,
            DynamicInfo::ScatKnl(k) => &k.common,
        }
    }

    pub fn fraction(&self) -> f64 {
        self.common().fraction
    }

    pub fn atom(&self) -> &IndexedAtomData {
        &self.common().atom
    }

    pub fn temperature(&self) -> f64 {
        self.common().temperature
    }
}

/// Lines of one custom section
pub type CustomLine = Vec<String>;
pub type CustomSectionData = Vec<CustomLine>;

type XsectProvider = Box<dyn Fn(f64) -> f64 + Send + Sync>;

/// Sealed high-level material description
///
/// Built by factories via the writable-phase methods, then frozen with
/// [`Info::seal`]. All list accessors return data in the deterministic
/// order established at sealing.
pub struct Info {
    uid: u64,
    locked: bool,
    structure: Option<StructureInfo>,
    atomlist: Vec<AtomInfo>,
    hkllist: Vec<HklInfo>,
    hkl_dlower: f64,
    hkl_dupper: f64,
    dyninfolist: Vec<DynamicInfo>,
    /// g/cm3, 0 when not available
    density: f64,
    /// atoms/Aa^3, 0 when not available
    numberdensity: f64,
    /// barn, negative when not available
    xsect_free: f64,
    xsect_absorption: f64,
    /// kelvin, non-positive when not available
    temperature: f64,
    debyetemp_global: f64,
    xsectprovider: Option<XsectProvider>,
    composition: Vec<CompositionEntry>,
    custom_sections: Vec<(String, CustomSectionData)>,
    atom_datas: Vec<AtomDataSP>,
    display_labels: Vec<String>,
}

impl Default for Info {
    fn default() -> Self {
        Self::new()
    }
}

impl Info {
    pub fn new() -> Self {
        let n = LIVE_INFO_COUNT.fetch_add(1, Ordering::Relaxed) + 1;
        if *DEBUG_LEVEL >= 1 {
            log::debug!("Info object created (live instances: {})", n);
        }
        Info {
            uid: 0,
            locked: false,
            structure: None,
            atomlist: Vec::new(),
            hkllist: Vec::new(),
            hkl_dlower: f64::INFINITY,
            hkl_dupper: f64::NEG_INFINITY,
            dyninfolist: Vec::new(),
            density: 0.0,
            numberdensity: 0.0,
            xsect_free: -1.0,
            xsect_absorption: -1.0,
            temperature: -1.0,
            debyetemp_global: 0.0,
            xsectprovider: None,
            composition: Vec::new(),
            custom_sections: Vec::new(),
            atom_datas: Vec::new(),
            display_labels: Vec::new(),
        }
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(Error::logic(
                "Modification of a sealed Info object is forbidden",
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Writable-phase methods, used by factories while assembling

    /// Register shared atom data, assigning the next dense role index
    pub fn register_atom_data(&mut self, data: AtomDataSP) -> Result<AtomIndex> {
        self.ensure_unlocked()?;
        let index = AtomIndex(self.atom_datas.len() as u32);
        self.atom_datas.push(data);
        Ok(index)
    }

    pub fn add_atom(&mut self, atom_info: AtomInfo) -> Result<()> {
        self.ensure_unlocked()?;
        self.atomlist.push(atom_info);
        Ok(())
    }

    pub fn set_structure(&mut self, structure: StructureInfo) -> Result<()> {
        self.ensure_unlocked()?;
        self.structure = Some(structure);
        Ok(())
    }

    /// Enable HKL information with the given d-spacing bounds
    pub fn enable_hkl_info(&mut self, dlower: f64, dupper: f64) -> Result<()> {
        self.ensure_unlocked()?;
        self.hkl_dlower = dlower;
        self.hkl_dupper = dupper;
        Ok(())
    }

    pub fn add_hkl(&mut self, hkl: HklInfo) -> Result<()> {
        self.ensure_unlocked()?;
        self.hkllist.push(hkl);
        Ok(())
    }

    pub fn set_hkl_list(&mut self, hkllist: Vec<HklInfo>) -> Result<()> {
        self.ensure_unlocked()?;
        self.hkllist = hkllist;
        Ok(())
    }

    pub fn add_dyn_info(&mut self, di: DynamicInfo) -> Result<()> {
        self.ensure_unlocked()?;
        self.dyninfolist.push(di);
        Ok(())
    }

    pub fn set_density(&mut self, density: f64) -> Result<()> {
        self.ensure_unlocked()?;
        self.density = density;
        Ok(())
    }

    pub fn set_number_density(&mut self, numberdensity: f64) -> Result<()> {
        self.ensure_unlocked()?;
        self.numberdensity = numberdensity;
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f64) -> Result<()> {
        self.ensure_unlocked()?;
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_global_debye_temperature(&mut self, debyetemp: f64) -> Result<()> {
        self.ensure_unlocked()?;
        self.debyetemp_global = debyetemp;
        Ok(())
    }

    pub fn set_xsect_free(&mut self, xs: f64) -> Result<()> {
        self.ensure_unlocked()?;
        self.xsect_free = xs;
        Ok(())
    }

    pub fn set_xsect_absorption(&mut self, xs: f64) -> Result<()> {
        self.ensure_unlocked()?;
        self.xsect_absorption = xs;
        Ok(())
    }

    pub fn set_xsect_provider(&mut self, provider: XsectProvider) -> Result<()> {
        self.ensure_unlocked()?;
        self.xsectprovider = Some(provider);
        Ok(())
    }

    pub fn set_composition(&mut self, composition: Vec<CompositionEntry>) -> Result<()> {
        self.ensure_unlocked()?;
        self.composition = composition;
        Ok(())
    }

    pub fn set_custom_sections(
        &mut self,
        custom_sections: Vec<(String, CustomSectionData)>,
    ) -> Result<()> {
        self.ensure_unlocked()?;
        self.custom_sections = custom_sections;
        Ok(())
    }

    /// Finalize the object: sort the HKL list (by decreasing d-spacing,
    /// then Miller indices) and the atom list (by decreasing Z, then role
    /// index), compute unique display labels, assign the unique id and
    /// freeze.
    pub fn seal(&mut self) -> Result<()> {
        if self.locked {
            return Err(Error::logic("seal called on an already sealed Info object"));
        }

        self.hkllist.sort_by(|a, b| {
            b.dspacing
                .partial_cmp(&a.dspacing)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| (a.h, a.k, a.l).cmp(&(b.h, b.k, b.l)))
        });
        self.atomlist.sort_by(|a, b| {
            b.atom
                .data
                .z()
                .cmp(&a.atom.data.z())
                .then(a.atom.index.cmp(&b.atom.index))
        });

        // Display labels: base symbol, with deterministic "-a", "-b", ...
        // suffixes disambiguating repeated bases
        let mut base_counts: HashMap<&str, u32> = HashMap::new();
        for data in &self.atom_datas {
            *base_counts.entry(data.name()).or_insert(0) += 1;
        }
        let mut seen: HashMap<String, u32> = HashMap::new();
        self.display_labels = self
            .atom_datas
            .iter()
            .map(|data| {
                let base = data.name();
                if base_counts[base] == 1 {
                    return base.to_string();
                }
                let n = seen.entry(base.to_string()).or_insert(0);
                let label = if *n < 26 {
                    format!("{}-{}", base, (b'a' + *n as u8) as char)
                } else {
                    format!("{}-x{}", base, n)
                };
                *n += 1;
                label
            })
            .collect();

        self.uid = UNIQUE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.locked = true;
        if *DEBUG_LEVEL >= 2 {
            log::debug!("Info object sealed with unique id {}", self.uid);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read accessors

    pub fn is_sealed(&self) -> bool {
        self.locked
    }

    /// Unique id assigned at sealing (0 before)
    pub fn unique_id(&self) -> u64 {
        self.uid
    }

    /// Crystalline means at least one of structure info, atom positions and
    /// HKL info is present
    pub fn is_crystalline(&self) -> bool {
        self.structure.is_some() || self.has_atom_positions() || self.has_hkl_info()
    }

    pub fn structure_info(&self) -> Option<&StructureInfo> {
        self.structure.as_ref()
    }

    pub fn atom_list(&self) -> &[AtomInfo] {
        &self.atomlist
    }

    pub fn has_atom_info(&self) -> bool {
        !self.atomlist.is_empty()
    }

    pub fn has_atom_positions(&self) -> bool {
        self.atomlist.first().map(|a| !a.positions.is_empty()).unwrap_or(false)
    }

    pub fn has_atom_msd(&self) -> bool {
        self.atomlist
            .first()
            .map(|a| a.mean_square_displacement > 0.0)
            .unwrap_or(false)
    }

    pub fn has_per_element_debye_temperature(&self) -> bool {
        self.atomlist.first().map(|a| a.debye_temp > 0.0).unwrap_or(false)
    }

    pub fn has_hkl_info(&self) -> bool {
        self.hkl_dupper >= self.hkl_dlower
    }

    pub fn hkl_list(&self) -> &[HklInfo] {
        &self.hkllist
    }

    pub fn hkl_dlower(&self) -> f64 {
        self.hkl_dlower
    }

    pub fn hkl_dupper(&self) -> f64 {
        self.hkl_dupper
    }

    pub fn dyn_info_list(&self) -> &[DynamicInfo] {
        &self.dyninfolist
    }

    /// Density in g/cm3
    pub fn density(&self) -> Option<f64> {
        (self.density > 0.0).then_some(self.density)
    }

    /// Number density in atoms/Aa^3
    pub fn number_density(&self) -> Option<f64> {
        (self.numberdensity > 0.0).then_some(self.numberdensity)
    }

    /// Temperature in kelvin
    pub fn temperature(&self) -> Option<f64> {
        (self.temperature > 0.0).then_some(self.temperature)
    }

    /// Global Debye temperature in kelvin
    pub fn global_debye_temperature(&self) -> Option<f64> {
        (self.debyetemp_global > 0.0).then_some(self.debyetemp_global)
    }

    /// Debye temperature of an atom role, whether global or per-element
    pub fn debye_temperature_by_element(&self, index: AtomIndex) -> Result<f64> {
        if let Some(atom_info) = self.atomlist.iter().find(|a| a.atom.index == index) {
            if atom_info.debye_temp > 0.0 {
                return Ok(atom_info.debye_temp);
            }
        }
        if self.debyetemp_global > 0.0 {
            return Ok(self.debyetemp_global);
        }
        Err(Error::calc(format!(
            "No Debye temperature available for atom role {}",
            index.0
        )))
    }

    /// Absorption cross section at 2200 m/s, in barn
    pub fn xsect_absorption(&self) -> Option<f64> {
        (self.xsect_absorption >= 0.0).then_some(self.xsect_absorption)
    }

    /// Saturated (free) scattering cross section, in barn
    pub fn xsect_free(&self) -> Option<f64> {
        (self.xsect_free >= 0.0).then_some(self.xsect_free)
    }

    pub fn provides_non_bragg_xsects(&self) -> bool {
        self.xsectprovider.is_some()
    }

    /// Non-Bragg scattering cross section at the given wavelength
    pub fn xsect_scat_non_bragg(&self, wavelength_aa: f64) -> Result<f64> {
        match &self.xsectprovider {
            Some(provider) => Ok(provider(wavelength_aa)),
            None => Err(Error::missing_info(
                "No non-Bragg cross section provider available",
            )),
        }
    }

    pub fn composition(&self) -> &[CompositionEntry] {
        &self.composition
    }

    // ------------------------------------------------------------------
    // Atom registry

    /// Number of registered atom roles
    pub fn atom_count(&self) -> usize {
        self.atom_datas.len()
    }

    pub fn atom_data_sp(&self, index: AtomIndex) -> Result<AtomDataSP> {
        self.atom_datas
            .get(index.0 as usize)
            .cloned()
            .ok_or_else(|| Error::logic(format!("Invalid atom index {}", index.0)))
    }

    pub fn indexed_atom_data(&self, index: AtomIndex) -> Result<IndexedAtomData> {
        Ok(IndexedAtomData {
            data: self.atom_data_sp(index)?,
            index,
        })
    }

    /// Unique display label of an atom role (assigned at sealing)
    pub fn display_label(&self, index: AtomIndex) -> Result<&str> {
        self.display_labels
            .get(index.0 as usize)
            .map(String::as_str)
            .ok_or_else(|| Error::logic(format!("Invalid atom index {}", index.0)))
    }

    // ------------------------------------------------------------------
    // Custom sections

    pub fn custom_sections(&self) -> &[(String, CustomSectionData)] {
        &self.custom_sections
    }

    pub fn count_custom_sections(&self, name: &str) -> usize {
        self.custom_sections.iter().filter(|(n, _)| n == name).count()
    }

    pub fn custom_section(&self, name: &str, index: usize) -> Result<&CustomSectionData> {
        self.custom_sections
            .iter()
            .filter(|(n, _)| n == name)
            .nth(index)
            .map(|(_, data)| data)
            .ok_or_else(|| {
                Error::missing_info(format!(
                    "Custom section \"{}\" (occurrence {}) not present",
                    name, index
                ))
            })
    }

    // ------------------------------------------------------------------
    // Derived geometry

    /// d-spacing of a Miller index from the structure info, via the
    /// triclinic reciprocal metric
    pub fn dspacing_from_hkl(&self, h: i32, k: i32, l: i32) -> Result<f64> {
        let structure = self
            .structure
            .as_ref()
            .ok_or_else(|| Error::missing_info("No structure info available"))?;
        if (h, k, l) == (0, 0, 0) {
            return Err(Error::calc("Can not compute d-spacing for hkl = (0,0,0)"));
        }
        dspacing_from_cell(
            h,
            k,
            l,
            structure.lattice_a,
            structure.lattice_b,
            structure.lattice_c,
            structure.alpha,
            structure.beta,
            structure.gamma,
        )
    }
}

impl Drop for Info {
    fn drop(&mut self) {
        let n = LIVE_INFO_COUNT.fetch_sub(1, Ordering::Relaxed) - 1;
        if *DEBUG_LEVEL >= 1 {
            log::debug!("Info object destroyed (live instances: {})", n);
        }
    }
}

/// Unit cell volume in cubic angstrom from lattice parameters (angles in
/// degrees)
pub fn cell_volume(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Result<f64> {
    let (ca, cb, cg) = (
        (alpha * K_DEG).cos(),
        (beta * K_DEG).cos(),
        (gamma * K_DEG).cos(),
    );
    let arg = 1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg;
    if !(arg > 0.0) {
        return Err(Error::calc("Degenerate unit cell parameters"));
    }
    Ok(a * b * c * arg.sqrt())
}

/// d-spacing of (h,k,l) in a cell given by lattice parameters (angles in
/// degrees)
#[allow(clippy::too_many_arguments)]
pub fn dspacing_from_cell(
    h: i32,
    k: i32,
    l: i32,
    a: f64,
    b: f64,
    c: f64,
    alpha: f64,
    beta: f64,
    gamma: f64,
) -> Result<f64> {
    let volume = cell_volume(a, b, c, alpha, beta, gamma)?;
    let (sa, sb, sg) = (
        (alpha * K_DEG).sin(),
        (beta * K_DEG).sin(),
        (gamma * K_DEG).sin(),
    );
    let (ca, cb, cg) = (
        (alpha * K_DEG).cos(),
        (beta * K_DEG).cos(),
        (gamma * K_DEG).cos(),
    );
    let (h, k, l) = (h as f64, k as f64, l as f64);
    let s11 = b * b * c * c * sa * sa;
    let s22 = a * a * c * c * sb * sb;
    let s33 = a * a * b * b * sg * sg;
    let s12 = a * b * c * c * (ca * cb - cg);
    let s23 = a * a * b * c * (cb * cg - ca);
    let s13 = a * b * b * c * (cg * ca - cb);
    let inv_d2 = (s11 * h * h
        + s22 * k * k
        + s33 * l * l
        + 2.0 * s12 * h * k
        + 2.0 * s23 * k * l
        + 2.0 * s13 * h * l)
        / (volume * volume);
    if !(inv_d2 > 0.0) || !inv_d2.is_finite() {
        return Err(Error::calc("Degenerate reciprocal metric"));
    }
    Ok(1.0 / inv_d2.sqrt())
}
