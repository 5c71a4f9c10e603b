/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Material info builder
//!
//! Turns a validated raw NCMAT record plus the decoded configuration
//! variables into a sealed [`Info`] object: atom roles are resolved against
//! the atom database (builtin defaults overlaid by file and configuration
//! override lines), densities and cross sections are derived from the
//! composition, dynamic-info blocks become their typed variants, and the
//! result is sealed.

use std::collections::HashMap;
use std::sync::Arc;

use crate::atoms::AtomDb;
use crate::cfg::MatCfg;
use crate::error::{Error, Result};
use crate::info::{
    cell_volume, AtomInfo, CompositionEntry, DiScatKnl, DynInfoCommon, DynamicInfo, Info,
    IndexedAtomData, SabBuildData, ScatKnlKind, StructureInfo, VdosData,
};
use crate::ncmat::{parse_ncmat, DensityUnit, RawDynInfoType, RawNcmatData};
use crate::stream::open_text_input;
use crate::utils::constants::{AMU_TO_G, K_INFINITY};
use crate::utils::thermal::debye_isotropic_msd;

/// Temperature assumed when neither the configuration nor the material
/// source dictates one, in kelvin
pub const DEFAULT_TEMPERATURE: f64 = 293.15;

/// d-spacing threshold substituted for `dcutoff=0` (automatic selection)
const DCUTOFF_AUTO_FALLBACK: f64 = 0.5;

/// Tolerance when reconciling dynamic-info fractions with unit cell counts
const FRACTION_CONSISTENCY_TOLERANCE: f64 = 1e-6;

/// Configuration variables consumed when loading NCMAT data
#[derive(Debug, Clone)]
pub struct NcmatLoadRequest {
    /// Material temperature in kelvin; -1 defers to the source (or the
    /// default)
    pub temp: f64,
    /// Lower d-spacing bound: 0 selects automatically, -1 disables HKL
    /// information
    pub dcutoff: f64,
    pub dcutoffup: f64,
    /// Atom database override lines from the configuration, applied after
    /// any `@ATOMDB` lines of the material source
    pub atomdb_lines: Vec<Vec<String>>,
}

impl Default for NcmatLoadRequest {
    fn default() -> Self {
        NcmatLoadRequest {
            temp: -1.0,
            dcutoff: 0.0,
            dcutoffup: K_INFINITY,
            atomdb_lines: Vec::new(),
        }
    }
}

impl NcmatLoadRequest {
    /// Extract the relevant variables from a configuration
    pub fn from_cfg(cfg: &MatCfg) -> Self {
        NcmatLoadRequest {
            temp: cfg.get_temp(),
            dcutoff: cfg.get_dcutoff(),
            dcutoffup: cfg.get_dcutoffup(),
            atomdb_lines: cfg.get_atomdb_parsed(),
        }
    }
}

/// Resolve a source name, parse it as NCMAT data and build a sealed info
/// object
pub fn load_ncmat(source_name: &str, request: &NcmatLoadRequest) -> Result<Info> {
    let stream = open_text_input(source_name)?;
    let data = parse_ncmat(stream)?;
    build_info(data, request)
}

fn bad(data: &RawNcmatData, msg: impl Into<String>) -> Error {
    Error::BadInput(crate::error::BadInput {
        message: msg.into(),
        source_descr: if data.source_full_descr.is_empty() {
            None
        } else {
            Some(data.source_full_descr.clone())
        },
        line: None,
    })
}

/// Build a sealed info object from raw material data and configuration
/// variables
pub fn build_info(mut data: RawNcmatData, request: &NcmatLoadRequest) -> Result<Info> {
    data.validate()?;
    let mut info = Info::new();

    let db = AtomDb::from_line_groups(&[&data.atomdb_lines, &request.atomdb_lines])
        .map_err(|e| bad(&data, e.message()))?;

    // Assign dense role indices in deterministic first-appearance order
    let mut role_names: Vec<String> = Vec::new();
    for (name, _) in &data.atompos {
        if !role_names.contains(name) {
            role_names.push(name.clone());
        }
    }
    for di in &data.dyninfos {
        if !role_names.contains(&di.element_name) {
            role_names.push(di.element_name.clone());
        }
    }
    let mut roles: HashMap<String, IndexedAtomData> = HashMap::new();
    for name in &role_names {
        let sp = db.lookup(name).map_err(|e| bad(&data, e.message()))?;
        let index = info.register_atom_data(Arc::clone(&sp))?;
        roles.insert(name.clone(), IndexedAtomData { data: sp, index });
    }

    // Temperature: an explicit configuration value wins, but must then be
    // consistent with any temperature a scattering kernel was tabulated at
    let mut kernel_temp: Option<f64> = None;
    for di in &data.dyninfos {
        if let Some(values) = di.fields.get("temperature") {
            let t = values[0];
            match kernel_temp {
                None => kernel_temp = Some(t),
                Some(prev) if (prev - t).abs() <= 1e-6 => {}
                Some(prev) => {
                    return Err(bad(
                        &data,
                        format!(
                            "Conflicting kernel temperatures in @DYNINFO sections ({} vs {})",
                            prev, t
                        ),
                    ))
                }
            }
        }
    }
    let temperature = if request.temp == -1.0 {
        kernel_temp.unwrap_or(DEFAULT_TEMPERATURE)
    } else {
        if let Some(kt) = kernel_temp {
            if (kt - request.temp).abs() > 1e-3 {
                return Err(bad(
                    &data,
                    format!(
                        "Requested temperature {} K is incompatible with the scattering \
                         kernel tabulated at {} K",
                        request.temp, kt
                    ),
                ));
            }
        }
        request.temp
    };
    info.set_temperature(temperature)?;

    if data.debyetemp_global > 0.0 {
        info.set_global_debye_temperature(data.debyetemp_global)?;
    }
    let per_element_debye: HashMap<&str, f64> = data
        .debyetemp_perelement
        .iter()
        .map(|(n, t)| (n.as_str(), *t))
        .collect();
    let debye_for = |name: &str| -> Option<f64> {
        per_element_debye
            .get(name)
            .copied()
            .or((data.debyetemp_global > 0.0).then_some(data.debyetemp_global))
    };

    // Composition and bulk quantities
    let mut composition: Vec<CompositionEntry> = Vec::new();
    if data.has_atompos() {
        let mut counts: HashMap<&str, u32> = HashMap::new();
        let mut positions: HashMap<&str, Vec<[f64; 3]>> = HashMap::new();
        for (name, pos) in &data.atompos {
            *counts.entry(name.as_str()).or_insert(0) += 1;
            positions.entry(name.as_str()).or_default().push(*pos);
        }
        let n_total = data.atompos.len() as f64;

        let lengths = data.cell.lengths.expect("validated cell");
        let angles = data.cell.angles.expect("validated cell");
        let volume = cell_volume(
            lengths[0], lengths[1], lengths[2], angles[0], angles[1], angles[2],
        )
        .map_err(|e| bad(&data, e.message()))?;
        info.set_structure(StructureInfo {
            spacegroup: data.spacegroup,
            lattice_a: lengths[0],
            lattice_b: lengths[1],
            lattice_c: lengths[2],
            alpha: angles[0],
            beta: angles[1],
            gamma: angles[2],
            volume,
            n_atoms: data.atompos.len() as u32,
        })?;

        let mut mean_mass = 0.0;
        for name in &role_names {
            if let Some(&count) = counts.get(name.as_str()) {
                let role = &roles[name];
                let fraction = count as f64 / n_total;
                mean_mass += fraction * role.data.mass_amu();
                composition.push(CompositionEntry {
                    fraction,
                    atom: role.clone(),
                });
            }
        }

        let numberdensity = n_total / volume;
        info.set_number_density(numberdensity)?;
        // atoms/Aa^3 * amu -> g/cm^3
        info.set_density(numberdensity * mean_mass * AMU_TO_G * 1e24)?;

        for name in &role_names {
            let count = match counts.get(name.as_str()) {
                Some(&c) => c,
                None => continue,
            };
            let role = &roles[name];
            let debye_temp = debye_for(name).unwrap_or(0.0);
            let msd = if debye_temp > 0.0 {
                debye_isotropic_msd(debye_temp, temperature, role.data.mass_amu())
                    .map_err(|e| bad(&data, e.message()))?
            } else {
                0.0
            };
            info.add_atom(AtomInfo {
                atom: role.clone(),
                number_per_unit_cell: count,
                debye_temp,
                positions: positions.remove(name.as_str()).unwrap_or_default(),
                mean_square_displacement: msd,
            })?;
        }

        // Dynamic fractions must agree with the unit cell contents
        for di in &data.dyninfos {
            let count = counts.get(di.element_name.as_str()).ok_or_else(|| {
                bad(
                    &data,
                    format!(
                        "@DYNINFO element \"{}\" has no atom positions in the unit cell",
                        di.element_name
                    ),
                )
            })?;
            let expected = *count as f64 / n_total;
            if (di.fraction - expected).abs() > FRACTION_CONSISTENCY_TOLERANCE {
                return Err(bad(
                    &data,
                    format!(
                        "@DYNINFO fraction {} of element \"{}\" is inconsistent with its \
                         unit cell count (expected {})",
                        di.fraction, di.element_name, expected
                    ),
                ));
            }
        }

        if request.dcutoff != -1.0 {
            let dlower = if request.dcutoff == 0.0 {
                DCUTOFF_AUTO_FALLBACK
            } else {
                request.dcutoff
            };
            info.enable_hkl_info(dlower, request.dcutoffup)?;
        }
    } else {
        // Non-crystalline: composition and density come from the dynamic
        // info fractions and the @DENSITY section
        let mut mean_mass = 0.0;
        for di in &data.dyninfos {
            let role = &roles[&di.element_name];
            mean_mass += di.fraction * role.data.mass_amu();
            composition.push(CompositionEntry {
                fraction: di.fraction,
                atom: role.clone(),
            });
        }
        let (density_gcm3, numberdensity) = match data.density_unit {
            DensityUnit::AtomsPerAa3 => {
                let nd = data.density;
                (nd * mean_mass * AMU_TO_G * 1e24, nd)
            }
            DensityUnit::KgPerM3 => {
                let rho = data.density / 1000.0;
                (rho, rho / (mean_mass * AMU_TO_G * 1e24))
            }
        };
        info.set_density(density_gcm3)?;
        info.set_number_density(numberdensity)?;
    }

    // Scalar cross sections from the composition
    let mut xs_abs = 0.0;
    let mut xs_free = 0.0;
    for entry in &composition {
        xs_abs += entry.fraction * entry.atom.data.absorption_xs_barn();
        xs_free += entry.fraction * entry.atom.data.free_scattering_xs_barn();
    }
    info.set_xsect_absorption(xs_abs)?;
    info.set_xsect_free(xs_free)?;

    // Dynamic info conversion, or synthesis from Debye temperatures when a
    // crystal provides none
    if data.has_dyninfo() {
        for di in &data.dyninfos {
            let common = DynInfoCommon {
                fraction: di.fraction,
                atom: roles[&di.element_name].clone(),
                temperature,
            };
            let energy_grid = di.fields.get("egrid").map(|v| Arc::new(v.clone()));
            let converted = match di.dyninfo_type {
                RawDynInfoType::Sterile => DynamicInfo::Sterile(common),
                RawDynInfoType::FreeGas => DynamicInfo::FreeGas(common),
                RawDynInfoType::ScatKnl => {
                    let alphagrid = di.fields.get("alphagrid").expect("validated").clone();
                    let betagrid = di.fields.get("betagrid").expect("validated").clone();
                    let (raw, scaled) = match di.fields.get("sab") {
                        Some(k) => (k.clone(), false),
                        None => (
                            di.fields.get("sab_scaled").expect("validated").clone(),
                            true,
                        ),
                    };
                    DynamicInfo::ScatKnl(DiScatKnl {
                        common,
                        kind: ScatKnlKind::Direct(SabBuildData::new(
                            alphagrid,
                            betagrid,
                            raw,
                            scaled,
                            temperature,
                        )?),
                        energy_grid,
                    })
                }
                RawDynInfoType::Vdos => {
                    let egrid = di.fields.get("vdos_egrid").expect("validated");
                    DynamicInfo::ScatKnl(DiScatKnl {
                        common,
                        kind: ScatKnlKind::Vdos(VdosData {
                            egrid_range: (egrid[0], egrid[1]),
                            density: di.fields.get("vdos_density").expect("validated").clone(),
                        }),
                        energy_grid,
                    })
                }
                RawDynInfoType::VdosDebye => {
                    let debye_temperature = debye_for(&di.element_name).ok_or_else(|| {
                        bad(
                            &data,
                            format!(
                                "@DYNINFO type vdosdebye for element \"{}\" requires a Debye \
                                 temperature",
                                di.element_name
                            ),
                        )
                    })?;
                    DynamicInfo::ScatKnl(DiScatKnl {
                        common,
                        kind: ScatKnlKind::VdosDebye { debye_temperature },
                        energy_grid,
                    })
                }
                RawDynInfoType::Undefined => unreachable!("rejected by validation"),
            };
            info.add_dyn_info(converted)?;
        }
    } else if data.has_atompos() {
        let all_have_debye = composition
            .iter()
            .zip(&role_names)
            .all(|(_, name)| debye_for(name).is_some());
        if all_have_debye {
            for (entry, name) in composition.iter().zip(&role_names) {
                let debye_temperature = debye_for(name).expect("checked above");
                info.add_dyn_info(DynamicInfo::ScatKnl(DiScatKnl {
                    common: DynInfoCommon {
                        fraction: entry.fraction,
                        atom: entry.atom.clone(),
                        temperature,
                    },
                    kind: ScatKnlKind::VdosDebye { debye_temperature },
                    energy_grid: None,
                }))?;
            }
        }
    }

    info.set_composition(composition)?;
    info.set_custom_sections(std::mem::take(&mut data.custom_sections))?;

    info.seal()?;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::stream_from_buffer;

    const AL_FCC: &str = "NCMAT v2\n\
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

    fn build_al(request: &NcmatLoadRequest) -> Info {
        let data = parse_ncmat(stream_from_buffer("Al.ncmat", AL_FCC)).unwrap();
        build_info(data, request).unwrap()
    }

    #[test]
    fn test_minimal_v2_aluminium() {
        let info = build_al(&NcmatLoadRequest::default());
        assert!(info.is_sealed());
        let structure = info.structure_info().unwrap();
        assert_eq!(structure.spacegroup, 225);
        assert_eq!(structure.n_atoms, 4);
        let atoms = info.atom_list();
        assert_eq!(atoms.len(), 1);
        assert_eq!(atoms[0].number_per_unit_cell, 4);
        assert_eq!(atoms[0].debye_temp, 410.0);
        assert_eq!(atoms[0].positions.len(), 4);
        assert!(atoms[0].mean_square_displacement > 0.0);
        assert_eq!(info.temperature().unwrap(), DEFAULT_TEMPERATURE);
        // Al fcc density is about 2.7 g/cm3
        let density = info.density().unwrap();
        assert!((density - 2.7).abs() < 0.05, "density = {}", density);
        assert_eq!(info.composition().len(), 1);
        assert!((info.composition()[0].fraction - 1.0).abs() < 1e-12);
        assert!(info.xsect_absorption().unwrap() > 0.0);
    }

    #[test]
    fn test_explicit_temperature() {
        let request = NcmatLoadRequest {
            temp: 77.0,
            ..Default::default()
        };
        let info = build_al(&request);
        assert_eq!(info.temperature().unwrap(), 77.0);
    }

    #[test]
    fn test_dyninfo_synthesized_from_debye() {
        let info = build_al(&NcmatLoadRequest::default());
        assert_eq!(info.dyn_info_list().len(), 1);
        match &info.dyn_info_list()[0] {
            DynamicInfo::ScatKnl(knl) => match knl.kind {
                ScatKnlKind::VdosDebye { debye_temperature } => {
                    assert_eq!(debye_temperature, 410.0)
                }
                _ => panic!("expected vdosdebye"),
            },
            _ => panic!("expected scatknl"),
        }
    }

    #[test]
    fn test_hkl_bounds_follow_dcutoff() {
        let request = NcmatLoadRequest {
            dcutoff: 0.8,
            dcutoffup: 5.0,
            ..Default::default()
        };
        let info = build_al(&request);
        assert!(info.has_hkl_info());
        assert_eq!(info.hkl_dlower(), 0.8);
        assert_eq!(info.hkl_dupper(), 5.0);
        let request = NcmatLoadRequest {
            dcutoff: -1.0,
            ..Default::default()
        };
        let info = build_al(&request);
        assert!(!info.has_hkl_info());
    }

    #[test]
    fn test_non_crystalline_freegas() {
        let content = "NCMAT v2\n\
                       @DYNINFO\n\
                       element He\n\
                       fraction 1.0\n\
                       type freegas\n\
                       @DENSITY\n\
                       0.17 g_per_cm3\n";
        let data = parse_ncmat(stream_from_buffer("He.ncmat", content)).unwrap();
        let info = build_info(data, &NcmatLoadRequest::default()).unwrap();
        assert!(!info.is_crystalline());
        assert!((info.density().unwrap() - 0.17).abs() < 1e-12);
        let nd = info.number_density().unwrap();
        // 0.17 g/cm3 of He-4 is about 0.0256 atoms/Aa3
        assert!((nd - 0.0256).abs() < 0.001, "nd = {}", nd);
        assert!(matches!(info.dyn_info_list()[0], DynamicInfo::FreeGas(_)));
    }

    #[test]
    fn test_atomdb_override_changes_data() {
        let request = NcmatLoadRequest {
            atomdb_lines: vec![
                vec![
                    "Al".to_string(),
                    "26.98u".to_string(),
                    "5.0fm".to_string(),
                    "0.0082b".to_string(),
                    "0.231b".to_string(),
                ],
            ],
            ..Default::default()
        };
        let info = build_al(&request);
        let atom = &info.atom_list()[0].atom;
        assert!((atom.data.coh_scat_len_fm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_dyninfo_fraction_must_match_cell() {
        let content = "NCMAT v2\n\
                       @CELL\n\
                       lengths 3 3 3\n\
                       angles 90 90 90\n\
                       @ATOMPOSITIONS\n\
                       Al 0 0 0\n\
                       Fe 1/2 1/2 1/2\n\
                       @DEBYETEMPERATURE\n\
                       400\n\
                       @DYNINFO\n\
                       element Al\n\
                       fraction 0.7\n\
                       type freegas\n\
                       @DYNINFO\n\
                       element Fe\n\
                       fraction 0.3\n\
                       type freegas\n";
        let data = parse_ncmat(stream_from_buffer("bad.ncmat", content)).unwrap();
        assert!(build_info(data, &NcmatLoadRequest::default()).is_err());
    }

    #[test]
    fn test_kernel_temperature_conflict() {
        let content = "NCMAT v2\n\
                       @DYNINFO\n\
                       element Al\n\
                       fraction 1.0\n\
                       type scatknl\n\
                       temperature 600\n\
                       alphagrid 0.1 0.2\n\
                       betagrid -1.0 0.0\n\
                       sab 1 2 3 4\n\
                       @DENSITY\n\
                       2.7 g_per_cm3\n";
        let data = parse_ncmat(stream_from_buffer("knl.ncmat", content)).unwrap();
        let info = build_info(data.clone(), &NcmatLoadRequest::default()).unwrap();
        assert_eq!(info.temperature().unwrap(), 600.0);
        let request = NcmatLoadRequest {
            temp: 300.0,
            ..Default::default()
        };
        assert!(build_info(data, &request).is_err());
    }
}
