/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Command line interface
//!
//! Inspects a material source: parses the configuration string, builds the
//! info object through the factory registry and prints a human-readable
//! summary.

use crate::factory;
use crate::info::{DynamicInfo, Info, ScatKnlKind};
use crate::MatCfg;

/// Run the inspection for one configuration string
pub fn run(cfg_string: &str) -> anyhow::Result<()> {
    factory::register_ncmat_factory();
    let cfg = MatCfg::new(cfg_string)?;
    println!("{}", cfg);
    let info = factory::create_info(&cfg)?;
    print!("{}", dump_info(&info));
    Ok(())
}

/// Render a human-readable summary of a sealed info object
pub fn dump_info(info: &Info) -> String {
    let mut out = String::new();
    out.push_str(&format!("Info (unique id {})\n", info.unique_id()));
    if let Some(s) = info.structure_info() {
        out.push_str(&format!(
            "  structure: spacegroup {}, a={} b={} c={} Aa, alpha={} beta={} gamma={} deg, \
             volume={:.4} Aa^3, {} atoms/cell\n",
            s.spacegroup, s.lattice_a, s.lattice_b, s.lattice_c, s.alpha, s.beta, s.gamma,
            s.volume, s.n_atoms
        ));
    }
    if let Some(t) = info.temperature() {
        out.push_str(&format!("  temperature: {} K\n", t));
    }
    if let Some(d) = info.density() {
        out.push_str(&format!("  density: {:.6} g/cm3\n", d));
    }
    if let Some(nd) = info.number_density() {
        out.push_str(&format!("  number density: {:.6} atoms/Aa^3\n", nd));
    }
    if let Some(xs) = info.xsect_absorption() {
        out.push_str(&format!("  absorption xs: {:.6} barn\n", xs));
    }
    if let Some(xs) = info.xsect_free() {
        out.push_str(&format!("  free scattering xs: {:.6} barn\n", xs));
    }
    for atom_info in info.atom_list() {
        let label = info
            .display_label(atom_info.atom.index)
            .unwrap_or("?")
            .to_string();
        out.push_str(&format!(
            "  atom {}: {} per cell, debye temp {} K, msd {:.6} Aa^2\n",
            label,
            atom_info.number_per_unit_cell,
            atom_info.debye_temp,
            atom_info.mean_square_displacement
        ));
    }
    for entry in info.composition() {
        let label = info
            .display_label(entry.atom.index)
            .unwrap_or("?")
            .to_string();
        out.push_str(&format!(
            "  composition: {:.6} {}\n",
            entry.fraction, label
        ));
    }
    for di in info.dyn_info_list() {
        let label = info.display_label(di.atom().index).unwrap_or("?").to_string();
        let kind = match di {
            DynamicInfo::Sterile(_) => "sterile".to_string(),
            DynamicInfo::FreeGas(_) => "freegas".to_string(),
            DynamicInfo::ScatKnl(knl) => match &knl.kind {
                ScatKnlKind::Direct(_) => "scatknl".to_string(),
                ScatKnlKind::Vdos(_) => "vdos".to_string(),
                ScatKnlKind::VdosDebye { debye_temperature } => {
                    format!("vdosdebye ({} K)", debye_temperature)
                }
            },
        };
        out.push_str(&format!(
            "  dyninfo {}: fraction {:.6}, {}\n",
            label,
            di.fraction(),
            kind
        ));
    }
    if info.has_hkl_info() {
        out.push_str(&format!(
            "  hkl info enabled for d-spacings in [{}, {}] Aa ({} entries)\n",
            info.hkl_dlower(),
            info.hkl_dupper(),
            info.hkl_list().len()
        ));
    }
    for (tag, lines) in info.custom_sections() {
        out.push_str(&format!("  custom section {}: {} lines\n", tag, lines.len()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::builder::{build_info, NcmatLoadRequest};
    use crate::ncmat::parse_ncmat;
    use crate::stream::stream_from_buffer;

    #[test]
    fn test_dump_contains_key_facts() {
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
        let data = parse_ncmat(stream_from_buffer("Al.ncmat", content)).unwrap();
        let info = build_info(data, &NcmatLoadRequest::default()).unwrap();
        let dump = dump_info(&info);
        assert!(dump.contains("spacegroup 225"));
        assert!(dump.contains("atom Al: 4 per cell"));
        assert!(dump.contains("debye temp 410"));
    }
}
