use std::sync::Arc;

use approx::assert_relative_eq;
use ncmat_rs::atoms::builtin_atom_data;
use ncmat_rs::info::builder::{build_info, NcmatLoadRequest};
use ncmat_rs::info::{DynamicInfo, HklInfo, Info, ScatKnlKind};
use ncmat_rs::ncmat::parse_ncmat;
use ncmat_rs::stream::stream_from_buffer;

const AL_V2: &str = "NCMAT v2\n\
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

fn build(content: &str, request: &NcmatLoadRequest) -> Info {
    let data = parse_ncmat(stream_from_buffer("test.ncmat", content)).unwrap();
    build_info(data, request).unwrap()
}

#[test]
fn test_sealed_aluminium_summary() {
    let info = build(AL_V2, &NcmatLoadRequest::default());
    assert!(info.is_sealed());
    assert!(info.is_crystalline());
    let structure = info.structure_info().unwrap();
    assert_eq!(structure.spacegroup, 225);
    assert_eq!(structure.n_atoms, 4);
    assert_relative_eq!(structure.volume, 4.04958f64.powi(3), max_relative = 1e-12);
    assert_eq!(info.atom_list().len(), 1);
    assert_eq!(info.atom_list()[0].number_per_unit_cell, 4);
    assert_eq!(info.atom_list()[0].debye_temp, 410.0);
    assert_eq!(info.display_label(info.atom_list()[0].atom.index).unwrap(), "Al");
}

#[test]
fn test_dspacing_from_structure() {
    let info = build(AL_V2, &NcmatLoadRequest::default());
    let a = 4.04958;
    assert_relative_eq!(
        info.dspacing_from_hkl(1, 1, 1).unwrap(),
        a / 3f64.sqrt(),
        max_relative = 1e-12
    );
    assert!(info.dspacing_from_hkl(0, 0, 0).is_err());
}

#[test]
fn test_hkl_list_sorted_at_seal() {
    let mut info = Info::new();
    let al = Arc::new(builtin_atom_data("Al").unwrap());
    info.register_atom_data(al).unwrap();
    info.enable_hkl_info(0.5, 10.0).unwrap();
    for (d, h) in [(1.0, 3), (2.34, 1), (1.43, 2), (2.34, 0)] {
        info.add_hkl(HklInfo {
            dspacing: d,
            fsquared: 1.0,
            h,
            k: 0,
            l: 0,
            multiplicity: 8,
        })
        .unwrap();
    }
    info.seal().unwrap();
    let dspacings: Vec<f64> = info.hkl_list().iter().map(|x| x.dspacing).collect();
    assert_eq!(dspacings, vec![2.34, 2.34, 1.43, 1.0]);
    // Ties broken by Miller indices, ascending
    assert_eq!(info.hkl_list()[0].h, 0);
    assert_eq!(info.hkl_list()[1].h, 1);
}

#[test]
fn test_atom_list_sorted_by_z_descending() {
    let content = "NCMAT v2\n\
                   @CELL\n\
                   lengths 5.64 5.64 5.64\n\
                   angles 90 90 90\n\
                   @SPACEGROUP\n\
                   225\n\
                   @ATOMPOSITIONS\n\
                   Na 0 0 0\n\
                   Cl 1/2 1/2 1/2\n\
                   @DEBYETEMPERATURE\n\
                   Na 150\n\
                   Cl 180\n";
    let info = build(content, &NcmatLoadRequest::default());
    let z_values: Vec<u32> = info
        .atom_list()
        .iter()
        .map(|a| a.atom.data.z())
        .collect();
    assert_eq!(z_values, vec![17, 11]);
    assert_eq!(info.composition().len(), 2);
    let total: f64 = info.composition().iter().map(|c| c.fraction).sum();
    assert_relative_eq!(total, 1.0, max_relative = 1e-12);
}

#[test]
fn test_display_labels_injective() {
    let content = "NCMAT v3\n\
                   @CELL\n\
                   lengths 4 4 4\n\
                   angles 90 90 90\n\
                   @ATOMPOSITIONS\n\
                   H 0 0 0\n\
                   2H 1/2 1/2 1/2\n\
                   @DEBYETEMPERATURE\n\
                   500\n";
    let info = build(content, &NcmatLoadRequest::default());
    let mut labels = Vec::new();
    for i in 0..info.atom_count() {
        labels.push(
            info.display_label(ncmat_rs::info::AtomIndex(i as u32))
                .unwrap()
                .to_string(),
        );
    }
    let mut unique = labels.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), labels.len(), "labels not unique: {:?}", labels);
}

#[test]
fn test_unique_ids_strictly_increase() {
    let a = build(AL_V2, &NcmatLoadRequest::default());
    let b = build(AL_V2, &NcmatLoadRequest::default());
    assert!(b.unique_id() > a.unique_id());
}

#[test]
fn test_number_density_and_density_consistent() {
    let info = build(AL_V2, &NcmatLoadRequest::default());
    let nd = info.number_density().unwrap();
    assert_relative_eq!(nd, 4.0 / 4.04958f64.powi(3), max_relative = 1e-12);
    let density = info.density().unwrap();
    // rho = n * m * amu-to-gram * 1e24
    assert_relative_eq!(
        density,
        nd * 26.9815385 * 1.66053906660,
        max_relative = 1e-9
    );
}

#[test]
fn test_msd_reasonable_for_room_temperature_al() {
    let info = build(AL_V2, &NcmatLoadRequest::default());
    let msd = info.atom_list()[0].mean_square_displacement;
    assert!(msd > 0.003 && msd < 0.03, "msd = {}", msd);
}

#[test]
fn test_scatknl_lazy_kernel_build() {
    let content = "NCMAT v2\n\
                   @DYNINFO\n\
                   element H\n\
                   fraction 1.0\n\
                   type scatknl\n\
                   alphagrid 0.1 0.5 1.0\n\
                   betagrid -2.0 0.0 2.0\n\
                   sab_scaled 0.1 0.2 0.3\n\
                   0.4 0.5 0.6\n\
                   0.7 0.8 0.9\n\
                   @DENSITY\n\
                   0.07 g_per_cm3\n";
    let info = build(content, &NcmatLoadRequest::default());
    let knl = match &info.dyn_info_list()[0] {
        DynamicInfo::ScatKnl(knl) => knl,
        other => panic!("expected scatknl, got {:?}", other),
    };
    let direct = match &knl.kind {
        ScatKnlKind::Direct(direct) => direct,
        other => panic!("expected direct kernel, got {:?}", other),
    };
    assert!(!direct.has_built_sab());
    let sab = direct.ensure_build_then_sab().unwrap();
    assert!(direct.has_built_sab());
    // Unscaling applied: S(0,0) = 0.1 * exp(1)
    assert_relative_eq!(sab.value_at(0, 0), 0.1 * 1f64.exp(), max_relative = 1e-12);
    assert_relative_eq!(sab.value_at(0, 1), 0.4, max_relative = 1e-12);
    let again = direct.ensure_build_then_sab().unwrap();
    assert!(Arc::ptr_eq(&sab, &again));
}

#[test]
fn test_scatknl_kernel_build_shared_across_threads() {
    let content = "NCMAT v2\n\
                   @DYNINFO\n\
                   element H\n\
                   fraction 1.0\n\
                   type scatknl\n\
                   alphagrid 0.1 0.5\n\
                   betagrid -1.0 1.0\n\
                   sab 1 2 3 4\n\
                   @DENSITY\n\
                   0.07 g_per_cm3\n";
    let info = build(content, &NcmatLoadRequest::default());
    let direct = match &info.dyn_info_list()[0] {
        DynamicInfo::ScatKnl(knl) => match &knl.kind {
            ScatKnlKind::Direct(direct) => direct,
            _ => panic!("expected direct kernel"),
        },
        _ => panic!("expected scatknl"),
    };
    let results: Vec<Arc<ncmat_rs::info::SabData>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| direct.ensure_build_then_sab().unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for pair in results.windows(2) {
        assert!(Arc::ptr_eq(&pair[0], &pair[1]));
    }
}

#[test]
fn test_custom_sections_preserved() {
    let content = "NCMAT v3\n\
                   @CELL\n\
                   lengths 4 4 4\n\
                   angles 90 90 90\n\
                   @ATOMPOSITIONS\n\
                   Al 0 0 0\n\
                   @DEBYETEMPERATURE\n\
                   410\n\
                   @CUSTOM_EXTRA\n\
                   alpha beta 1.5\n\
                   gamma\n";
    let info = build(content, &NcmatLoadRequest::default());
    assert_eq!(info.count_custom_sections("EXTRA"), 1);
    let section = info.custom_section("EXTRA", 0).unwrap();
    assert_eq!(section.len(), 2);
    assert_eq!(section[0], vec!["alpha", "beta", "1.5"]);
    assert!(info.custom_section("EXTRA", 1).is_err());
    assert!(info.custom_section("MISSING", 0).is_err());
}

#[test]
fn test_v1_material_still_loads() {
    let content = "NCMAT v1\n\
                   @CELL\n\
                   lengths 4.04958 4.04958 4.04958\n\
                   angles 90 90 90\n\
                   @SPACEGROUP\n\
                   225\n\
                   @ATOMPOSITIONS\n\
                   Al 0 0 0\n\
                   Al 0 0.5 0.5\n\
                   Al 0.5 0 0.5\n\
                   Al 0.5 0.5 0\n\
                   @DEBYETEMPERATURE\n\
                   Al 410\n";
    let info = build(content, &NcmatLoadRequest::default());
    assert_eq!(info.atom_list()[0].number_per_unit_cell, 4);
    assert_eq!(info.structure_info().unwrap().spacegroup, 225);
}

#[test]
fn test_global_debye_temperature_exposed() {
    let content = "NCMAT v2\n\
                   @CELL\n\
                   lengths 4 4 4\n\
                   angles 90 90 90\n\
                   @ATOMPOSITIONS\n\
                   Al 0 0 0\n\
                   @DEBYETEMPERATURE\n\
                   410\n";
    let info = build(content, &NcmatLoadRequest::default());
    assert_eq!(info.global_debye_temperature().unwrap(), 410.0);
    let index = info.atom_list()[0].atom.index;
    assert_eq!(info.debye_temperature_by_element(index).unwrap(), 410.0);
}
