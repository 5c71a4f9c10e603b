use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use ncmat_rs::{AccessSpy, MatCfg};
use tempfile::tempdir;

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

fn cfg_with_pars(pars: &str) -> MatCfg {
    MatCfg::from_buffer("Al.ncmat", AL_V2, pars).unwrap()
}

#[test]
fn test_defaults() {
    let cfg = cfg_with_pars("");
    assert_eq!(cfg.get_temp(), -1.0);
    assert_eq!(cfg.get_dcutoff(), 0.0);
    assert!(cfg.get_dcutoffup().is_infinite());
    assert_eq!(cfg.get_packfact(), 1.0);
    assert_eq!(cfg.get_mosprec(), 1e-3);
    assert_eq!(cfg.get_sccutoff(), 0.4);
    assert_eq!(cfg.get_dirtol(), 1e-4);
    assert!(cfg.get_coh_elas());
    assert!(cfg.get_incoh_elas());
    assert_eq!(cfg.get_inelas(), "auto");
    assert_eq!(cfg.get_vdoslux(), 3);
    assert_eq!(cfg.get_lcmode(), 0);
    assert_eq!(cfg.get_infofactory(), "");
    assert!(cfg.get_mos().is_err());
    assert!(cfg.get_dir1().is_err());
    assert!(cfg.get_lcaxis().is_err());
    assert_eq!(cfg.get_datafile_extension(), "ncmat");
    assert!(cfg.check_consistency().is_ok());
}

#[test]
fn test_units() {
    // temp=20C, dcutoff in Aa, mos in arcmin
    let cfg = cfg_with_pars("temp=20C;dcutoff=0.5Aa;mos=30arcmin;dir1=@crys_hkl:0,0,1@lab:0,0,1;dir2=@crys_hkl:0,1,0@lab:0,1,0");
    assert_relative_eq!(cfg.get_temp(), 293.15, max_relative = 1e-12);
    assert_relative_eq!(cfg.get_dcutoff(), 0.5, max_relative = 1e-12);
    assert_relative_eq!(
        cfg.get_mos().unwrap(),
        0.00872664625997,
        max_relative = 1e-10
    );
    assert!(cfg.check_consistency().is_ok());
}

#[test]
fn test_unit_idempotence_via_roundtrip() {
    let cfg = cfg_with_pars("temp=20C;mos=60arcmin;dir1=@crys:1,0,0@lab:1,0,0;dir2=@crys:0,1,0@lab:0,1,0");
    assert_relative_eq!(cfg.get_temp(), 293.15, max_relative = 1e-12);
    assert_relative_eq!(
        cfg.get_mos().unwrap(),
        60.0 * std::f64::consts::PI / 10800.0,
        max_relative = 1e-12
    );
    // The original spelling survives serialization
    let s = cfg.to_str_cfg(false, None);
    assert!(s.contains("temp=20C"), "{}", s);
    assert!(s.contains("mos=60arcmin"), "{}", s);
}

#[test]
fn test_to_str_cfg_alphabetical_and_deterministic() {
    let cfg = cfg_with_pars("vdoslux=2;temp=300K;coh_elas=false;dcutoff=0.4");
    let s = cfg.to_str_cfg(false, None);
    assert_eq!(s, "coh_elas=false;dcutoff=0.4;temp=300K;vdoslux=2");
    let cfg2 = cfg_with_pars("coh_elas=false;dcutoff=0.4;temp=300K;vdoslux=2");
    assert_eq!(cfg2.to_str_cfg(false, None), s);
}

#[test]
fn test_round_trip_equivalence() {
    let original =
        cfg_with_pars("temp=20C;dcutoff=0.5Aa;vdoslux=1;inelas=none;packfact=0.9");
    let serialized = original.to_str_cfg(false, None);
    let reparsed = cfg_with_pars(&serialized);
    assert_eq!(original.get_temp(), reparsed.get_temp());
    assert_eq!(original.get_dcutoff(), reparsed.get_dcutoff());
    assert_eq!(original.get_vdoslux(), reparsed.get_vdoslux());
    assert_eq!(original.get_inelas(), reparsed.get_inelas());
    assert_eq!(original.get_packfact(), reparsed.get_packfact());
    assert_eq!(reparsed.to_str_cfg(false, None), serialized);
}

#[test]
fn test_include_datafile_serialization() {
    let cfg = cfg_with_pars("temp=300K");
    let s = cfg.to_str_cfg(true, None);
    assert_eq!(s, "Al.ncmat;temp=300K");
    assert_eq!(cfg.to_embeddable_cfg(), "NCRYSTALMATCFG[temp=300K]");
}

#[test]
fn test_only_parnames_filter() {
    let cfg = cfg_with_pars("temp=300K;vdoslux=2;dcutoff=0.4");
    let only: BTreeSet<String> = ["temp", "vdoslux"].iter().map(|s| s.to_string()).collect();
    assert_eq!(cfg.to_str_cfg(false, Some(&only)), "temp=300K;vdoslux=2");
}

#[test]
fn test_cache_signature() {
    let cfg = cfg_with_pars("temp=300K");
    let names: BTreeSet<String> = ["dcutoff", "temp"].iter().map(|s| s.to_string()).collect();
    let sig = cfg.cache_signature(&names).unwrap();
    assert!(sig.starts_with("dcutoff=<>;temp="), "{}", sig);
    // High precision form, not the user spelling
    assert!(!sig.contains("300K"), "{}", sig);
    let bad: BTreeSet<String> = ["nosuch"].iter().map(|s| s.to_string()).collect();
    assert!(cfg.cache_signature(&bad).is_err());
}

#[test]
fn test_cow_isolation() {
    let mut h1 = cfg_with_pars("temp=300K");
    let h2 = h1.clone();
    h1.set_temp(77.0).unwrap();
    assert_eq!(h1.get_temp(), 77.0);
    assert_eq!(h2.get_temp(), 300.0);
    // And the other direction: the original keeps its view when the clone
    // changes
    let mut h3 = h2.clone();
    h3.apply_str_cfg("temp=600K").unwrap();
    assert_eq!(h2.get_temp(), 300.0);
    assert_eq!(h3.get_temp(), 600.0);
}

#[test]
fn test_aliases() {
    let cfg = cfg_with_pars("bragg=false");
    assert!(!cfg.get_coh_elas());
    assert!(cfg.get_incoh_elas());

    let cfg = cfg_with_pars("elas=0");
    assert!(!cfg.get_coh_elas());
    assert!(!cfg.get_incoh_elas());

    let cfg = cfg_with_pars("bkgd=none");
    assert!(!cfg.get_incoh_elas());
    assert_eq!(cfg.get_inelas(), "none");
    let cfg = cfg_with_pars("bkgd=0");
    assert_eq!(cfg.get_inelas(), "none");
    assert!(MatCfg::from_buffer("Al.ncmat", AL_V2, "bkgd=external").is_err());
}

#[test]
fn test_inelas_normalisation() {
    for alias in ["none", "0", "sterile", "false"] {
        let cfg = cfg_with_pars(&format!("inelas={}", alias));
        assert_eq!(cfg.get_inelas(), "none");
    }
    let cfg = cfg_with_pars("inelas=freegas");
    assert_eq!(cfg.get_inelas(), "freegas");
}

#[test]
fn test_forbidden_characters() {
    assert!(MatCfg::from_buffer("Al.ncmat", AL_V2, "temp=(300)").is_err());
    assert!(MatCfg::from_buffer("Al.ncmat", AL_V2, "inelas=a|b").is_err());
    assert!(MatCfg::from_buffer("Al.ncmat", AL_V2, "temp=300Kå").is_err());
}

#[test]
fn test_bad_syntax() {
    assert!(MatCfg::from_buffer("Al.ncmat", AL_V2, "temp").is_err());
    assert!(MatCfg::from_buffer("Al.ncmat", AL_V2, "temp=1=2").is_err());
    assert!(MatCfg::from_buffer("Al.ncmat", AL_V2, "=300").is_err());
    assert!(MatCfg::from_buffer("Al.ncmat", AL_V2, "nosuchpar=1").is_err());
    // Empty parts are tolerated
    assert!(MatCfg::from_buffer("Al.ncmat", AL_V2, "temp=300K;;").is_ok());
}

#[test]
fn test_suboptions() {
    let cfg = cfg_with_pars("infofactory=stdncmat:expandhkl:tol@0.01");
    assert_eq!(cfg.get_infofact_name(), "stdncmat");
    assert!(cfg.get_infofactopt_flag("expandhkl").unwrap());
    assert!(!cfg.get_infofactopt_flag("other").unwrap());
    assert_relative_eq!(
        cfg.get_infofactopt_dbl("tol", 1.0).unwrap(),
        0.01,
        max_relative = 1e-12
    );
    assert!(cfg.infofactopt_validate(&["expandhkl", "tol"]).is_ok());
    assert!(cfg.infofactopt_validate(&["expandhkl"]).is_err());
    // Duplicated options are rejected at consistency time
    let cfg = cfg_with_pars("infofactory=fact:a@1:a@2");
    assert!(cfg.check_consistency().is_err());
}

#[test]
fn test_consistency_ranges() {
    assert!(cfg_with_pars("temp=-5").check_consistency().is_err());
    assert!(cfg_with_pars("packfact=0").check_consistency().is_err());
    assert!(cfg_with_pars("packfact=1.5").check_consistency().is_err());
    assert!(cfg_with_pars("vdoslux=6").check_consistency().is_err());
    assert!(cfg_with_pars("mosprec=1").check_consistency().is_err());
    assert!(cfg_with_pars("dcutoff=2;dcutoffup=1")
        .check_consistency()
        .is_err());
    assert!(cfg_with_pars("dirtol=4.0").check_consistency().is_err());
    assert!(cfg_with_pars("inelas=BAD").check_consistency().is_err());
}

#[test]
fn test_single_crystal_requires_full_package() {
    let cfg = cfg_with_pars("mos=0.001");
    assert!(cfg.is_single_crystal());
    assert!(cfg.check_consistency().is_err());

    let cfg = cfg_with_pars("mos=0.001;dir1=@crys:1,0,0@lab:1,0,0;dir2=@crys:0,1,0@lab:0,1,0");
    assert!(cfg.check_consistency().is_ok());
    let sco = cfg.create_sc_orientation().unwrap();
    assert_eq!(sco.dirtol, 1e-4);
    assert!(!sco.dir1.crystal_is_hkl);

    // packfact must stay 1 for single crystals
    let cfg = cfg_with_pars(
        "mos=0.001;dir1=@crys:1,0,0@lab:1,0,0;dir2=@crys:0,1,0@lab:0,1,0;packfact=0.5",
    );
    assert!(cfg.check_consistency().is_err());

    // Parallel directions are rejected
    let cfg = cfg_with_pars("mos=0.001;dir1=@crys:1,0,0@lab:0,0,1;dir2=@crys:0,1,0@lab:0,0,1");
    assert!(cfg.check_consistency().is_err());
    let cfg = cfg_with_pars("mos=0.001;dir1=@crys:1,0,0@lab:1,0,0;dir2=@crys:2,0,0@lab:0,1,0");
    assert!(cfg.check_consistency().is_err());
}

#[test]
fn test_layered_crystal_axis() {
    let cfg = cfg_with_pars("lcaxis=0,0,1");
    assert!(cfg.is_layered_crystal());
    assert_eq!(cfg.get_lcaxis().unwrap(), [0.0, 0.0, 1.0]);
    assert!(cfg.check_consistency().is_ok());
    let cfg = cfg_with_pars("lcaxis=0,0,0");
    assert!(cfg.check_consistency().is_err());
}

#[test]
fn test_atomdb_parameter() {
    let cfg = cfg_with_pars("atomdb=Al:26.98u:3.0fm:0.0082b:0.231b");
    let lines = cfg.get_atomdb_parsed();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0][0], "Al");
    assert_eq!(cfg.get_atomdb(), "Al:26.98u:3.0fm:0.0082b:0.231b");
}

#[test]
fn test_embedded_config_applied() {
    let content = AL_V2.replacen(
        "NCMAT v2\n",
        "NCMAT v2\n# NCRYSTALMATCFG[temp=500K]\n",
        1,
    );
    let cfg = MatCfg::from_buffer("Al.ncmat", &content, "").unwrap();
    assert_eq!(cfg.get_temp(), 500.0);
}

#[test]
fn test_embedded_config_user_wins() {
    let content = AL_V2.replacen(
        "NCMAT v2\n",
        "NCMAT v2\n# NCRYSTALMATCFG[temp=500K]\n",
        1,
    );
    let cfg = MatCfg::from_buffer("Al.ncmat", &content, "temp=300K").unwrap();
    assert_eq!(cfg.get_temp(), 300.0);
}

#[test]
fn test_ignorefilecfg() {
    let content = AL_V2.replacen(
        "NCMAT v2\n",
        "NCMAT v2\n# NCRYSTALMATCFG[temp=500K]\n",
        1,
    );
    let cfg = MatCfg::from_buffer("Al.ncmat", &content, "ignorefilecfg").unwrap();
    assert_eq!(cfg.get_temp(), -1.0);
    assert!(cfg.ignored_embedded_config());
    let cfg = MatCfg::from_buffer("Al.ncmat", &content, "ignorefilecfg;temp=77K").unwrap();
    assert_eq!(cfg.get_temp(), 77.0);
    // Only legal directly after the filename
    assert!(MatCfg::from_buffer("Al.ncmat", &content, "temp=77K;ignorefilecfg").is_err());
}

#[test]
fn test_embedded_config_malformed() {
    let bad1 = AL_V2.replacen("NCMAT v2\n", "NCMAT v2\n# NCRYSTALMATCFG temp\n", 1);
    assert!(MatCfg::from_buffer("Al.ncmat", &bad1, "").is_err());
    let bad2 = AL_V2.replacen("NCMAT v2\n", "NCMAT v2\n# NCRYSTALMATCFG[temp=500K\n", 1);
    assert!(MatCfg::from_buffer("Al.ncmat", &bad2, "").is_err());
    let bad3 = AL_V2.replacen(
        "NCMAT v2\n",
        "NCMAT v2\n# NCRYSTALMATCFG[temp=500K]\n# NCRYSTALMATCFG[temp=600K]\n",
        1,
    );
    assert!(MatCfg::from_buffer("Al.ncmat", &bad3, "").is_err());
}

#[test]
fn test_new_from_disk_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Al_sg225.ncmat");
    let mut file = File::create(&path).unwrap();
    write!(file, "{}", AL_V2).unwrap();
    let cfg_string = format!("{};temp=350K", path.display());
    let cfg = MatCfg::new(&cfg_string).unwrap();
    assert_eq!(cfg.get_temp(), 350.0);
    assert_eq!(cfg.get_datafile(), path.display().to_string());
    assert_eq!(cfg.get_datafile_extension(), "ncmat");
    assert!(format!("{}", cfg).contains("Al_sg225.ncmat"));
}

#[test]
fn test_missing_file_and_bad_names() {
    assert!(matches!(
        MatCfg::new("definitely-not-there.ncmat"),
        Err(ncmat_rs::Error::FileNotFound(_))
    ));
    assert!(MatCfg::new("").is_err());
    assert!(MatCfg::new("bad=name.ncmat").is_err());
}

#[test]
fn test_overridefileext() {
    let cfg = cfg_with_pars("overridefileext=laz");
    assert_eq!(cfg.get_datafile_extension(), "laz");
}

/// Spy recording every parameter name it observes
struct RecordingSpy {
    names: Mutex<Vec<String>>,
}

impl RecordingSpy {
    fn new() -> Arc<Self> {
        Arc::new(RecordingSpy {
            names: Mutex::new(Vec::new()),
        })
    }

    fn observed(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

impl AccessSpy for RecordingSpy {
    fn par_accessed(&self, name: &str) {
        self.names.lock().unwrap().push(name.to_string());
    }
}

#[test]
fn test_access_spy_records_reads() {
    let cfg = cfg_with_pars("temp=300K");
    let spy = RecordingSpy::new();
    let dyn_spy: Arc<dyn AccessSpy> = spy.clone();
    cfg.add_access_spy(&dyn_spy).unwrap();
    assert!(cfg.has_access_spy(&dyn_spy));
    let _ = cfg.get_temp();
    let _ = cfg.get_dcutoff();
    assert_eq!(spy.observed(), vec!["temp", "dcutoff"]);
    cfg.remove_access_spy(&dyn_spy).unwrap();
    let _ = cfg.get_temp();
    assert_eq!(spy.observed().len(), 2);
    assert!(cfg.remove_access_spy(&dyn_spy).is_err());
}

#[test]
fn test_access_spy_suppressed_during_serialization() {
    let cfg = cfg_with_pars("temp=300K;vdoslux=2");
    let spy = RecordingSpy::new();
    let dyn_spy: Arc<dyn AccessSpy> = spy.clone();
    cfg.add_access_spy(&dyn_spy).unwrap();
    let _ = cfg.to_str_cfg(false, None);
    cfg.check_consistency().unwrap();
    assert!(spy.observed().is_empty());
    // After serialization the spy is active again
    let _ = cfg.get_temp();
    assert_eq!(spy.observed(), vec!["temp"]);
}

#[test]
fn test_mutation_under_spy_is_logic_error() {
    let mut cfg = cfg_with_pars("temp=300K");
    let spy = RecordingSpy::new();
    let dyn_spy: Arc<dyn AccessSpy> = spy.clone();
    cfg.add_access_spy(&dyn_spy).unwrap();
    assert!(matches!(
        cfg.set_temp(77.0),
        Err(ncmat_rs::Error::LogicError(_))
    ));
    cfg.remove_access_spy(&dyn_spy).unwrap();
    cfg.set_temp(77.0).unwrap();
    assert_eq!(cfg.get_temp(), 77.0);
}

#[test]
fn test_duplicate_spy_rejected() {
    let cfg = cfg_with_pars("");
    let spy = RecordingSpy::new();
    let dyn_spy: Arc<dyn AccessSpy> = spy.clone();
    cfg.add_access_spy(&dyn_spy).unwrap();
    assert!(cfg.add_access_spy(&dyn_spy).is_err());
}

#[test]
fn test_spies_stay_with_their_handle() {
    let cfg = cfg_with_pars("temp=300K");
    let spy = RecordingSpy::new();
    let dyn_spy: Arc<dyn AccessSpy> = spy.clone();
    cfg.add_access_spy(&dyn_spy).unwrap();
    // A clone of the handle is not monitored and may be modified
    let mut other = cfg.clone();
    other.set_temp(77.0).unwrap();
    assert!(spy.observed().is_empty());
    assert_eq!(cfg.get_temp(), 300.0);
}
