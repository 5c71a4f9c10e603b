/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Builtin atomic database
//!
//! Element symbols and masses cover the full periodic table; neutron
//! scattering constants (bound coherent scattering length, incoherent and
//! absorption cross sections) are tabulated for natural elements and a set
//! of common isotopes, with values based on the compilation of Sears
//! (Neutron News 3, 1992) and the IUPAC 2013 atomic weights.

use crate::atoms::data::AtomData;
use crate::utils::strings::split_leading_digits;

/// Provides element symbols for atomic numbers
pub fn element_symbol(z: u32) -> Option<&'static str> {
    match z {
        1 => Some("H"),
        2 => Some("He"),
        3 => Some("Li"),
        4 => Some("Be"),
        5 => Some("B"),
        6 => Some("C"),
        7 => Some("N"),
        8 => Some("O"),
        9 => Some("F"),
        10 => Some("Ne"),
        11 => Some("Na"),
        12 => Some("Mg"),
        13 => Some("Al"),
        14 => Some("Si"),
        15 => Some("P"),
        16 => Some("S"),
        17 => Some("Cl"),
        18 => Some("Ar"),
        19 => Some("K"),
        20 => Some("Ca"),
        21 => Some("Sc"),
        22 => Some("Ti"),
        23 => Some("V"),
        24 => Some("Cr"),
        25 => Some("Mn"),
        26 => Some("Fe"),
        27 => Some("Co"),
        28 => Some("Ni"),
        29 => Some("Cu"),
        30 => Some("Zn"),
        31 => Some("Ga"),
        32 => Some("Ge"),
        33 => Some("As"),
        34 => Some("Se"),
        35 => Some("Br"),
        36 => Some("Kr"),
        37 => Some("Rb"),
        38 => Some("Sr"),
        39 => Some("Y"),
        40 => Some("Zr"),
        41 => Some("Nb"),
        42 => Some("Mo"),
        43 => Some("Tc"),
        44 => Some("Ru"),
        45 => Some("Rh"),
        46 => Some("Pd"),
        47 => Some("Ag"),
        48 => Some("Cd"),
        49 => Some("In"),
        50 => Some("Sn"),
        51 => Some("Sb"),
        52 => Some("Te"),
        53 => Some("I"),
        54 => Some("Xe"),
        55 => Some("Cs"),
        56 => Some("Ba"),
        57 => Some("La"),
        58 => Some("Ce"),
        59 => Some("Pr"),
        60 => Some("Nd"),
        61 => Some("Pm"),
        62 => Some("Sm"),
        63 => Some("Eu"),
        64 => Some("Gd"),
        65 => Some("Tb"),
        66 => Some("Dy"),
        67 => Some("Ho"),
        68 => Some("Er"),
        69 => Some("Tm"),
        70 => Some("Yb"),
        71 => Some("Lu"),
        72 => Some("Hf"),
        73 => Some("Ta"),
        74 => Some("W"),
        75 => Some("Re"),
        76 => Some("Os"),
        77 => Some("Ir"),
        78 => Some("Pt"),
        79 => Some("Au"),
        80 => Some("Hg"),
        81 => Some("Tl"),
        82 => Some("Pb"),
        83 => Some("Bi"),
        84 => Some("Po"),
        85 => Some("At"),
        86 => Some("Rn"),
        87 => Some("Fr"),
        88 => Some("Ra"),
        89 => Some("Ac"),
        90 => Some("Th"),
        91 => Some("Pa"),
        92 => Some("U"),
        93 => Some("Np"),
        94 => Some("Pu"),
        95 => Some("Am"),
        96 => Some("Cm"),
        97 => Some("Bk"),
        98 => Some("Cf"),
        99 => Some("Es"),
        100 => Some("Fm"),
        101 => Some("Md"),
        102 => Some("No"),
        103 => Some("Lr"),
        104 => Some("Rf"),
        105 => Some("Db"),
        106 => Some("Sg"),
        107 => Some("Bh"),
        108 => Some("Hs"),
        109 => Some("Mt"),
        110 => Some("Ds"),
        111 => Some("Rg"),
        112 => Some("Cn"),
        113 => Some("Nh"),
        114 => Some("Fl"),
        115 => Some("Mc"),
        116 => Some("Lv"),
        117 => Some("Ts"),
        118 => Some("Og"),
        _ => None,
    }
}

/// Look up the atomic number of an element symbol
pub fn element_z(symbol: &str) -> Option<u32> {
    for z in 1..=118 {
        if element_symbol(z) == Some(symbol) {
            return Some(z);
        }
    }
    None
}

/// True if the string is a standard chemical element symbol
pub fn is_element_symbol(s: &str) -> bool {
    element_z(s).is_some()
}

/// Neutron data for natural elements: (mass [amu], b_coh [fm],
/// sigma_incoherent [barn], sigma_absorption [barn])
fn natural_element_data(z: u32) -> Option<(f64, f64, f64, f64)> {
    match z {
        1 => Some((1.008, -3.7390, 80.26, 0.3326)),
        2 => Some((4.0026, 3.26, 0.0, 0.00747)),
        3 => Some((6.94, -1.90, 0.92, 70.5)),
        4 => Some((9.0122, 7.79, 0.0018, 0.0076)),
        5 => Some((10.81, 5.30, 1.70, 767.0)),
        6 => Some((12.011, 6.6460, 0.001, 0.0035)),
        7 => Some((14.007, 9.36, 0.50, 1.90)),
        8 => Some((15.999, 5.803, 0.0008, 0.00019)),
        9 => Some((18.998403163, 5.654, 0.0008, 0.0096)),
        10 => Some((20.1797, 4.566, 0.008, 0.039)),
        11 => Some((22.98976928, 3.63, 1.62, 0.530)),
        12 => Some((24.305, 5.375, 0.08, 0.063)),
        13 => Some((26.9815385, 3.449, 0.0082, 0.231)),
        14 => Some((28.085, 4.1491, 0.004, 0.171)),
        15 => Some((30.973761998, 5.13, 0.005, 0.172)),
        16 => Some((32.06, 2.847, 0.007, 0.53)),
        17 => Some((35.45, 9.577, 5.3, 33.5)),
        18 => Some((39.948, 1.909, 0.225, 0.675)),
        19 => Some((39.0983, 3.67, 0.27, 2.1)),
        20 => Some((40.078, 4.70, 0.05, 0.43)),
        21 => Some((44.955908, 12.29, 4.5, 27.5)),
        22 => Some((47.867, -3.438, 2.87, 6.09)),
        23 => Some((50.9415, -0.3824, 5.08, 5.08)),
        24 => Some((51.9961, 3.635, 1.83, 3.05)),
        25 => Some((54.938044, -3.73, 0.40, 13.3)),
        26 => Some((55.845, 9.45, 0.40, 2.56)),
        27 => Some((58.933194, 2.49, 4.8, 37.18)),
        28 => Some((58.6934, 10.3, 5.2, 4.49)),
        29 => Some((63.546, 7.718, 0.55, 3.78)),
        30 => Some((65.38, 5.680, 0.077, 1.11)),
        31 => Some((69.723, 7.288, 0.16, 2.75)),
        32 => Some((72.630, 8.185, 0.18, 2.20)),
        33 => Some((74.921595, 6.58, 0.060, 4.5)),
        34 => Some((78.971, 7.970, 0.32, 11.7)),
        35 => Some((79.904, 6.795, 0.10, 6.9)),
        36 => Some((83.798, 7.81, 0.01, 25.0)),
        37 => Some((85.4678, 7.09, 0.5, 0.38)),
        38 => Some((87.62, 7.02, 0.06, 1.28)),
        39 => Some((88.90584, 7.75, 0.15, 1.28)),
        40 => Some((91.224, 7.16, 0.02, 0.185)),
        41 => Some((92.90637, 7.054, 0.0024, 1.15)),
        42 => Some((95.95, 6.715, 0.04, 2.48)),
        44 => Some((101.07, 7.03, 0.4, 2.56)),
        45 => Some((102.90550, 5.88, 0.3, 144.8)),
        46 => Some((106.42, 5.91, 0.093, 6.9)),
        47 => Some((107.8682, 5.922, 0.58, 63.3)),
        48 => Some((112.414, 4.87, 3.46, 2520.0)),
        49 => Some((114.818, 4.065, 0.54, 193.8)),
        50 => Some((118.710, 6.225, 0.022, 0.626)),
        51 => Some((121.760, 5.57, 0.007, 4.91)),
        52 => Some((127.60, 5.80, 0.09, 4.7)),
        53 => Some((126.90447, 5.28, 0.31, 6.15)),
        54 => Some((131.293, 4.92, 0.0, 23.9)),
        55 => Some((132.90545196, 5.42, 0.21, 29.0)),
        56 => Some((137.327, 5.07, 0.15, 1.1)),
        57 => Some((138.90547, 8.24, 1.13, 8.97)),
        58 => Some((140.116, 4.84, 0.001, 0.63)),
        59 => Some((140.90766, 4.58, 0.015, 11.5)),
        60 => Some((144.242, 7.69, 9.2, 50.5)),
        62 => Some((150.36, 0.80, 39.0, 5922.0)),
        63 => Some((151.964, 7.22, 2.5, 4530.0)),
        64 => Some((157.25, 6.5, 151.0, 49700.0)),
        65 => Some((158.92535, 7.38, 0.004, 23.4)),
        66 => Some((162.500, 16.9, 54.4, 994.0)),
        67 => Some((164.93033, 8.01, 0.36, 64.7)),
        68 => Some((167.259, 7.79, 1.1, 159.0)),
        69 => Some((168.93422, 7.07, 0.1, 100.0)),
        70 => Some((173.045, 12.43, 4.0, 34.8)),
        71 => Some((174.9668, 7.21, 0.7, 74.0)),
        72 => Some((178.49, 7.7, 2.6, 104.1)),
        73 => Some((180.94788, 6.91, 0.01, 20.6)),
        74 => Some((183.84, 4.86, 1.63, 18.3)),
        75 => Some((186.207, 9.2, 0.9, 89.7)),
        76 => Some((190.23, 10.7, 0.3, 16.0)),
        77 => Some((192.217, 10.6, 0.0, 425.0)),
        78 => Some((195.084, 9.60, 0.13, 10.3)),
        79 => Some((196.966569, 7.63, 0.43, 98.65)),
        80 => Some((200.592, 12.692, 6.6, 372.3)),
        81 => Some((204.38, 8.776, 0.21, 3.43)),
        82 => Some((207.2, 9.405, 0.003, 0.171)),
        83 => Some((208.98040, 8.532, 0.0084, 0.0338)),
        90 => Some((232.0377, 10.31, 0.0, 7.37)),
        92 => Some((238.02891, 8.417, 0.005, 7.57)),
        _ => None,
    }
}

/// Neutron data for selected isotopes, keyed by "<A><symbol>" tokens:
/// (display name, Z, A, mass [amu], b_coh [fm], sigma_inc [barn],
/// sigma_abs [barn])
fn isotope_data(token: &str) -> Option<(&'static str, u32, u32, f64, f64, f64, f64)> {
    match token {
        "1H" => Some(("1H", 1, 1, 1.00782503, -3.7406, 80.27, 0.3326)),
        "2H" => Some(("D", 1, 2, 2.01410178, 6.671, 2.05, 0.000519)),
        "3H" => Some(("T", 1, 3, 3.01604928, 4.792, 0.14, 0.0)),
        "3He" => Some(("3He", 2, 3, 3.01602932, 5.74, 1.6, 5333.0)),
        "4He" => Some(("4He", 2, 4, 4.00260325, 3.26, 0.0, 0.0)),
        "6Li" => Some(("6Li", 3, 6, 6.01512289, 2.00, 0.46, 940.0)),
        "7Li" => Some(("7Li", 3, 7, 7.01600344, -2.22, 0.78, 0.0454)),
        "10B" => Some(("10B", 5, 10, 10.01293695, -0.1, 3.0, 3835.0)),
        "11B" => Some(("11B", 5, 11, 11.00930536, 6.65, 0.21, 0.0055)),
        "12C" => Some(("12C", 6, 12, 12.0, 6.6511, 0.0, 0.00353)),
        "13C" => Some(("13C", 6, 13, 13.00335484, 6.19, 0.52, 0.00137)),
        "16O" => Some(("16O", 8, 16, 15.99491462, 5.803, 0.0, 0.0001)),
        "58Ni" => Some(("58Ni", 28, 58, 57.93534241, 14.4, 0.0, 4.6)),
        "60Ni" => Some(("60Ni", 28, 60, 59.93078588, 2.8, 0.0, 2.9)),
        "235U" => Some(("235U", 92, 235, 235.0439301, 10.47, 0.2, 680.9)),
        "238U" => Some(("238U", 92, 238, 238.0507884, 8.402, 0.0, 2.68)),
        _ => None,
    }
}

/// Look up builtin atom data by token
///
/// Accepted tokens are natural element symbols ("Al"), isotope markers with
/// a leading mass number ("2H"), and the aliases "D" and "T". Returns `None`
/// for unknown tokens or isotopes without tabulated data.
pub fn builtin_atom_data(token: &str) -> Option<AtomData> {
    let token = match token {
        "D" => "2H",
        "T" => "3H",
        other => other,
    };
    if let Some((name, z, a, mass, bcoh, incxs, absxs)) = isotope_data(token) {
        return AtomData::new(name, z, a, mass, bcoh, incxs, absxs).ok();
    }
    let (digits, symbol) = split_leading_digits(token);
    if digits.is_empty() {
        let z = element_z(token)?;
        let (mass, bcoh, incxs, absxs) = natural_element_data(z)?;
        return AtomData::new(token, z, 0, mass, bcoh, incxs, absxs).ok();
    }
    // Isotope marker without tabulated neutron data
    let _ = element_z(symbol)?;
    None
}
