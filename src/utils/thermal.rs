/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Thermal displacement estimation
//!
//! Provides the isotropic mean-square displacement of an atom in the Debye
//! model, used to populate atom entries of sealed material-info objects.

use crate::error::{Error, Result};

// Physical constants (CODATA 2018)
const HBAR: f64 = 1.054571817e-34; // J*s
const KB: f64 = 1.380649e-23; // J/K
const AMU: f64 = 1.66053906660e-27; // kg

/// Calculate the Debye energy integral I(x) = int_0^x u/(e^u - 1) du
///
/// The integrand tends to 1 for u -> 0 and decays like u*e^-u for large u,
/// so the integration range can be capped without loss of precision.
fn debye_energy_integral(x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }

    // For small x, use the Taylor expansion of the integrand
    if x < 0.01 {
        return x - x * x / 4.0 + x * x * x / 36.0;
    }

    let upper = x.min(100.0);
    let n_points = 2000;
    let du = upper / n_points as f64;

    let mut integral = 0.0;
    for i in 0..n_points {
        let u = (i as f64 + 0.5) * du;
        let em1 = u.exp_m1();
        integral += u / em1 * du;
    }
    integral
}

/// Isotropic mean-square displacement in the Debye model
///
/// # Arguments
///
/// * `debye_temp` - Debye temperature in Kelvin
/// * `temperature` - Material temperature in Kelvin
/// * `mass_amu` - Atomic mass in atomic mass units
///
/// # Returns
///
/// Displacement projected onto a linear axis, in angstrom squared, suitable
/// for direct usage in isotropic Debye-Waller factors.
pub fn debye_isotropic_msd(debye_temp: f64, temperature: f64, mass_amu: f64) -> Result<f64> {
    if !(debye_temp > 0.0) || !debye_temp.is_finite() {
        return Err(Error::calc(format!(
            "Debye temperature must be a positive number (got {})",
            debye_temp
        )));
    }
    if !(mass_amu > 0.0) || !mass_amu.is_finite() {
        return Err(Error::calc(format!(
            "Atomic mass must be a positive number (got {})",
            mass_amu
        )));
    }
    if temperature < 0.0 || !temperature.is_finite() {
        return Err(Error::calc(format!(
            "Temperature must be a non-negative number (got {})",
            temperature
        )));
    }

    // msd = 3*hbar^2/(M*kB*thetaD) * [1/4 + (T/thetaD)^2 * I(thetaD/T)]
    let prefactor = 3.0 * HBAR * HBAR / (AMU * KB) * 1e20; // Aa^2 * K
    let zero_point = 0.25;
    let thermal = if temperature > 0.0 {
        let tr = temperature / debye_temp;
        tr * tr * debye_energy_integral(debye_temp / temperature)
    } else {
        0.0
    };
    Ok(prefactor / (mass_amu * debye_temp) * (zero_point + thermal))
}
