/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Physical constants and unit conversion factors
//!
//! Values from CODATA 2018 where applicable. Internal units are angstrom,
//! kelvin, radian and barn.

/// Pi
pub const K_PI: f64 = std::f64::consts::PI;

/// Degrees to radians
pub const K_DEG: f64 = K_PI / 180.0;

/// Arc minutes to radians
pub const K_ARCMIN: f64 = K_PI / 10800.0;

/// Arc seconds to radians
pub const K_ARCSEC: f64 = K_PI / 648000.0;

/// Positive infinity, used as the code-level default of open upper bounds
pub const K_INFINITY: f64 = f64::INFINITY;

/// Avogadro constant (1/mol)
pub const AVOGADRO: f64 = 6.02214076e23;

/// Atomic mass unit in grams
pub const AMU_TO_G: f64 = 1.66053906660e-24;

/// Neutron mass in atomic mass units
pub const NEUTRON_MASS_AMU: f64 = 1.00866491588;

/// Square femtometers per barn
pub const FM2_PER_BARN: f64 = 100.0;
