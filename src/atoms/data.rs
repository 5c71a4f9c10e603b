/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Atom data records
//!
//! An [`AtomData`] instance carries the neutron-physics constants of one
//! atom role: mass, bound coherent scattering length and the incoherent and
//! absorption cross sections. Instances are shared via [`AtomDataSP`]
//! between the atom registry of an info object and its atom/dynamics lists.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::utils::constants::{FM2_PER_BARN, K_PI, NEUTRON_MASS_AMU};

/// Shared handle to immutable atom data
pub type AtomDataSP = Arc<AtomData>;

/// Physical constants of a single atom role
#[derive(Debug, Clone, PartialEq)]
pub struct AtomData {
    name: String,
    z: u32,
    a: u32,
    mass_amu: f64,
    coh_scat_len_fm: f64,
    incoherent_xs_barn: f64,
    absorption_xs_barn: f64,
}

impl AtomData {
    /// Create a new atom data record
    ///
    /// `z` and `a` may be 0 for user-defined labels and natural isotopic
    /// composition respectively.
    pub fn new(
        name: impl Into<String>,
        z: u32,
        a: u32,
        mass_amu: f64,
        coh_scat_len_fm: f64,
        incoherent_xs_barn: f64,
        absorption_xs_barn: f64,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::bad_input("Atom data requires a non-empty name"));
        }
        if !(mass_amu > 0.0) || !mass_amu.is_finite() {
            return Err(Error::bad_input(format!(
                "Invalid mass for atom data \"{}\": {}",
                name, mass_amu
            )));
        }
        if !coh_scat_len_fm.is_finite() {
            return Err(Error::bad_input(format!(
                "Invalid coherent scattering length for atom data \"{}\"",
                name
            )));
        }
        if incoherent_xs_barn < 0.0 || absorption_xs_barn < 0.0 {
            return Err(Error::bad_input(format!(
                "Negative cross section for atom data \"{}\"",
                name
            )));
        }
        Ok(AtomData {
            name,
            z,
            a,
            mass_amu,
            coh_scat_len_fm,
            incoherent_xs_barn,
            absorption_xs_barn,
        })
    }

    /// Display name, e.g. "Al", "D" or a user-defined label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Atomic number (0 for labels without an associated element)
    pub fn z(&self) -> u32 {
        self.z
    }

    /// Mass number (0 for natural isotopic composition)
    pub fn a(&self) -> u32 {
        self.a
    }

    pub fn is_natural(&self) -> bool {
        self.a == 0
    }

    /// Mass in atomic mass units
    pub fn mass_amu(&self) -> f64 {
        self.mass_amu
    }

    /// Bound coherent scattering length in femtometers
    pub fn coh_scat_len_fm(&self) -> f64 {
        self.coh_scat_len_fm
    }

    /// Bound coherent cross section in barn
    pub fn coherent_xs_barn(&self) -> f64 {
        4.0 * K_PI * self.coh_scat_len_fm * self.coh_scat_len_fm / FM2_PER_BARN
    }

    /// Bound incoherent cross section in barn
    pub fn incoherent_xs_barn(&self) -> f64 {
        self.incoherent_xs_barn
    }

    /// Total bound scattering cross section in barn
    pub fn scattering_xs_barn(&self) -> f64 {
        self.coherent_xs_barn() + self.incoherent_xs_barn
    }

    /// Free scattering cross section in barn (high energy limit)
    pub fn free_scattering_xs_barn(&self) -> f64 {
        let ratio = self.mass_amu / NEUTRON_MASS_AMU;
        let factor = ratio / (1.0 + ratio);
        self.scattering_xs_barn() * factor * factor
    }

    /// Absorption cross section at 2200 m/s, in barn
    pub fn absorption_xs_barn(&self) -> f64 {
        self.absorption_xs_barn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_atom_data_basic() {
        let al = AtomData::new("Al", 13, 0, 26.9815385, 3.449, 0.0082, 0.231).unwrap();
        assert_eq!(al.name(), "Al");
        assert!(al.is_natural());
        // sigma_coh = 4*pi*b^2, b in fm, result in barn
        assert_relative_eq!(al.coherent_xs_barn(), 1.4948, max_relative = 1e-3);
        assert!(al.free_scattering_xs_barn() < al.scattering_xs_barn());
    }

    #[test]
    fn test_atom_data_rejects_bad_values() {
        assert!(AtomData::new("", 1, 0, 1.0, 1.0, 0.0, 0.0).is_err());
        assert!(AtomData::new("X", 0, 0, 0.0, 1.0, 0.0, 0.0).is_err());
        assert!(AtomData::new("X", 0, 0, 1.0, 1.0, -1.0, 0.0).is_err());
        assert!(AtomData::new("X", 0, 0, 1.0, f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_free_xs_heavy_limit() {
        // For heavy nuclei the free and bound cross sections converge
        let pb = AtomData::new("Pb", 82, 0, 207.2, 9.405, 0.003, 0.171).unwrap();
        let ratio = pb.free_scattering_xs_barn() / pb.scattering_xs_barn();
        assert!(ratio > 0.98 && ratio < 1.0);
    }
}
