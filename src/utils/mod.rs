/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Utility functions shared by the parsing, configuration and info layers

pub mod constants;
pub mod strings;
pub mod thermal;

// Re-export commonly used items for convenience
pub use constants::*;
pub use strings::*;
pub use thermal::debye_isotropic_msd;
