/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Material configuration parsing and storage

pub mod options;
pub mod store;
pub mod value;

pub use store::{AccessSpy, MatCfg, SCOrientation, EMBEDDED_CFG_PATTERN};
pub use value::{CfgValue, OrientDir, UnitClass};
