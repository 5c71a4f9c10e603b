/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! NCMAT material format: raw data record and parser

pub mod data;
pub mod parser;

pub use data::{
    CellData, DensityUnit, RawDynInfo, RawDynInfoType, RawNcmatData, NCMAT_MAX_VERSION,
};
pub use parser::{parse_ncmat, parse_ncmat_unvalidated};
