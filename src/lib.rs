/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! # ncmat-rs
//!
//! A Rust implementation of the NCMAT material data layer used by thermal
//! neutron scattering tools: the versioned NCMAT text format (parser and
//! validator), the material configuration string (typed parameter store
//! with units, copy-on-write sharing and access tracking), and the sealed
//! material info objects physics models are initialised from.
//!
//! Parsing works on abstract line streams, so material data can come from
//! on-disk files, in-memory buffers or custom input managers alike.

pub mod atoms;
pub mod cfg;
pub mod cli;
pub mod error;
pub mod factory;
pub mod info;
pub mod ncmat;
pub mod stream;
pub mod utils;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

// Re-export the main entry points
pub use cfg::{AccessSpy, MatCfg, OrientDir, SCOrientation};
pub use error::{Error, Result};
pub use factory::{clear_caches, create_info, register_ncmat_factory};
pub use info::builder::{build_info, load_ncmat, NcmatLoadRequest};
pub use info::Info;
pub use ncmat::{parse_ncmat, RawNcmatData};
pub use stream::{open_text_input, register_input_manager, TextInputStream};
