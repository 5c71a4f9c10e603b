/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Main executable for ncmat-rs

use std::env;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        println!("ncmat-rs v{}", ncmat_rs::VERSION);
        println!("Inspect NCMAT material data sources.");
        println!();
        println!("Usage: ncmat-rs '<file.ncmat[;par=value;...]>'");
        println!("Example: ncmat-rs 'Al_sg225.ncmat;temp=77K;dcutoff=0.5Aa'");
        return Ok(());
    }

    for cfg_string in &args {
        ncmat_rs::cli::run(cfg_string)?;
    }
    Ok(())
}
