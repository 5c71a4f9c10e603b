/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Factory registry
//!
//! Info factories turn validated configurations into sealed info objects.
//! The process-wide registry selects among them by name (when the
//! configuration requests a specific factory) or by self-reported priority
//! for the configuration's file extension. The standard NCMAT factory is
//! registered via [`register_ncmat_factory`].
//!
//! The cache-cleanup registry collects callbacks invoked by
//! [`clear_caches`]; registration is append-only and, like factory
//! registration, must be externally serialised with respect to concurrent
//! use.

use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::cfg::MatCfg;
use crate::error::{Error, Result};
use crate::info::builder::{load_ncmat, NcmatLoadRequest};
use crate::info::Info;

/// Creates info objects for configurations it recognises
pub trait InfoFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Priority with which this factory handles the configuration; 0 means
    /// not at all
    fn can_create_info(&self, cfg: &MatCfg) -> i32;

    fn create_info(&self, cfg: &MatCfg) -> Result<Arc<Info>>;
}

static FACTORIES: Lazy<Mutex<Vec<Arc<dyn InfoFactory>>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Register an info factory
pub fn register_factory(factory: Arc<dyn InfoFactory>) {
    FACTORIES.lock().unwrap().push(factory);
}

/// Whether a factory of this name is registered
pub fn has_factory(name: &str) -> bool {
    FACTORIES.lock().unwrap().iter().any(|f| f.name() == name)
}

/// Create an info object for a configuration
///
/// When the configuration names a specific info factory, that factory is
/// used; otherwise the registered factory reporting the highest priority
/// wins.
pub fn create_info(cfg: &MatCfg) -> Result<Arc<Info>> {
    cfg.check_consistency()?;
    let requested = cfg.get_infofact_name();
    let factories: Vec<Arc<dyn InfoFactory>> = FACTORIES.lock().unwrap().clone();
    if !requested.is_empty() {
        let factory = factories
            .iter()
            .find(|f| f.name() == requested)
            .ok_or_else(|| {
                Error::bad_input(format!(
                    "Specific info factory \"{}\" is not available",
                    requested
                ))
            })?;
        if factory.can_create_info(cfg) == 0 {
            return Err(Error::bad_input(format!(
                "Factory \"{}\" can not create info for this configuration",
                requested
            )));
        }
        return factory.create_info(cfg);
    }
    let best = factories
        .iter()
        .map(|f| (f.can_create_info(cfg), f))
        .filter(|(priority, _)| *priority > 0)
        .max_by_key(|(priority, _)| *priority);
    match best {
        Some((_, factory)) => factory.create_info(cfg),
        None => Err(Error::bad_input(format!(
            "Could not find a factory able to create info for \"{}\"",
            cfg.get_datafile_as_specified()
        ))),
    }
}

/// Factory component which can load .ncmat sources
pub struct NcmatInfoFactory;

impl InfoFactory for NcmatInfoFactory {
    fn name(&self) -> &str {
        "stdncmat"
    }

    fn can_create_info(&self, cfg: &MatCfg) -> i32 {
        if cfg.get_datafile_extension() == "ncmat" {
            100
        } else {
            0
        }
    }

    fn create_info(&self, cfg: &MatCfg) -> Result<Arc<Info>> {
        cfg.infofactopt_validate(&["expandhkl"])?;
        let request = NcmatLoadRequest::from_cfg(cfg);
        // Use the name as specified, to support custom input managers and
        // in-memory sources
        let info = load_ncmat(cfg.get_datafile_as_specified(), &request)?;
        Ok(Arc::new(info))
    }
}

/// Register the standard NCMAT factory (idempotent)
pub fn register_ncmat_factory() {
    if !has_factory("stdncmat") {
        register_factory(Arc::new(NcmatInfoFactory));
    }
}

type CleanupFn = Box<dyn Fn() + Send>;

static CACHE_CLEANUP_FNS: Lazy<Mutex<Vec<CleanupFn>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Register a callback invoked whenever [`clear_caches`] is called
pub fn register_cache_cleanup(callback: CleanupFn) {
    CACHE_CLEANUP_FNS.lock().unwrap().push(callback);
}

/// Invoke all registered cache-cleanup callbacks
pub fn clear_caches() {
    for callback in CACHE_CLEANUP_FNS.lock().unwrap().iter() {
        callback();
    }
}
