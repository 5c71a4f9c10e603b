/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Unified error types for ncmat-rs
//!
//! All fallible operations in this crate return [`Result`], with error kinds
//! covering data-source lookup failures, malformed input (with source and
//! line-number attribution where available), missing typed values, failed
//! numerical derivations and caller contract violations.

use std::fmt;
use std::io;
use thiserror::Error;

/// Errors produced by parsing, configuration and info-building operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Could not find data source: {0}")]
    FileNotFound(String),

    #[error("{0}")]
    BadInput(BadInput),

    #[error("Missing information: {0}")]
    MissingInfo(String),

    #[error("Calculation error: {0}")]
    CalcError(String),

    #[error("Logic error: {0}")]
    LogicError(String),
}

/// Payload of [`Error::BadInput`], locating the problem in its source when
/// the failing code knows where the offending bytes came from.
#[derive(Debug)]
pub struct BadInput {
    pub message: String,
    pub source_descr: Option<String>,
    pub line: Option<u64>,
}

impl fmt::Display for BadInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source_descr, self.line) {
            (Some(src), Some(line)) => {
                write!(f, "{} [{}, line {}]", self.message, src, line)
            }
            (Some(src), None) => write!(f, "{} [{}]", self.message, src),
            (None, Some(line)) => write!(f, "{} [line {}]", self.message, line),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl Error {
    /// A bad-input error with no source attribution
    pub fn bad_input(message: impl Into<String>) -> Self {
        Error::BadInput(BadInput {
            message: message.into(),
            source_descr: None,
            line: None,
        })
    }

    /// A bad-input error attributed to a line of a named source
    pub fn bad_input_at(
        source_descr: impl Into<String>,
        line: u64,
        message: impl Into<String>,
    ) -> Self {
        Error::BadInput(BadInput {
            message: message.into(),
            source_descr: Some(source_descr.into()),
            line: Some(line),
        })
    }

    pub fn missing_info(message: impl Into<String>) -> Self {
        Error::MissingInfo(message.into())
    }

    pub fn calc(message: impl Into<String>) -> Self {
        Error::CalcError(message.into())
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Error::LogicError(message.into())
    }

    /// The plain message text, without source attribution
    pub fn message(&self) -> String {
        match self {
            Error::BadInput(b) => b.message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;
