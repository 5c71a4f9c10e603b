/*
MIT License with NCrystal Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: NCrystal
Copyright (c) 2015-2020 NCrystal developers (https://mctools.github.io/ncrystal/)
All rights reserved.
*/

//! Text input abstraction
//!
//! Parsers in this crate never open files directly. They consume a
//! [`TextInputStream`], which yields successive lines from an underlying
//! source (an on-disk file, an in-memory buffer, or anything a custom
//! [`TextInputManager`] decides to serve). This keeps the material parser
//! testable and lets embedding applications provide data from databases or
//! generated buffers.

use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::error::{Error, Result};

/// A source of successive text lines (without trailing newlines)
pub trait TextInputStream: Send {
    /// True if `next_line` can yield more data
    fn more_lines(&self) -> bool;

    /// The next line of text, or `None` when the input is exhausted
    fn next_line(&mut self) -> Result<Option<String>>;

    /// Identifies the source, for diagnostics and error messages
    fn description(&self) -> &str;

    /// Kind of source, e.g. "on-disk file" or "memory buffer"
    fn stream_type(&self) -> &'static str;

    /// Resolved path when the content comes directly from an on-disk file
    fn on_disk_resolved_path(&self) -> Option<&Path> {
        None
    }

    /// Combined "type \"description\"" string used in error messages
    fn full_description(&self) -> String {
        format!("{} \"{}\"", self.stream_type(), self.description())
    }
}

/// Stream reading lines from an on-disk file
pub struct FileTextInputStream {
    path: PathBuf,
    descr: String,
    reader: BufReader<File>,
    peeked: Option<String>,
}

impl FileTextInputStream {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let descr = path.display().to_string();
        let mut stream = FileTextInputStream {
            path,
            descr,
            reader: BufReader::new(file),
            peeked: None,
        };
        stream.advance()?;
        Ok(stream)
    }

    fn advance(&mut self) -> Result<()> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf)?;
        if n == 0 {
            self.peeked = None;
        } else {
            if buf.ends_with('\n') {
                buf.pop();
            }
            self.peeked = Some(buf);
        }
        Ok(())
    }
}

impl TextInputStream for FileTextInputStream {
    fn more_lines(&self) -> bool {
        self.peeked.is_some()
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        match self.peeked.take() {
            Some(line) => {
                self.advance()?;
                Ok(Some(line))
            }
            None => Ok(None),
        }
    }

    fn description(&self) -> &str {
        &self.descr
    }

    fn stream_type(&self) -> &'static str {
        "on-disk file"
    }

    fn on_disk_resolved_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Stream reading lines from an in-memory buffer
pub struct MemoryTextInputStream {
    descr: String,
    lines: Vec<String>,
    idx: usize,
}

impl MemoryTextInputStream {
    pub fn new(name: impl Into<String>, content: &str) -> Self {
        // A trailing newline does not introduce an extra empty line
        let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
        if lines.last().map(String::is_empty).unwrap_or(false) {
            lines.pop();
        }
        MemoryTextInputStream {
            descr: name.into(),
            lines,
            idx: 0,
        }
    }
}

impl TextInputStream for MemoryTextInputStream {
    fn more_lines(&self) -> bool {
        self.idx < self.lines.len()
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        if self.idx < self.lines.len() {
            let line = self.lines[self.idx].clone();
            self.idx += 1;
            Ok(Some(line))
        } else {
            Ok(None)
        }
    }

    fn description(&self) -> &str {
        &self.descr
    }

    fn stream_type(&self) -> &'static str {
        "memory buffer"
    }
}

/// Customisation hook consulted before the default source-name search
///
/// Install with [`register_input_manager`]. Installation is process-wide and
/// must be externally serialised with respect to concurrent source lookups.
pub trait TextInputManager: Send {
    /// Produce a stream for the source name, or `None` to decline
    fn create_stream(&self, source_name: &str) -> Result<Option<Box<dyn TextInputStream>>>;

    /// Return false to disable the default search when `create_stream`
    /// declines a name.
    fn allow_fallback(&self) -> bool {
        true
    }
}

static INPUT_MANAGER: Lazy<Mutex<Option<Box<dyn TextInputManager>>>> =
    Lazy::new(|| Mutex::new(None));

/// Install (or with `None` clear) the process-wide input manager
pub fn register_input_manager(manager: Option<Box<dyn TextInputManager>>) {
    *INPUT_MANAGER.lock().unwrap() = manager;
}

/// Environment variable naming the data directory searched for source names
pub const DATADIR_ENV_VAR: &str = "NCMAT_DATADIR";

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

/// Search for a file: as given (absolute or relative to the working
/// directory), then relative to the directory in the `NCMAT_DATADIR`
/// environment variable, then relative to a data directory configured at
/// compile time. Returns `None` if no readable file is found.
pub fn find_file(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let direct = PathBuf::from(name);
    if is_readable_file(&direct) {
        return Some(direct);
    }
    if direct.is_absolute() {
        return None;
    }
    if let Ok(datadir) = env::var(DATADIR_ENV_VAR) {
        if !datadir.is_empty() {
            let candidate = Path::new(&datadir).join(name);
            if is_readable_file(&candidate) {
                return Some(candidate);
            }
        }
    }
    if let Some(datadir) = option_env!("NCMAT_COMPILED_DATADIR") {
        let candidate = Path::new(datadir).join(name);
        if is_readable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Stream from an in-memory buffer
pub fn stream_from_buffer(name: &str, content: &str) -> Box<dyn TextInputStream> {
    Box::new(MemoryTextInputStream::new(name, content))
}

/// Stream directly from a file path, bypassing the search in [`find_file`]
pub fn stream_from_file(path: impl Into<PathBuf>) -> Result<Box<dyn TextInputStream>> {
    Ok(Box::new(FileTextInputStream::new(path)?))
}

/// Resolve a source name to a text input stream
///
/// A registered [`TextInputManager`] is consulted first; if it declines and
/// permits fallback, the default file search is used. Fails with
/// [`Error::FileNotFound`] when nothing matches.
pub fn open_text_input(source_name: &str) -> Result<Box<dyn TextInputStream>> {
    {
        let guard = INPUT_MANAGER.lock().unwrap();
        if let Some(manager) = guard.as_ref() {
            if let Some(stream) = manager.create_stream(source_name)? {
                return Ok(stream);
            }
            if !manager.allow_fallback() {
                return Err(Error::FileNotFound(source_name.to_string()));
            }
        }
    }
    match find_file(source_name) {
        Some(path) => stream_from_file(path),
        None => Err(Error::FileNotFound(source_name.to_string())),
    }
}
