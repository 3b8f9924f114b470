//! # SoFiA 2 parameter templates
//!
//! This module defines [`ParameterSet`], an ordered `key = value` mapping loaded from a
//! SoFiA 2 control file. The template loaded from the user's file is **never mutated**:
//! every per-source run derives its own copy through the pure
//! [`ParameterSet::with_overrides`], so no state is shared between runs.
//!
//! ## File format
//! -----------------
//! ```text
//! # Input
//! input.data        =  /data/cube.fits
//! input.region      =
//!
//! # Output
//! output.directory  =  /data/out
//! output.filename   =  mycube    # base name of all products
//! ```
//!
//! * Blank lines and `#` lines are ignored; inline comments are stripped from values.
//! * Any other line must be a `key = value` setting, otherwise
//!   [`OptifindError::TemplateParse`] is raised.
//! * Insertion order is preserved for round-trip fidelity. A repeated key keeps its
//!   first position and its last value.
//! * [`ParameterSet::load`] requires a non-empty `input.data`
//!   ([`OptifindError::MissingKey`] otherwise).
//!
//! Serialization writes one `key\t=\tvalue` line per setting; comments are not
//! preserved.
//!
//! ## See also
//! ------------
//! * [`crate::runner::RunConfig`] – Per-source configuration derived from a template.
use std::{collections::HashMap, fmt::Write as _, fs};

use ahash::RandomState;
use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    constants::{
        DEFAULT_BASENAME, INPUT_DATA_KEY, OUTPUT_DIRECTORY_KEY, OUTPUT_FILENAME_KEY,
        WRITE_CAT_ASCII_KEY, WRITE_CAT_SQL_KEY, WRITE_CAT_XML_KEY,
    },
    optifind_errors::OptifindError,
};

pub(crate) mod parser;

use parser::{parse_bool, parse_line};

/// Catalogue outputs enabled in a template.
///
/// Defaults follow SoFiA 2: ASCII and XML on, SQL off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogueFormats {
    pub ascii: bool,
    pub xml: bool,
    pub sql: bool,
}

impl Default for CatalogueFormats {
    fn default() -> Self {
        CatalogueFormats {
            ascii: true,
            xml: true,
            sql: false,
        }
    }
}

/// Ordered `key = value` settings of a SoFiA 2 control file.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize, RandomState>,
}

impl PartialEq for ParameterSet {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse control-file text.
    ///
    /// Unlike [`ParameterSet::load`], no key is required, so partial sets can be built
    /// from text (overrides, tests).
    pub fn parse(text: &str) -> Result<Self, OptifindError> {
        let mut set = ParameterSet::new();
        for (idx, line) in text.lines().enumerate() {
            if let Some((key, value)) = parse_line(idx + 1, line)? {
                set.insert(key, value);
            }
        }
        Ok(set)
    }

    /// Load a template from disk and check that it names the input cube.
    ///
    /// Arguments
    /// -----------------
    /// * `path` – SoFiA 2 control file.
    ///
    /// Return
    /// ----------
    /// * The parsed template.
    /// * [`OptifindError::IoError`] if the file cannot be read,
    ///   [`OptifindError::TemplateParse`] on a malformed line,
    ///   [`OptifindError::MissingKey`] if `input.data` is absent or empty.
    pub fn load(path: &Utf8Path) -> Result<Self, OptifindError> {
        let text = fs::read_to_string(path)?;
        let set = Self::parse(&text)?;
        set.input_cube()?;
        Ok(set)
    }

    fn insert(&mut self, key: String, value: String) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Return a copy of `self` with the given settings replaced or appended.
    ///
    /// Existing keys keep their position; new keys are appended in the order given.
    /// `self` is left untouched.
    ///
    /// Arguments
    /// -----------------
    /// * `overrides` – `(key, value)` pairs to apply.
    ///
    /// Return
    /// ----------
    /// * A new [`ParameterSet`].
    pub fn with_overrides<I, K, V>(&self, overrides: I) -> ParameterSet
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut copy = self.clone();
        for (key, value) in overrides {
            copy.insert(key.into(), value.into());
        }
        copy
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&pos| self.entries[pos].1.as_str())
    }

    /// Value of `key`, treating an empty value as unset.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Boolean setting, `None` when unset or not a recognised boolean.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(parse_bool)
    }

    /// Path of the input data cube (`input.data`).
    pub fn input_cube(&self) -> Result<&Utf8Path, OptifindError> {
        self.get_non_empty(INPUT_DATA_KEY)
            .map(Utf8Path::new)
            .ok_or_else(|| OptifindError::MissingKey(INPUT_DATA_KEY.to_string()))
    }

    /// Base name of the output products: `output.filename`, or `optifind` if unset.
    pub fn output_basename(&self) -> &str {
        self.get_non_empty(OUTPUT_FILENAME_KEY)
            .unwrap_or(DEFAULT_BASENAME)
    }

    /// Directory receiving the output products.
    ///
    /// `output.directory` when set, otherwise the directory of the input cube (the
    /// SoFiA 2 default), or `.` for a cube given without a directory component.
    pub fn output_directory(&self) -> Utf8PathBuf {
        if let Some(dir) = self.get_non_empty(OUTPUT_DIRECTORY_KEY) {
            return Utf8PathBuf::from(dir);
        }
        self.get_non_empty(INPUT_DATA_KEY)
            .and_then(|cube| Utf8Path::new(cube).parent())
            .filter(|parent| !parent.as_str().is_empty())
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."))
    }

    /// Catalogue formats the source finder will write.
    pub fn catalogue_formats(&self) -> CatalogueFormats {
        let defaults = CatalogueFormats::default();
        CatalogueFormats {
            ascii: self.get_bool(WRITE_CAT_ASCII_KEY).unwrap_or(defaults.ascii),
            xml: self.get_bool(WRITE_CAT_XML_KEY).unwrap_or(defaults.xml),
            sql: self.get_bool(WRITE_CAT_SQL_KEY).unwrap_or(defaults.sql),
        }
    }

    /// Render the settings as control-file text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            // writing into a String cannot fail
            let _ = writeln!(out, "{key}\t=\t{value}");
        }
        out
    }

    /// Write the settings to `path` as a SoFiA 2 control file.
    pub fn serialize(&self, path: &Utf8Path) -> Result<(), OptifindError> {
        fs::write(path, self.to_text())?;
        Ok(())
    }
}
