//! # Constants and type definitions for OptiFind
//!
//! This module centralizes the **parameter keys**, **file naming conventions**, and
//! **common type aliases** used throughout the `optifind` crate.
//!
//! ## Overview
//!
//! - SoFiA 2 parameter keys read or overridden for each per-source run
//! - Output naming (default base name, catalogue suffixes, merged catalogue name)
//! - Type aliases for pixel and world coordinates
//!
//! The keys follow the SoFiA 2 control file conventions (`section.name = value`).

// -------------------------------------------------------------------------------------------------
// SoFiA 2 parameter keys
// -------------------------------------------------------------------------------------------------

/// Path of the input data cube. Required in every template, never overridden.
pub const INPUT_DATA_KEY: &str = "input.data";

/// Combined region-of-interest key: `x_min, x_max, y_min, y_max, z_min, z_max`.
pub const INPUT_REGION_KEY: &str = "input.region";

/// Base name of all output products of a run.
pub const OUTPUT_FILENAME_KEY: &str = "output.filename";

/// Directory receiving the output products of a run.
pub const OUTPUT_DIRECTORY_KEY: &str = "output.directory";

/// Report source positions relative to the full cube instead of the sub-region.
pub const PARAMETER_OFFSET_KEY: &str = "parameter.offset";

/// Plain-text catalogue switch.
pub const WRITE_CAT_ASCII_KEY: &str = "output.writeCatASCII";

/// VOTable (XML) catalogue switch.
pub const WRITE_CAT_XML_KEY: &str = "output.writeCatXML";

/// SQL catalogue switch.
pub const WRITE_CAT_SQL_KEY: &str = "output.writeCatSQL";

// -------------------------------------------------------------------------------------------------
// Output naming
// -------------------------------------------------------------------------------------------------

/// Base name used when the template does not declare `output.filename`.
pub const DEFAULT_BASENAME: &str = "optifind";

/// Default name of the source finder executable.
pub const DEFAULT_SOFIA_EXECUTABLE: &str = "sofia";

/// Name of the merged catalogue written into the output directory.
pub const MERGED_CATALOGUE_NAME: &str = "optifind_merged_catalogue.txt";

/// Prefix of the per-source parameter files written into the work directory.
pub const PARAMETER_FILE_PREFIX: &str = "optifind_";

/// Extension of the per-source parameter files.
pub const PARAMETER_FILE_EXTENSION: &str = "par";

/// Suffix appended by SoFiA 2 to the plain-text catalogue.
pub const CATALOGUE_SUFFIX_ASCII: &str = "_cat.txt";

/// Suffix appended by SoFiA 2 to the VOTable catalogue.
pub const CATALOGUE_SUFFIX_XML: &str = "_cat.xml";

/// Suffix appended by SoFiA 2 to the SQL catalogue.
pub const CATALOGUE_SUFFIX_SQL: &str = "_cat.sql";

/// Name of the provenance column prepended to the merged catalogue.
pub const SOURCE_ID_COLUMN: &str = "source_id";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Zero-based, fractional pixel coordinate along one cube axis
pub type Pixel = f64;

/// World coordinate in the native units of the cube header (deg, Hz, m/s, ...)
pub type WorldValue = f64;

/// Source identifier as given in the first column of the source list
pub type SourceId = String;

/// Replace the characters SoFiA 2 cannot carry in an output file name.
///
/// Spaces become underscores and slashes become dashes, so `"Source 1"` yields
/// `"Source_1"` and `"J0123/45"` yields `"J0123-45"`.
pub fn sanitize_source_id(id: &str) -> String {
    id.replace(' ', "_").replace('/', "-")
}
