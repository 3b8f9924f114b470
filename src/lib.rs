//! Catalogue-driven source finding on sub-regions of a radio data cube.
//!
//! For every position of a source list, `optifind` cuts a box around the source out of
//! the cube, runs SoFiA 2 on it with a per-source copy of a parameter template, and
//! finally merges the per-source catalogues into a single table.
pub mod catalogue;
pub mod constants;
pub mod cube;
pub mod merge;
pub mod optifind_errors;
pub mod parameters;
pub mod region;
pub mod runner;
pub mod summary;
