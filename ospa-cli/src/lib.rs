//! OpenSPA ADK control plane library
//!
//! Configuration, proof generation and proof synchronization, shared by the
//! `ospa-adk` binary and the fuzz targets.

pub mod config;
pub mod proof;
pub mod sync;
