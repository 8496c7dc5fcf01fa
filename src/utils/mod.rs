//! Utility functions for chandl

pub mod filename;
pub mod url;
