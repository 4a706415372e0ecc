//! Static taint analysis for C, PHP and Python
//!
//! Source trees are split into methods, and user controlled data is traced
//! from sources to the arguments of dangerous calls (sinks). Methods that wrap
//! sources, sinks or sanitizers become rules themselves, so findings cross
//! method and file boundaries.

pub mod analysis;
pub use analysis::{Analysis, AnalysisOptions};

pub mod domain;
pub use domain::{Config, Method, Ruleset, Taint};

pub mod grammar;

pub mod report;
pub use report::{Format, Report};

pub mod scan;
pub use scan::{Scan, ScanOptions, analyze_files};

/// Reading, detecting and discovering source files.
pub mod storage;
pub use storage::SourceFile;
