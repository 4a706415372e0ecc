mod detection;
mod discovery;
mod source_file;

pub use detection::{Detection, Detector, default_detections, sniff};
pub use discovery::{DiscoveryError, compile_excludes, find_files};
pub use source_file::{SourceFile, SourceFileError};
