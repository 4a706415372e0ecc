//! A single file under analysis.

use std::{
    io,
    path::{Path, PathBuf},
};

use crate::storage::Detector;

/// A source file with cached contents and line offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    contents: String,
    line_starts: Vec<usize>,
    module: Option<String>,
}

/// Errors raised while reading a [`SourceFile`].
#[derive(Debug, thiserror::Error)]
pub enum SourceFileError {
    /// The file could not be read.
    #[error("failed to read {path}")]
    Io {
        /// The offending file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The file is not valid UTF-8 text.
    #[error("{0} looks like a binary file")]
    Binary(PathBuf),
}

impl SourceFile {
    /// Reads the file at `path` once. Windows line endings become `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceFileError::Io`] if the file cannot be read and
    /// [`SourceFileError::Binary`] if it is not UTF-8.
    pub fn read(path: impl Into<PathBuf>) -> Result<Self, SourceFileError> {
        let path = path.into();
        let bytes = std::fs::read(&path).map_err(|source| SourceFileError::Io {
            path: path.clone(),
            source,
        })?;
        match String::from_utf8(bytes) {
            Ok(contents) if contents.contains("\r\n") => {
                Ok(Self::from_contents(path, contents.replace("\r\n", "\n")))
            }
            Ok(contents) => Ok(Self::from_contents(path, contents)),
            Err(_) => Err(SourceFileError::Binary(path)),
        }
    }

    /// Wraps contents that are already in memory.
    #[must_use]
    pub fn from_contents(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let contents = contents.into();
        let line_starts = std::iter::once(0)
            .chain(contents.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self {
            path: path.into(),
            contents,
            line_starts,
            module: None,
        }
    }

    /// Where the file lives.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The whole file.
    #[must_use]
    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// The detected module, once [`SourceFile::detect_filetype`] ran.
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// Overrides the detected module.
    pub fn set_module(&mut self, module: impl Into<String>) {
        self.module = Some(module.into());
    }

    /// The 1-based line containing byte `offset`.
    #[must_use]
    pub fn column_to_line(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|start| *start <= offset)
    }

    /// The byte offset where 1-based `line` starts.
    #[must_use]
    pub fn line_to_column(&self, line: usize) -> Option<usize> {
        line.checked_sub(1)
            .and_then(|idx| self.line_starts.get(idx))
            .copied()
    }

    /// Detects the module with `detector` and stores it.
    pub fn detect_filetype(&mut self, detector: &Detector, fallback: Option<&str>) -> Option<&str> {
        self.module = detector.detect(self, fallback);
        self.module()
    }
}
