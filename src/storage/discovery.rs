//! Finding the files to analyse.

use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

/// Errors raised while collecting input files.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The input path does not exist.
    #[error("{0} does not exist")]
    NotFound(PathBuf),

    /// An exclude pattern is not a valid regular expression.
    #[error("invalid exclude pattern {pattern:?}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        #[source]
        source: regex::Error,
    },

    /// The directory walk failed.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

/// Compiles exclude patterns.
///
/// # Errors
///
/// Returns [`DiscoveryError::Pattern`] for the first invalid pattern.
pub fn compile_excludes(patterns: &[String]) -> Result<Vec<Regex>, DiscoveryError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| DiscoveryError::Pattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// Lists the files below `path`.
///
/// Within a directory, files come before subdirectories and both are sorted
/// by name. A path matching any exclude pattern anywhere is skipped. A file
/// path yields itself.
///
/// # Errors
///
/// Fails if `path` does not exist or the directory cannot be walked.
pub fn find_files(path: &Path, exclude: &[Regex]) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !path.exists() {
        return Err(DiscoveryError::NotFound(path.to_path_buf()));
    }

    let excluded = |candidate: &Path| {
        let text = candidate.to_string_lossy();
        exclude.iter().any(|pattern| pattern.is_match(&text))
    };

    if !path.is_dir() {
        tracing::debug!("Single filename provided.");
        return Ok(if excluded(path) {
            Vec::new()
        } else {
            vec![path.to_path_buf()]
        });
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(path).sort_by(|a, b| {
        (a.file_type().is_dir(), a.file_name()).cmp(&(b.file_type().is_dir(), b.file_name()))
    });
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            tracing::debug!("Going into {}.", entry.path().display());
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if excluded(entry.path()) {
            tracing::debug!("Excluding {}.", entry.path().display());
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn tree() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("b_dir/inner")).unwrap();
        std::fs::create_dir_all(root.join("a_dir")).unwrap();
        for file in [
            "z.c",
            "m.php",
            "a_dir/one.py",
            "b_dir/two.c",
            "b_dir/inner/three.c",
        ] {
            std::fs::write(root.join(file), "").unwrap();
        }
        tmp
    }

    fn relative(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn files_before_directories() {
        let tmp = tree();
        let files = find_files(tmp.path(), &[]).unwrap();
        assert_eq!(
            relative(tmp.path(), &files),
            [
                "m.php",
                "z.c",
                "a_dir/one.py",
                "b_dir/two.c",
                "b_dir/inner/three.c"
            ]
        );
    }

    #[test_case(&[""], 0; "empty pattern excludes everything")]
    #[test_case(&[r"\.c$"], 2; "extension")]
    #[test_case(&["a_dir", "inner"], 3; "independent patterns")]
    fn exclusion(patterns: &[&str], expected: usize) {
        let tmp = tree();
        let patterns: Vec<String> = patterns.iter().map(ToString::to_string).collect();
        let exclude = compile_excludes(&patterns).unwrap();
        assert_eq!(find_files(tmp.path(), &exclude).unwrap().len(), expected);
    }

    #[test]
    fn single_file() {
        let tmp = tree();
        let file = tmp.path().join("z.c");
        assert_eq!(find_files(&file, &[]).unwrap(), [file]);
    }

    #[test]
    fn missing_path() {
        let tmp = tempfile::tempdir().unwrap();
        let error = find_files(&tmp.path().join("nope"), &[]).unwrap_err();
        assert!(matches!(error, DiscoveryError::NotFound(_)));
    }

    #[test]
    fn invalid_pattern() {
        let error = compile_excludes(&["(".to_string()]).unwrap_err();
        assert!(matches!(error, DiscoveryError::Pattern { .. }));
    }
}
