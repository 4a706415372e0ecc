//! Filetype detection by content sniffing, extension and sibling files.

use std::{
    collections::BTreeMap,
    io::Read,
    path::Path,
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::storage::SourceFile;

/// One row of the detection table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    /// The module files of this kind are analysed with.
    pub module: String,
    /// File extensions including the dot, such as `.c`.
    pub extensions: Vec<String>,
    /// A substring of the content description, such as `C source`.
    pub magic: String,
}

impl Detection {
    fn new(module: &str, extensions: &[&str], magic: &str) -> Self {
        Self {
            module: module.to_string(),
            extensions: extensions.iter().map(ToString::to_string).collect(),
            magic: magic.to_string(),
        }
    }
}

/// The built-in detection table.
#[must_use]
pub fn default_detections() -> Vec<Detection> {
    vec![
        Detection::new("c", &[".c", ".h"], "C source"),
        Detection::new("cpp", &[".cpp", ".cc", ".cxx", ".hpp", ".hh"], "C source"),
        Detection::new(
            "php",
            &[".php", ".php3", ".php4", ".php5", ".phtml"],
            "PHP script",
        ),
        Detection::new("python", &[".py", ".pyw"], "Python script"),
    ]
}

/// Bytes read from sibling files when guessing by majority.
const SNIFF_LIMIT: u64 = 16 * 1024;

static PYTHON_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(import\s+\w|from\s+[\w.]+\s+import\s|(async\s+)?def\s+\w+\s*\(.*\)\s*(->.*)?:\s*$|class\s+\w+(\(.*\))?\s*:\s*$|if\s+__name__\s*==)",
    )
    .unwrap_or_else(|_| unreachable!("static regex"))
});

static C_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(#\s*(include|define|ifn?def|pragma)\b|(static\s+|extern\s+|const\s+)*(unsigned\s+|signed\s+)?(void|char|short|int|long|float|double|struct\s+\w+|[a-z_]+_t)\s+\**\s*\w+\s*[(\[;=])",
    )
    .unwrap_or_else(|_| unreachable!("static regex"))
});

/// Describes `contents` the way `file(1)` would, as far as the detection
/// table cares.
#[must_use]
pub fn sniff(contents: &str) -> &'static str {
    if contents.trim().is_empty() {
        return "empty";
    }
    if let Some(shebang) = contents.lines().next().filter(|l| l.starts_with("#!")) {
        if shebang.contains("python") {
            return "Python script, ASCII text executable";
        }
        if shebang.contains("php") {
            return "PHP script, ASCII text executable";
        }
        return "script, ASCII text executable";
    }
    if contents.contains("<?php") {
        return "PHP script, ASCII text";
    }
    if PYTHON_LINE.is_match(contents) {
        return "Python script, ASCII text executable";
    }
    if C_LINE.is_match(contents) {
        return "C source, ASCII text";
    }
    "ASCII text"
}

/// Decides which module a file belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detector {
    detections: Vec<Detection>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(default_detections())
    }
}

impl Detector {
    /// Uses the given detection table.
    #[must_use]
    pub const fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Rows whose extensions match `path`.
    #[must_use]
    pub fn by_extension(&self, path: &Path) -> Vec<&Detection> {
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return Vec::new();
        };
        let extension = format!(".{extension}");
        self.detections
            .iter()
            .filter(|d| d.extensions.contains(&extension))
            .collect()
    }

    /// Rows whose magic string occurs in `description`.
    #[must_use]
    pub fn by_magic(&self, description: &str) -> Vec<&Detection> {
        self.detections
            .iter()
            .filter(|d| description.contains(&d.magic))
            .collect()
    }

    /// Detects the module of `file`.
    ///
    /// A unique content match wins. Several content matches are narrowed
    /// down by extension; without a content match the extension decides.
    /// When that is still ambiguous the fallback is used, and without a
    /// fallback the majority of the sibling files decides.
    #[must_use]
    pub fn detect(&self, file: &SourceFile, fallback: Option<&str>) -> Option<String> {
        let path = file.path();
        let magic = self.by_magic(sniff(file.contents()));

        let possibilities = match magic.len() {
            0 => {
                tracing::warn!(
                    "No known magic number found for \"{}\", trying file extension instead.",
                    path.display()
                );
                self.by_extension(path)
            }
            1 => magic,
            _ => {
                let narrowed: Vec<_> = self
                    .by_extension(path)
                    .into_iter()
                    .filter(|d| magic.contains(d))
                    .collect();
                if narrowed.len() == 1 {
                    tracing::debug!(
                        "Magic number is not unique for \"{}\", narrowed down by file extension.",
                        path.display()
                    );
                } else {
                    tracing::warn!(
                        "Magic number is not unique for \"{}\" and the file extension does not decide.",
                        path.display()
                    );
                }
                if narrowed.is_empty() { magic } else { narrowed }
            }
        };

        if let [only] = possibilities.as_slice() {
            tracing::info!("\"{}\" detected as \"{}\".", path.display(), only.module);
            return Some(only.module.clone());
        }

        tracing::warn!(
            "Filetype for \"{}\" could not be reliably detected.",
            path.display()
        );
        if let Some(fallback) = fallback {
            if !possibilities.is_empty() && !possibilities.iter().any(|d| d.module == fallback) {
                tracing::warn!(
                    "Multiple possible modules detected for \"{}\", but fallback module \"{fallback}\" is not among them.",
                    path.display()
                );
            }
            tracing::debug!("Using fallback detection module \"{fallback}\".");
            return Some(fallback.to_string());
        }

        tracing::debug!("Falling back to heuristic detection.");
        self.heuristic(path, &possibilities)
    }

    /// The most common module among the files next to `path`, counting
    /// both extension and content matches. Subdirectories are ignored.
    #[must_use]
    pub fn heuristic(&self, path: &Path, possibilities: &[&Detection]) -> Option<String> {
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let Ok(entries) = std::fs::read_dir(directory) else {
            return None;
        };

        let mut siblings: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        siblings.sort();

        // module -> (count, first seen)
        let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        let mut seen = 0;
        for sibling in &siblings {
            let description = sniff(&read_prefix(sibling));
            let detected = self
                .by_extension(sibling)
                .into_iter()
                .chain(self.by_magic(description));
            for detection in detected {
                if !possibilities.is_empty() && !possibilities.contains(&detection) {
                    continue;
                }
                let entry = counts.entry(detection.module.as_str()).or_insert((0, seen));
                entry.0 += 1;
                seen += 1;
            }
        }

        let module = counts
            .into_iter()
            .max_by(|(_, (a, first_a)), (_, (b, first_b))| a.cmp(b).then(first_b.cmp(first_a)))
            .map(|(module, _)| module.to_string());
        match &module {
            Some(module) => tracing::debug!(
                "The most common module for files in \"{}\" seems to be \"{module}\".",
                directory.display()
            ),
            None => tracing::debug!(
                "No recognizable files in \"{}\", giving up on \"{}\".",
                directory.display(),
                path.display()
            ),
        }
        module
    }
}

fn read_prefix(path: &Path) -> String {
    let mut buffer = Vec::new();
    if let Ok(file) = std::fs::File::open(path) {
        let _ = file.take(SNIFF_LIMIT).read_to_end(&mut buffer);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("#!/usr/bin/env python3\nprint(1)\n", "Python script"; "python shebang")]
    #[test_case("<html><?php echo 1; ?></html>", "PHP script"; "php tag")]
    #[test_case("import os\n\nos.system('ls')\n", "Python script"; "python import")]
    #[test_case("#include <stdio.h>\nint main() {}\n", "C source"; "c include")]
    #[test_case("static int counter = 0;\n", "C source"; "c declaration")]
    #[test_case("Dear reader,\nhello.\n", "ASCII text"; "prose")]
    fn sniffing(contents: &str, expected: &str) {
        assert!(sniff(contents).contains(expected), "{}", sniff(contents));
    }

    #[test]
    fn unique_magic_wins_over_extension() {
        let file = SourceFile::from_contents("script.c", "#!/usr/bin/python\nprint(1)\n");
        assert_eq!(Detector::default().detect(&file, None).as_deref(), Some("python"));
    }

    #[test]
    fn shared_magic_is_narrowed_by_extension() {
        let file = SourceFile::from_contents("multiple-magic.cpp", "#include <iostream>\n");
        assert_eq!(Detector::default().detect(&file, None).as_deref(), Some("cpp"));
    }

    #[test]
    fn empty_files_use_the_extension() {
        let file = SourceFile::from_contents("empty.php", "");
        assert_eq!(Detector::default().detect(&file, None).as_deref(), Some("php"));
    }

    #[test]
    fn fallback_settles_ambiguity() {
        let file = SourceFile::from_contents("notes.txt", "plain words");
        let detector = Detector::default();
        assert_eq!(detector.detect(&file, Some("python")).as_deref(), Some("python"));
    }

    #[test]
    fn heuristic_uses_sibling_majority() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.c"), "int a;\n").unwrap();
        std::fs::write(tmp.path().join("b.c"), "int b;\n").unwrap();
        std::fs::write(tmp.path().join("c.py"), "import os\n").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("d.py"), "import os\n").unwrap();

        let path = tmp.path().join("include_statement");
        std::fs::write(&path, "#include \"a.h\"\n").unwrap();
        let file = SourceFile::read(&path).unwrap();

        assert_eq!(Detector::default().detect(&file, None).as_deref(), Some("c"));
    }

    #[test]
    fn unrecognisable_files_have_no_module() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("README");
        std::fs::write(&path, "nothing to see").unwrap();
        let file = SourceFile::read(&path).unwrap();
        assert_eq!(Detector::default().detect(&file, None), None);
    }
}
