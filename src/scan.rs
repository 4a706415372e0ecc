//! Analysing a whole source tree.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use rayon::prelude::*;

use crate::{
    analysis::{Analysis, AnalysisOptions, apply_all},
    domain::{Config, Ruleset, RulesetError},
    grammar,
    storage::{
        Detection, Detector, DiscoveryError, SourceFile, SourceFileError, compile_excludes,
        default_detections, find_files,
    },
};

/// Settings for [`analyze_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Per-file analysis settings.
    pub analysis: AnalysisOptions,
    /// Upper bound on the rounds per module.
    pub max_rounds: usize,
    /// Regular expressions of paths to skip.
    pub exclude: Vec<String>,
    /// Module used when detection is ambiguous.
    pub fallback: Option<String>,
    /// The filetype detection table.
    pub detection: Vec<Detection>,
    /// Directory with `<module>/sources` and `<module>/sinks` rule files.
    /// The built-in rules are used when unset.
    pub rules: Option<PathBuf>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ScanOptions {
    fn from(config: &Config) -> Self {
        Self {
            analysis: AnalysisOptions {
                lazy: config.lazy,
                max_paths: config.max_paths(),
                max_rounds: config.max_rounds(),
            },
            max_rounds: config.max_rounds(),
            exclude: config.exclude.clone(),
            fallback: config.fallback.clone(),
            detection: if config.detection.is_empty() {
                default_detections()
            } else {
                config.detection.clone()
            },
            rules: None,
        }
    }
}

/// Errors that stop a scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The input files could not be listed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The rules of a module could not be loaded.
    #[error(transparent)]
    Ruleset(#[from] RulesetError),
}

/// The outcome of a scan.
#[derive(Debug, Default)]
pub struct Scan {
    /// The analysed files in discovery order.
    pub analyses: Vec<Analysis>,
    /// The final rules of each module, learned rules included.
    pub rulesets: BTreeMap<String, Ruleset>,
    /// Files that were found but could not be analysed.
    pub skipped: Vec<PathBuf>,
}

/// Finds, detects and analyses every file below `path`.
///
/// The analyses of each module are repeated until its ruleset stops
/// changing, so a rule learned from one file applies to all of them.
///
/// Unreadable files and files without a grammar are logged and skipped.
///
/// # Errors
///
/// Fails if the files cannot be listed or a ruleset cannot be loaded.
pub fn analyze_files(path: &Path, options: &ScanOptions) -> Result<Scan, ScanError> {
    let exclude = compile_excludes(&options.exclude)?;
    let paths = find_files(path, &exclude)?;
    tracing::info!("Found {} files below {}.", paths.len(), path.display());

    let detector = Detector::new(options.detection.clone());
    let fallback = options.fallback.as_deref();
    let files: Vec<Result<SourceFile, PathBuf>> = paths
        .par_iter()
        .map(|path| {
            let mut file = SourceFile::read(path.as_path()).map_err(|e| {
                match e {
                    SourceFileError::Binary(_) => tracing::warn!("Skipping binary file: {e}"),
                    SourceFileError::Io { .. } => tracing::error!("{e}"),
                }
                path.clone()
            })?;
            if file.detect_filetype(&detector, fallback).is_none() {
                tracing::error!("Could not detect the filetype of {}.", path.display());
                return Err(path.clone());
            }
            Ok(file)
        })
        .collect();

    let mut scan = Scan::default();
    for file in files {
        let file = match file {
            Ok(file) => file,
            Err(path) => {
                scan.skipped.push(path);
                continue;
            }
        };
        let module = file.module().unwrap_or_default().to_string();
        let path = file.path().to_path_buf();
        let Some(grammar) = grammar::for_module(&module, file) else {
            tracing::error!(
                "No grammar for module \"{module}\" (supported: {}), skipping {}.",
                grammar::MODULES.join(", "),
                path.display()
            );
            scan.skipped.push(path);
            continue;
        };

        if !scan.rulesets.contains_key(&module) {
            let ruleset = load_ruleset(options.rules.as_deref(), &module)?;
            scan.rulesets.insert(module.clone(), ruleset);
        }
        tracing::debug!("Analysing {} as {module}.", path.display());
        scan.analyses.push(Analysis::with_options(grammar, options.analysis));
    }

    for (module, ruleset) in &mut scan.rulesets {
        settle(module, ruleset, &mut scan.analyses, options.max_rounds);
    }
    Ok(scan)
}

fn load_ruleset(dir: Option<&Path>, module: &str) -> Result<Ruleset, RulesetError> {
    let ruleset = match dir {
        Some(dir) => Ruleset::load(dir, module)?,
        None => Ruleset::builtin(module)?,
    };
    tracing::debug!(
        "Loaded {} sources and {} sinks for module \"{module}\".",
        ruleset.sources().len(),
        ruleset.sinks().len()
    );
    Ok(ruleset)
}

/// Reruns the analyses of `module` until `ruleset` stops changing. Returns
/// whether it settled within `max_rounds`.
fn settle(
    module: &str,
    ruleset: &mut Ruleset,
    analyses: &mut [Analysis],
    max_rounds: usize,
) -> bool {
    for round in 1..=max_rounds {
        let shared: &Ruleset = ruleset;
        let learned: Vec<_> = analyses
            .par_iter_mut()
            .filter(|analysis| analysis.module() == module)
            .flat_map_iter(|analysis| analysis.run(shared))
            .collect();
        if !apply_all(learned, ruleset) {
            tracing::debug!("Rules for module \"{module}\" settled after {round} rounds.");
            return true;
        }
    }
    tracing::warn!("Rules for module \"{module}\" still changing after {max_rounds} rounds.");
    false
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn learned_rules_apply_across_files() {
        let tmp = TempDir::new().unwrap();
        // The wrapper is only known to be a sink once b_lib.php is analysed.
        write(
            tmp.path(),
            "a_main.php",
            "<?php function main() { run($_GET['cmd']); } ?>",
        );
        write(
            tmp.path(),
            "b_lib.php",
            "<?php function run($command) { system($command); } ?>",
        );

        let scan = analyze_files(tmp.path(), &ScanOptions::default()).unwrap();
        assert_eq!(scan.analyses.len(), 2);
        assert!(scan.skipped.is_empty());

        let main = &scan.analyses[0].methods()[0];
        assert_eq!(main.name, "main");
        assert_eq!(main.taints.len(), 1);
        assert_eq!(main.taints[0].sink.name.name, "run");
        assert!(
            scan.rulesets["php"]
                .sinks()
                .iter()
                .any(|rule| rule.methods.iter().any(|m| m.name == "run"))
        );
    }

    #[test]
    fn files_without_grammar_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "widget.cpp", "int draw() { return 0; }\n");
        write(
            tmp.path(),
            "tool.c",
            "int main() { system(getenv(\"CMD\")); return 0; }\n",
        );

        let scan = analyze_files(tmp.path(), &ScanOptions::default()).unwrap();
        assert_eq!(scan.analyses.len(), 1);
        assert_eq!(scan.analyses[0].module(), "c");
        assert_eq!(scan.skipped, vec![tmp.path().join("widget.cpp")]);
        assert_eq!(scan.analyses[0].methods()[0].taints.len(), 1);
    }

    #[test]
    fn excluded_paths_are_not_read() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "vendor/lib.py", "def f():\n    eval(input())\n");
        write(tmp.path(), "app.py", "def g():\n    print(1)\n");

        let options = ScanOptions {
            exclude: vec!["vendor".to_string()],
            ..ScanOptions::default()
        };
        let scan = analyze_files(tmp.path(), &options).unwrap();
        assert_eq!(scan.analyses.len(), 1);
        assert!(scan.analyses[0].file().path().ends_with("app.py"));
    }

    #[test]
    fn rules_directory_replaces_builtin_rules() {
        let tmp = TempDir::new().unwrap();
        let rules = tmp.path().join("rules");
        write(&rules, "python/sources/input.yaml", "- methods:\n    - name: fetch\n");
        write(
            &rules,
            "python/sinks/eval.yaml",
            "- methods:\n    - name: run\n      comment: Runs code.\n",
        );
        let src = tmp.path().join("src");
        write(&src, "app.py", "def f():\n    run(fetch())\n    eval(input())\n");

        let options = ScanOptions {
            rules: Some(rules),
            ..ScanOptions::default()
        };
        let scan = analyze_files(&src, &options).unwrap();
        let method = &scan.analyses[0].methods()[0];
        assert_eq!(method.taints.len(), 1);
        assert_eq!(method.taints[0].sink.name.name, "run");
    }

    #[test]
    fn missing_input_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let error = analyze_files(&tmp.path().join("missing"), &ScanOptions::default());
        assert!(matches!(error, Err(ScanError::Discovery(_))));
    }
}
