//! The sources and sinks of one module, built in or loaded from disk, and
//! extended as the analysis learns new rules.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{
    domain::rule::{Rule, RuleMethod, Sanitizer},
    grammar::{Call, Identifier},
};

const BUILTIN: &[(&str, &str, &str)] = &[
    (
        "c",
        include_str!("../../rules/c/sources.yaml"),
        include_str!("../../rules/c/sinks.yaml"),
    ),
    (
        "php",
        include_str!("../../rules/php/sources.yaml"),
        include_str!("../../rules/php/sinks.yaml"),
    ),
    (
        "python",
        include_str!("../../rules/python/sources.yaml"),
        include_str!("../../rules/python/sinks.yaml"),
    ),
];

/// Addresses one method of one rule in a ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleRef {
    /// Index of the rule.
    pub rule: usize,
    /// Index of the method within the rule.
    pub method: usize,
}

/// Errors raised while loading rules.
#[derive(Debug, thiserror::Error)]
pub enum RulesetError {
    /// There are no built-in rules for the module.
    #[error("no built-in rules for module \"{0}\"")]
    UnknownModule(String),

    /// A rule file could not be read.
    #[error("failed to read {path}")]
    Read {
        /// The offending file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A rule file is not a valid YAML list of rules.
    #[error("failed to parse {path}")]
    Parse {
        /// The offending file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_yaml::Error,
    },

    /// The rule directory could not be walked.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

/// Sources and sinks of one module.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ruleset {
    module: String,
    sources: Vec<Rule>,
    sinks: Vec<Rule>,
}

impl Ruleset {
    /// A ruleset without rules.
    #[must_use]
    pub fn empty(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ..Self::default()
        }
    }

    /// The rules compiled into the binary.
    ///
    /// # Errors
    ///
    /// Fails if the module has no built-in rules.
    pub fn builtin(module: &str) -> Result<Self, RulesetError> {
        let (_, sources, sinks) = BUILTIN
            .iter()
            .find(|(name, _, _)| *name == module)
            .ok_or_else(|| RulesetError::UnknownModule(module.to_string()))?;
        let origin = |kind: &str| PathBuf::from(format!("rules/{module}/{kind}.yaml"));
        Ok(Self {
            module: module.to_string(),
            sources: parse(sources, origin("sources"))?,
            sinks: parse(sinks, origin("sinks"))?,
        })
    }

    /// Loads every `.yaml`/`.yml` file below `<dir>/<module>/sources` and
    /// `<dir>/<module>/sinks`. Missing directories contribute no rules.
    ///
    /// # Errors
    ///
    /// Fails if a file cannot be read or parsed.
    pub fn load(dir: &Path, module: &str) -> Result<Self, RulesetError> {
        let base = dir.join(module);
        if !base.is_dir() {
            tracing::warn!("No rules found for module \"{module}\" in {}.", dir.display());
        }
        Ok(Self {
            module: module.to_string(),
            sources: load_rules(&base.join("sources"))?,
            sinks: load_rules(&base.join("sinks"))?,
        })
    }

    /// Replaces the sources.
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Rule>) -> Self {
        self.sources = sources;
        self
    }

    /// Replaces the sinks.
    #[must_use]
    pub fn with_sinks(mut self, sinks: Vec<Rule>) -> Self {
        self.sinks = sinks;
        self
    }

    /// The module the rules belong to.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// All source rules.
    #[must_use]
    pub fn sources(&self) -> &[Rule] {
        &self.sources
    }

    /// All sink rules.
    #[must_use]
    pub fn sinks(&self) -> &[Rule] {
        &self.sinks
    }

    /// The source method referenced by `rule`.
    #[must_use]
    pub fn source_method(&self, rule: RuleRef) -> Option<&RuleMethod> {
        self.sources.get(rule.rule)?.methods.get(rule.method)
    }

    /// The sink method referenced by `rule`.
    #[must_use]
    pub fn sink_method(&self, rule: RuleRef) -> Option<&RuleMethod> {
        self.sinks.get(rule.rule)?.methods.get(rule.method)
    }

    /// Every source method matching `call`.
    #[must_use]
    pub fn sources_for_call(&self, call: &Call) -> Vec<RuleRef> {
        matches(&self.sources, call)
    }

    /// Every sink method matching `call`.
    #[must_use]
    pub fn sinks_for_call(&self, call: &Call) -> Vec<RuleRef> {
        matches(&self.sinks, call)
    }

    /// Whether `identifier` is a source variable.
    #[must_use]
    pub fn is_source_variable(&self, identifier: &Identifier) -> bool {
        self.sources.iter().any(|r| r.matches_variable(identifier))
    }

    /// Adds a source unless an equal one exists. Returns whether the
    /// ruleset changed.
    pub fn add_source(&mut self, rule: Rule) -> bool {
        add(&mut self.sources, rule)
    }

    /// Adds a sink unless one with the same signature exists, in which case
    /// the sanitizers are merged. Returns whether the ruleset changed.
    pub fn add_sink(&mut self, rule: Rule) -> bool {
        add(&mut self.sinks, rule)
    }

    /// Adds a sanitizer to the sink method `sink` unless an equal one exists.
    /// A lower level replaces a higher one. Returns whether the ruleset
    /// changed.
    pub fn add_sanitizer(&mut self, sink: RuleRef, sanitizer: Sanitizer) -> bool {
        let Some(method) = self
            .sinks
            .get_mut(sink.rule)
            .and_then(|rule| rule.methods.get_mut(sink.method))
        else {
            return false;
        };
        merge_sanitizer(&mut method.sanitizers, sanitizer)
    }
}

fn matches(rules: &[Rule], call: &Call) -> Vec<RuleRef> {
    rules
        .iter()
        .enumerate()
        .flat_map(|(rule, r)| {
            r.matching_methods(call)
                .map(move |method| RuleRef { rule, method })
        })
        .collect()
}

fn merge_sanitizer(sanitizers: &mut Vec<Sanitizer>, sanitizer: Sanitizer) -> bool {
    match sanitizers.iter_mut().find(|s| s.rule == sanitizer.rule) {
        Some(existing) if existing.level > sanitizer.level => {
            existing.level = sanitizer.level;
            true
        }
        Some(_) => false,
        None => {
            sanitizers.push(sanitizer);
            true
        }
    }
}

fn add(rules: &mut Vec<Rule>, rule: Rule) -> bool {
    let mut changed = false;
    let mut missing = Vec::new();

    for method in rule.methods {
        let existing = rules
            .iter_mut()
            .filter(|r| r.object == rule.object)
            .flat_map(|r| r.methods.iter_mut())
            .find(|m| m.same_signature(&method));
        match existing {
            Some(existing) => {
                for sanitizer in method.sanitizers {
                    changed |= merge_sanitizer(&mut existing.sanitizers, sanitizer);
                }
            }
            None => missing.push(method),
        }
    }

    let new_variables: Vec<String> = rule
        .variables
        .into_iter()
        .filter(|v| {
            !rules
                .iter()
                .any(|r| r.object == rule.object && r.variables.contains(v))
        })
        .collect();

    if !missing.is_empty() || !new_variables.is_empty() {
        rules.push(Rule {
            object: rule.object,
            methods: missing,
            variables: new_variables,
        });
        changed = true;
    }
    changed
}

fn parse(contents: &str, path: PathBuf) -> Result<Vec<Rule>, RulesetError> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(contents).map_err(|source| RulesetError::Parse { path, source })
}

fn load_rules(dir: &Path) -> Result<Vec<Rule>, RulesetError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut rules = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let is_yaml = entry
            .path()
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml");
        if !entry.file_type().is_file() || !is_yaml {
            continue;
        }
        let contents =
            std::fs::read_to_string(entry.path()).map_err(|source| RulesetError::Read {
                path: entry.path().to_path_buf(),
                source,
            })?;
        let loaded = parse(&contents, entry.path().to_path_buf())?;
        tracing::debug!("Loaded {} rules from {}.", loaded.len(), entry.path().display());
        rules.extend(loaded);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::rule::ParameterPattern;

    #[test_case("c"; "c")]
    #[test_case("php"; "php")]
    #[test_case("python"; "python")]
    fn builtin_rules_parse(module: &str) {
        let ruleset = Ruleset::builtin(module).unwrap();
        assert!(!ruleset.sources().is_empty());
        assert!(!ruleset.sinks().is_empty());
    }

    #[test]
    fn unknown_builtin_module() {
        assert!(matches!(
            Ruleset::builtin("cobol"),
            Err(RulesetError::UnknownModule(_))
        ));
    }

    #[test]
    fn load_walks_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        let sources = tmp.path().join("c/sources/nested");
        std::fs::create_dir_all(&sources).unwrap();
        std::fs::create_dir_all(tmp.path().join("c/sinks")).unwrap();
        std::fs::write(
            sources.join("env.yml"),
            "- methods:\n    - name: getenv\n      comment: environment\n",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("c/sinks/system.yaml"),
            "- methods:\n    - name: system\n      parameters: [$TAINT]\n      comment: shell\n",
        )
        .unwrap();
        std::fs::write(tmp.path().join("c/sinks/README.md"), "ignored").unwrap();

        let ruleset = Ruleset::load(tmp.path(), "c").unwrap();
        assert_eq!(ruleset.sources().len(), 1);
        assert_eq!(ruleset.sinks().len(), 1);
        assert_eq!(
            ruleset.sinks()[0].methods[0].parameters,
            [ParameterPattern::Taint]
        );
    }

    #[test]
    fn load_reports_broken_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("c/sinks")).unwrap();
        std::fs::write(tmp.path().join("c/sinks/bad.yaml"), "- methods: [").unwrap();
        assert!(matches!(
            Ruleset::load(tmp.path(), "c"),
            Err(RulesetError::Parse { .. })
        ));
    }

    #[test]
    fn adding_rules_reports_changes() {
        let mut ruleset = Ruleset::empty("c");
        let rule = Rule::method(None, RuleMethod::new("wrapper", "shell").with_taint_at(0));
        assert!(ruleset.add_sink(rule.clone()));
        assert!(!ruleset.add_sink(rule));
        assert_eq!(ruleset.sinks().len(), 1);

        let other = Rule::method(Some("Shell".into()), RuleMethod::new("wrapper", "shell"));
        assert!(ruleset.add_sink(other));
        assert_eq!(ruleset.sinks().len(), 2);
    }

    #[test]
    fn sanitizers_keep_the_lowest_level() {
        let mut ruleset = Ruleset::empty("c")
            .with_sinks(vec![Rule::method(None, RuleMethod::new("system", "shell"))]);
        let sink = RuleRef { rule: 0, method: 0 };
        let sanitizer = |level| Sanitizer {
            rule: Rule::method(None, RuleMethod::new("quote", "")),
            level,
        };

        assert!(ruleset.add_sanitizer(sink, sanitizer(2)));
        assert!(!ruleset.add_sanitizer(sink, sanitizer(3)));
        assert!(ruleset.add_sanitizer(sink, sanitizer(1)));
        let sanitizers = &ruleset.sink_method(sink).unwrap().sanitizers;
        assert_eq!(sanitizers.len(), 1);
        assert_eq!(sanitizers[0].level, 1);
    }

    #[test]
    fn learned_sinks_merge_sanitizers() {
        let mut ruleset = Ruleset::empty("c");
        let mut method = RuleMethod::new("wrapper", "shell").with_taint_at(0);
        assert!(ruleset.add_sink(Rule::method(None, method.clone())));

        method.sanitizers.push(Sanitizer {
            rule: Rule::method(None, RuleMethod::new("quote", "")),
            level: 0,
        });
        assert!(ruleset.add_sink(Rule::method(None, method.clone())));
        assert!(!ruleset.add_sink(Rule::method(None, method)));
        assert_eq!(ruleset.sinks().len(), 1);
        assert_eq!(ruleset.sinks()[0].methods[0].sanitizers.len(), 1);
    }
}
