//! Analysis of one source file.
//!
//! An [`Analysis`] splits a file into [`Method`]s and applies a [`Ruleset`]
//! to each of them: it finds source, sink and sanitizer calls, enumerates
//! execution paths, traces sink arguments back to user input and proposes
//! new rules for methods that wrap sources, sinks or sanitizers.

mod dataflow;
mod learning;
mod paths;
mod taint;

use std::fmt;

pub use dataflow::{DataFlow, Event, EventKind};
pub use learning::{Learned, apply_all};
pub use paths::find_paths;
pub use taint::{Reach, Tracer};

use crate::{
    domain::{
        ExecutionPath, Method, OriginKind, Rule, RuleMethod, RuleRef, Ruleset, Sanitizer, Taint,
        method::{AppliedSanitizer, SanitizerMatch, SinkMatch, SourceMatch},
    },
    grammar::{Call, CallKind, Grammar, Term},
    storage::SourceFile,
};

/// How thoroughly methods are analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Treat every method as a single path.
    pub lazy: bool,
    /// Methods with more paths are treated as a single path.
    pub max_paths: usize,
    /// Upper bound on the rounds of [`Analysis::analyze`].
    pub max_rounds: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            lazy: false,
            max_paths: 512,
            max_rounds: 10,
        }
    }
}

/// The analysis of one file.
///
/// Per-method operations take the index of the method in
/// [`Analysis::methods`] and panic if it is out of range.
pub struct Analysis {
    grammar: Box<dyn Grammar>,
    options: AnalysisOptions,
    methods: Vec<Method>,
    flows: Vec<DataFlow>,
    globals: Vec<String>,
}

impl fmt::Debug for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analysis")
            .field("file", &self.file().path())
            .field("module", &self.module())
            .field("options", &self.options)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

impl Analysis {
    /// Discovers the methods of the grammar's file with default options.
    #[must_use]
    pub fn new(grammar: Box<dyn Grammar>) -> Self {
        Self::with_options(grammar, AnalysisOptions::default())
    }

    /// Discovers the methods of the grammar's file and extracts their
    /// statements, complexity, data flow and paths.
    #[must_use]
    pub fn with_options(grammar: Box<dyn Grammar>, options: AnalysisOptions) -> Self {
        let classes = grammar.class_definitions();
        let methods: Vec<Method> = grammar
            .method_definitions()
            .into_iter()
            .map(|definition| {
                let mut method = Method::new(definition);
                method.class = classes
                    .iter()
                    .filter(|class| class.span.encloses(method.span))
                    .min_by_key(|class| class.span.len())
                    .map(|class| class.name.clone());
                method.calls = grammar.method_calls(method.body);
                method.assignments = grammar.assignments(method.body);
                method.declarations = grammar.declarations(method.body);
                method.returns = grammar.returns(method.body);
                tracing::debug!(
                    "Found method \"{}\" with {} calls in {}.",
                    method.name,
                    method.calls.len(),
                    grammar.file().path().display()
                );
                method
            })
            .collect();

        let mut analysis = Self {
            globals: grammar.global_variables(),
            flows: vec![DataFlow::default(); methods.len()],
            grammar,
            options,
            methods,
        };
        for idx in 0..analysis.methods.len() {
            analysis.fix_object_names(idx);
            analysis.calculate_complexity(idx);
            analysis.follow_variables(idx);
            analysis.find_paths_through(idx);
        }
        analysis
    }

    /// The analysed file.
    #[must_use]
    pub fn file(&self) -> &SourceFile {
        self.grammar.file()
    }

    /// The module the file is analysed as.
    #[must_use]
    pub fn module(&self) -> &'static str {
        self.grammar.module()
    }

    /// The grammar used.
    #[must_use]
    pub fn grammar(&self) -> &dyn Grammar {
        self.grammar.as_ref()
    }

    /// The options in effect.
    #[must_use]
    pub const fn options(&self) -> AnalysisOptions {
        self.options
    }

    /// The methods found in the file.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Variables defined outside every method.
    #[must_use]
    pub fn globals(&self) -> &[String] {
        &self.globals
    }

    /// Computes and stores the cyclomatic complexity of a method.
    pub fn calculate_complexity(&mut self, idx: usize) -> usize {
        let body = self.methods[idx].body;
        let complexity =
            (self.grammar.edge_count(body) + 2).saturating_sub(self.grammar.node_count(body));
        self.methods[idx].complexity = Some(complexity);
        complexity
    }

    /// Computes and stores the data flow of a method.
    pub fn follow_variables(&mut self, idx: usize) -> &DataFlow {
        self.flows[idx] = DataFlow::follow(&self.methods[idx]);
        &self.flows[idx]
    }

    /// The events that define `variable` when it is read at `position`,
    /// latest first, following assignments back to their inputs.
    #[must_use]
    pub fn find_variable_source(&self, idx: usize, variable: &str, position: usize) -> Vec<Event> {
        let method = &self.methods[idx];
        let path = ExecutionPath::whole(method.body);
        Tracer::new(method, &self.flows[idx], None, &self.globals, &path)
            .variable(variable, position)
            .trail
    }

    /// Replaces the object of calls on `this`/`self` with the enclosing
    /// class, and the object of calls on variables built by a constructor
    /// with the constructed class.
    pub fn fix_object_names(&mut self, idx: usize) {
        let self_identifier = self.grammar.self_identifier();
        let method = &mut self.methods[idx];

        let mut renames: Vec<(String, String)> = Vec::new();
        if let (Some(this), Some(class)) = (self_identifier, &method.class) {
            renames.push((this.to_string(), class.clone()));
        }
        for assignment in &method.assignments {
            if let [Term::Call(call)] = assignment.value.terms.as_slice() {
                if call.kind == CallKind::Constructor && assignment.target.object.is_empty() {
                    renames.push((assignment.target.name.clone(), call.name.to_string()));
                }
            }
        }
        if renames.is_empty() {
            return;
        }

        let mut rename = |call: &mut Call| {
            if call.kind == CallKind::Chained {
                return;
            }
            if let Some(first) = call.name.object.first_mut() {
                if let Some((_, class)) = renames.iter().find(|(from, _)| *from == *first) {
                    first.clone_from(class);
                }
            }
        };
        for call in &mut method.calls {
            call.for_each_call_mut(&mut rename);
        }
        for assignment in &mut method.assignments {
            assignment.value.for_each_call_mut(&mut rename);
        }
        for value in method.returns.iter_mut().filter_map(|r| r.value.as_mut()) {
            value.for_each_call_mut(&mut rename);
        }
    }

    /// Records the calls of a method that match a source. Returns how many
    /// are new.
    pub fn find_sources(&mut self, idx: usize, ruleset: &Ruleset) -> usize {
        let method = &mut self.methods[idx];
        let found: Vec<SourceMatch> = method
            .calls
            .iter()
            .flat_map(|call| {
                ruleset
                    .sources_for_call(call)
                    .into_iter()
                    .map(|rule| SourceMatch {
                        call: call.clone(),
                        rule,
                    })
            })
            .collect();
        found
            .into_iter()
            .map(|source| method.add_source(source))
            .filter(|added| *added)
            .count()
    }

    /// Records the calls of a method that match a sink. Returns how many
    /// are new.
    pub fn find_sinks(&mut self, idx: usize, ruleset: &Ruleset) -> usize {
        let method = &mut self.methods[idx];
        let found: Vec<SinkMatch> = method
            .calls
            .iter()
            .flat_map(|call| {
                ruleset.sinks_for_call(call).into_iter().map(|rule| SinkMatch {
                    call: call.clone(),
                    rule,
                    comment: ruleset
                        .sink_method(rule)
                        .map(|m| m.comment.clone())
                        .unwrap_or_default(),
                })
            })
            .collect();
        found
            .into_iter()
            .map(|sink| method.add_sink(sink))
            .filter(|added| *added)
            .count()
    }

    /// Records the calls of a method that match a sanitizer of any sink.
    /// Returns how many are new.
    pub fn find_sanitizers(&mut self, idx: usize, ruleset: &Ruleset) -> usize {
        let method = &mut self.methods[idx];
        let mut found = Vec::new();
        for (rule_idx, rule) in ruleset.sinks().iter().enumerate() {
            for (method_idx, sink) in rule.methods.iter().enumerate() {
                let sink_ref = RuleRef {
                    rule: rule_idx,
                    method: method_idx,
                };
                for sanitizer in &sink.sanitizers {
                    found.extend(
                        method
                            .calls
                            .iter()
                            .filter(|call| sanitizer.rule.match_call(call).is_some())
                            .map(|call| SanitizerMatch {
                                call: call.clone(),
                                sink: sink_ref,
                                level: sanitizer.level,
                            }),
                    );
                }
            }
        }
        found
            .into_iter()
            .map(|sanitizer| method.add_sanitizer(sanitizer))
            .filter(|added| *added)
            .count()
    }

    /// Computes and stores the execution paths of a method.
    ///
    /// In lazy mode, or when there are more than
    /// [`AnalysisOptions::max_paths`], the whole body is one path.
    pub fn find_paths_through(&mut self, idx: usize) -> &[ExecutionPath] {
        let body = self.methods[idx].body;
        let whole = || vec![ExecutionPath::whole(body)];
        let paths = if self.options.lazy {
            whole()
        } else if let Some(paths) = find_paths(self.grammar.as_ref(), body, self.options.max_paths)
        {
            paths
        } else {
            tracing::warn!(
                "Method \"{}\" has more than {} paths, analysing it as a single path.",
                self.methods[idx].name,
                self.options.max_paths
            );
            whole()
        };
        self.methods[idx].paths = paths;
        &self.methods[idx].paths
    }

    /// Records the taints of a method along `path`. Returns how many are
    /// new or worse than the known taint of their sink argument.
    pub fn find_taints(&mut self, idx: usize, ruleset: &Ruleset, path: &ExecutionPath) -> usize {
        let method = &self.methods[idx];
        let tracer = Tracer::new(method, &self.flows[idx], Some(ruleset), &self.globals, path);

        let mut taints = Vec::new();
        for sink in method.sinks.iter().filter(|s| path.covers(s.call.span)) {
            for (argument, reach) in sink_arguments(&tracer, sink, ruleset) {
                let Some(origin) = reach.origins.first() else {
                    continue;
                };
                taints.push(Taint {
                    sink: sink.call.clone(),
                    rule: sink.rule,
                    comment: sink.comment.clone(),
                    argument,
                    origin: origin.clone(),
                    sanitizer: applicable_sanitizer(method, sink, &reach, path),
                });
            }
        }

        let method = &mut self.methods[idx];
        taints
            .into_iter()
            .map(|taint| method.add_taint(taint))
            .filter(|added| *added)
            .count()
    }

    /// Proposes rules for a method that wraps a source, sink or sanitizer.
    #[must_use]
    pub fn learn(&self, idx: usize, ruleset: &Ruleset) -> Vec<Learned> {
        let method = &self.methods[idx];
        let object = &method.class;
        let mut learned = Vec::new();

        for path in &method.paths {
            let tracer = Tracer::new(method, &self.flows[idx], Some(ruleset), &self.globals, path);

            for sink in method.sinks.iter().filter(|s| path.covers(s.call.span)) {
                let Some(sink_method) = ruleset.sink_method(sink.rule) else {
                    continue;
                };
                for (_, reach) in sink_arguments(&tracer, sink, ruleset) {
                    if applicable_sanitizer(method, sink, &reach, path).is_some() {
                        continue;
                    }
                    for &parameter in &reach.parameters {
                        let mut wrapper = RuleMethod::new(&method.name, &sink_method.comment)
                            .with_taint_at(parameter);
                        wrapper.sanitizers.clone_from(&sink_method.sanitizers);
                        learned.push(Learned::Sink(Rule::method(object.clone(), wrapper)));
                    }
                }
            }

            for ret in method.returns.iter().filter(|r| path.covers(r.span)) {
                let Some(value) = &ret.value else {
                    continue;
                };
                let reach = tracer.expression(value, ret.span.start);
                if let Some(origin) = reach.origins.iter().find(|o| o.kind != OriginKind::Global) {
                    let comment = format!("Returns user controlled input from {}.", origin.name);
                    learned.push(Learned::Source(Rule::method(
                        object.clone(),
                        RuleMethod::new(&method.name, comment),
                    )));
                }
            }
        }

        for source in &method.sources {
            let Some(source_method) = ruleset.source_method(source.rule) else {
                continue;
            };
            for position in source_method.taint_positions() {
                let parameter = source
                    .call
                    .args
                    .get(position)
                    .and_then(|arg| arg.as_variable())
                    .and_then(|variable| method.parameter_index(variable));
                if let Some(parameter) = parameter {
                    let comment = format!(
                        "Writes user controlled input from {} into a parameter.",
                        source.call.name
                    );
                    learned.push(Learned::Source(Rule::method(
                        object.clone(),
                        RuleMethod::new(&method.name, comment).with_taint_at(parameter),
                    )));
                }
            }
        }

        for sanitizer in &method.sanitizers {
            let on_parameter = sanitizer.call.args.is_empty()
                || sanitizer.call.args.iter().any(|arg| {
                    arg.variables()
                        .iter()
                        .any(|v| method.parameter_index(v).is_some())
                });
            if on_parameter {
                let comment = format!("Calls sanitizer {}.", sanitizer.call.name);
                learned.push(Learned::Sanitizer {
                    sink: sanitizer.sink,
                    sanitizer: Sanitizer {
                        rule: Rule::method(object.clone(), RuleMethod::new(&method.name, comment)),
                        level: sanitizer.level + 1,
                    },
                });
            }
        }

        learned
    }

    /// Applies `ruleset` to every method and returns the rules learned.
    /// Earlier findings are discarded.
    pub fn run(&mut self, ruleset: &Ruleset) -> Vec<Learned> {
        let mut learned = Vec::new();
        for idx in 0..self.methods.len() {
            self.methods[idx].clear_findings();
            self.find_sources(idx, ruleset);
            self.find_sinks(idx, ruleset);
            self.find_sanitizers(idx, ruleset);
            let paths = self.methods[idx].paths.clone();
            for path in &paths {
                self.find_taints(idx, ruleset, path);
            }
            learned.extend(self.learn(idx, ruleset));
        }
        learned
    }

    /// Runs the analysis until `ruleset` stops changing, at most
    /// [`AnalysisOptions::max_rounds`] times. Returns whether it settled.
    pub fn analyze(&mut self, ruleset: &mut Ruleset) -> bool {
        for round in 1..=self.options.max_rounds {
            let learned = self.run(ruleset);
            if !apply_all(learned, ruleset) {
                tracing::debug!(
                    "Analysis of {} settled after {round} rounds.",
                    self.file().path().display()
                );
                return true;
            }
        }
        tracing::warn!(
            "Rules learned from {} still changing after {} rounds.",
            self.file().path().display(),
            self.options.max_rounds
        );
        false
    }
}

/// The traced sink arguments at `$TAINT` positions, or at every position
/// when the rule marks none.
fn sink_arguments(tracer: &Tracer<'_>, sink: &SinkMatch, ruleset: &Ruleset) -> Vec<(usize, Reach)> {
    let marked = ruleset
        .sink_method(sink.rule)
        .map(RuleMethod::taint_positions)
        .unwrap_or_default();
    let positions: Vec<usize> = if marked.is_empty() {
        (0..sink.call.args.len()).collect()
    } else {
        marked
    };
    positions
        .into_iter()
        .filter_map(|position| {
            let arg = sink.call.args.get(position)?;
            Some((position, tracer.expression(arg, sink.call.span.start)))
        })
        .collect()
}

/// The lowest level sanitizer of `sink` that defuses `reach` on `path`.
///
/// It must run before the sink or inside its arguments, and its own
/// arguments must carry the traced calls or variables. Argument-free
/// sanitizers apply only before the sink.
fn applicable_sanitizer(
    method: &Method,
    sink: &SinkMatch,
    reach: &Reach,
    path: &ExecutionPath,
) -> Option<AppliedSanitizer> {
    method
        .sanitizers
        .iter()
        .filter(|s| s.sink == sink.rule && path.covers(s.call.span))
        .filter(|s| {
            if s.call.span.end <= sink.call.span.start {
                s.call.args.is_empty() || touches(&s.call, reach)
            } else {
                sink.call.span.encloses(s.call.span) && touches(&s.call, reach)
            }
        })
        .min_by_key(|s| s.level)
        .map(|s| AppliedSanitizer {
            name: s.call.name.to_string(),
            level: s.level,
        })
}

/// Whether the arguments of `call` read a traced variable or contain a
/// traced call.
fn touches(call: &Call, reach: &Reach) -> bool {
    call.args.iter().any(|arg| {
        arg.variables().iter().any(|v| reach.variables.contains(*v))
            || reach.calls.iter().any(|traced| arg.span.encloses(*traced))
    })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::grammar;

    fn fixture(module: &str, path: &str) -> Analysis {
        let full = format!("{}/testdata/{path}", env!("CARGO_MANIFEST_DIR"));
        let file = SourceFile::read(full).unwrap();
        Analysis::new(grammar::for_module(module, file).unwrap())
    }

    fn inline(module: &str, source: &str) -> Analysis {
        let file = SourceFile::from_contents(format!("inline.{module}"), source);
        Analysis::new(grammar::for_module(module, file).unwrap())
    }

    fn method<'a>(analysis: &'a Analysis, name: &str) -> &'a Method {
        analysis.methods().iter().find(|m| m.name == name).unwrap()
    }

    #[test_case("c", "analysis/euclid-complexity.c"; "c")]
    #[test_case("python", "analysis/euclid-complexity.py"; "python")]
    fn euclid_complexity(module: &str, path: &str) {
        let analysis = fixture(module, path);
        assert_eq!(analysis.methods().len(), 1);
        assert_eq!(analysis.methods()[0].complexity, Some(5));
    }

    #[test]
    fn getenv_reaches_sprintf_once() {
        let mut analysis = fixture("c", "analysis/getenv-sprintf.c");
        let mut ruleset = Ruleset::builtin("c").unwrap();
        assert!(analysis.analyze(&mut ruleset));

        let main = method(&analysis, "main");
        assert_eq!(main.paths.len(), 2);
        assert_eq!(main.sinks.len(), 4);
        assert_eq!(main.taints.len(), 1);

        let taint = &main.taints[0];
        assert_eq!(taint.sink.name.name, "sprintf");
        assert_eq!(taint.argument, 2);
        assert_eq!(taint.origin.kind, OriginKind::Source);
        assert_eq!(taint.origin.name, "getenv");
        assert!(taint.sanitizer.is_none());
    }

    #[test]
    fn variable_sources_follow_assignments() {
        let analysis = fixture("c", "analysis/getenv-sprintf.c");
        let contents = analysis.file().contents();
        let position = contents.rfind("sprintf").unwrap();

        let trail = analysis.find_variable_source(0, "env_editor", position);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].kind, EventKind::Assignment(0));
    }

    #[test]
    fn path_options() {
        let source = "void f(int a) { if (a) g(); if (a) h(); }";
        let file = || SourceFile::from_contents("inline.c", source);

        let full = Analysis::new(grammar::for_module("c", file()).unwrap());
        assert_eq!(full.methods()[0].paths.len(), 4);

        let lazy = AnalysisOptions {
            lazy: true,
            ..AnalysisOptions::default()
        };
        let lazy = Analysis::with_options(grammar::for_module("c", file()).unwrap(), lazy);
        assert_eq!(lazy.methods()[0].paths.len(), 1);

        let capped = AnalysisOptions {
            max_paths: 3,
            ..AnalysisOptions::default()
        };
        let capped = Analysis::with_options(grammar::for_module("c", file()).unwrap(), capped);
        assert_eq!(
            capped.methods()[0].paths,
            [ExecutionPath::whole(capped.methods()[0].body)]
        );
    }

    #[test]
    fn wrappers_of_sinks_become_sinks() {
        let mut analysis = inline(
            "php",
            "<?php\nfunction run($cmd) { system($cmd); }\nfunction main() { run($_GET['c']); }\n?>",
        );
        let mut ruleset = Ruleset::builtin("php").unwrap();

        let learned = analysis.run(&ruleset);
        assert!(method(&analysis, "main").taints.is_empty());
        assert!(apply_all(learned, &mut ruleset));

        assert!(analysis.analyze(&mut ruleset));
        let main = method(&analysis, "main");
        assert_eq!(main.taints.len(), 1);
        assert_eq!(main.taints[0].origin.kind, OriginKind::Variable);
        assert_eq!(main.taints[0].origin.name, "_GET");
        assert_eq!(
            main.taints[0].comment,
            "Executes a shell command, allowing command injection."
        );
    }

    #[test]
    fn wrappers_of_sanitizers_are_one_level_deeper() {
        let mut analysis = inline(
            "php",
            "<?php\nfunction quote($x) { return escapeshellarg($x); }\nfunction main() { system(quote($_GET['c'])); }\n?>",
        );
        let mut ruleset = Ruleset::builtin("php").unwrap();
        assert!(analysis.analyze(&mut ruleset));

        let main = method(&analysis, "main");
        assert_eq!(main.taints.len(), 1);
        let sanitizer = main.taints[0].sanitizer.as_ref().unwrap();
        assert_eq!(sanitizer.name, "quote");
        assert_eq!(sanitizer.level, 1);
    }

    #[test]
    fn sanitizers_before_the_sink_apply() {
        let mut analysis = inline(
            "php",
            "<?php\nfunction main() { $c = escapeshellarg($_GET['c']); system($c); }\n?>",
        );
        let mut ruleset = Ruleset::builtin("php").unwrap();
        assert!(analysis.analyze(&mut ruleset));

        let taint = &method(&analysis, "main").taints[0];
        let sanitizer = taint.sanitizer.as_ref().unwrap();
        assert_eq!(sanitizer.name, "escapeshellarg");
        assert_eq!(sanitizer.level, 0);
    }

    #[test]
    fn a_sanitizer_on_one_branch_leaves_the_other_tainted() {
        let mut analysis = inline(
            "php",
            "<?php function b() { $c = $_GET['x']; if ($z) { $c = escapeshellarg($c); } system($c); } ?>",
        );
        let mut ruleset = Ruleset::builtin("php").unwrap();
        assert!(analysis.analyze(&mut ruleset));

        let b = method(&analysis, "b");
        assert_eq!(b.paths.len(), 2);
        assert_eq!(b.taints.len(), 1);
        assert!(b.taints[0].sanitizer.is_none());
    }

    #[test_case("<?php function f() { $c = $_GET['x']; system($c); escapeshellarg($c); } ?>"; "after the sink")]
    #[test_case("<?php function f() { $c = $_GET['x']; system(escapeshellarg('x') . $c); } ?>"; "on a literal inside the sink")]
    #[test_case("<?php function f() { $d = escapeshellarg('x') . $_GET['x']; system($d); } ?>"; "on a literal before the sink")]
    fn unrelated_sanitizers_do_not_apply(source: &str) {
        let mut analysis = inline("php", source);
        let mut ruleset = Ruleset::builtin("php").unwrap();
        assert!(analysis.analyze(&mut ruleset));

        let f = method(&analysis, "f");
        assert_eq!(f.taints.len(), 1);
        assert!(f.taints[0].sanitizer.is_none());
    }

    #[test]
    fn sanitizers_inside_the_sink_apply() {
        let mut analysis = inline(
            "php",
            "<?php function f() { $c = $_GET['x']; system('ls ' . escapeshellarg($c)); } ?>",
        );
        let mut ruleset = Ruleset::builtin("php").unwrap();
        assert!(analysis.analyze(&mut ruleset));

        let taint = &method(&analysis, "f").taints[0];
        assert_eq!(taint.sanitizer.as_ref().map(|s| s.name.as_str()), Some("escapeshellarg"));
    }

    #[test]
    fn non_ascii_variables_are_traced() {
        let mut analysis = inline(
            "php",
            "<?php function f() { $é = $_GET['x']; system($é); } ?>",
        );
        let mut ruleset = Ruleset::builtin("php").unwrap();
        assert!(analysis.analyze(&mut ruleset));

        let f = method(&analysis, "f");
        assert_eq!(f.taints.len(), 1);
        assert_eq!(f.taints[0].origin.name, "_GET");
    }

    #[test]
    fn object_names_resolve_to_classes() {
        let mut analysis = inline(
            "php",
            "<?php\nclass Shell {\n    function run($c) { system($c); }\n    function go() { $this->run($_GET['x']); }\n}\nfunction query() { $db = new mysqli('h'); $db->query($_GET['q']); }\n?>",
        );
        assert_eq!(method(&analysis, "run").class.as_deref(), Some("Shell"));
        let go = method(&analysis, "go");
        assert_eq!(go.calls[0].name.object, ["Shell"]);

        let mut ruleset = Ruleset::builtin("php").unwrap();
        assert!(analysis.analyze(&mut ruleset));
        assert_eq!(method(&analysis, "go").taints.len(), 1);
        assert_eq!(method(&analysis, "query").taints.len(), 1);
        assert_eq!(method(&analysis, "query").taints[0].sink.name.to_string(), "mysqli.query");
    }

    #[test]
    fn returned_input_makes_a_source() {
        let mut analysis = inline(
            "python",
            "import os\n\n\ndef read_name():\n    return input()\n\n\ndef main():\n    os.system(read_name())\n",
        );
        let mut ruleset = Ruleset::builtin("python").unwrap();
        assert!(analysis.analyze(&mut ruleset));

        let main = method(&analysis, "main");
        assert_eq!(main.taints.len(), 1);
        assert_eq!(main.taints[0].origin.name, "read_name");
    }

    #[test]
    fn output_parameters_make_a_source() {
        let mut analysis = inline(
            "c",
            "void read_input(char *buf) { fgets(buf, 100, stdin); }\nint main() { char line[100]; read_input(line); system(line); return 0; }\n",
        );
        let mut ruleset = Ruleset::builtin("c").unwrap();
        assert!(analysis.analyze(&mut ruleset));

        let main = method(&analysis, "main");
        assert_eq!(main.taints.len(), 1);
        assert_eq!(main.taints[0].origin.name, "read_input");
        assert_eq!(main.taints[0].sink.name.name, "system");
    }

    #[test]
    fn unchanged_rules_need_one_round() {
        let mut analysis = inline("c", "int add(int a, int b) { return a + b; }\n");
        let mut ruleset = Ruleset::builtin("c").unwrap();
        let before = ruleset.clone();
        assert!(analysis.analyze(&mut ruleset));
        assert_eq!(ruleset, before);
        assert!(analysis.methods()[0].taints.is_empty());
    }
}
