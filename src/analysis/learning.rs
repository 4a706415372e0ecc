//! Rules proposed by an analysis for the methods it found.

use crate::domain::{Rule, RuleRef, Ruleset, Sanitizer};

/// A rule learned from a method that wraps a source, sink or sanitizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Learned {
    /// The method returns or writes user input.
    Source(Rule),
    /// The method passes a parameter to a sink.
    Sink(Rule),
    /// The method sanitizes for the sink method `sink`.
    Sanitizer {
        /// The sink method the sanitizer applies to.
        sink: RuleRef,
        /// The new sanitizer.
        sanitizer: Sanitizer,
    },
}

impl Learned {
    /// Adds the rule to `ruleset`. Returns whether the ruleset changed.
    pub fn apply(self, ruleset: &mut Ruleset) -> bool {
        let (kind, changed) = match self {
            Self::Source(rule) => ("source", ruleset.add_source(rule)),
            Self::Sink(rule) => ("sink", ruleset.add_sink(rule)),
            Self::Sanitizer { sink, sanitizer } => {
                ("sanitizer", ruleset.add_sanitizer(sink, sanitizer))
            }
        };
        if changed {
            tracing::debug!("Learned a new {kind} for module \"{}\".", ruleset.module());
        }
        changed
    }
}

/// Applies every proposal. Returns whether the ruleset changed.
pub fn apply_all(learned: impl IntoIterator<Item = Learned>, ruleset: &mut Ruleset) -> bool {
    learned
        .into_iter()
        .fold(false, |changed, rule| rule.apply(ruleset) || changed)
}
