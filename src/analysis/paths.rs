//! Enumerating execution paths across branch chains.

use crate::{
    domain::ExecutionPath,
    grammar::{Grammar, Span},
};

/// Every path through `span`, or `None` if there are more than `limit`.
///
/// Each branch chain multiplies the paths by its alternatives, plus one
/// when it has no unconditional `else`. Chains inside an alternative are
/// expanded recursively.
#[must_use]
pub fn find_paths(grammar: &dyn Grammar, span: Span, limit: usize) -> Option<Vec<ExecutionPath>> {
    let paths: Vec<ExecutionPath> = segments(grammar, span, limit)?
        .into_iter()
        .filter_map(ExecutionPath::from_segments)
        .collect();
    if paths.is_empty() {
        Some(vec![ExecutionPath::whole(span)])
    } else {
        Some(paths)
    }
}

fn segments(grammar: &dyn Grammar, span: Span, limit: usize) -> Option<Vec<Vec<Span>>> {
    let mut paths: Vec<Vec<Span>> = vec![Vec::new()];
    let mut cursor = span.start;

    for chain in grammar.mutually_exclusive_positions(span) {
        let before = Span::new(cursor, chain.span.start.max(cursor));
        for path in &mut paths {
            path.push(before);
        }

        let mut alternatives = Vec::new();
        for alternative in &chain.alternatives {
            let header = Span::new(alternative.span.start, alternative.body.start);
            for mut inner in segments(grammar, alternative.body, limit)? {
                inner.insert(0, header);
                alternatives.push(inner);
            }
        }
        if !chain.exhaustive {
            alternatives.push(Vec::new());
        }

        if paths.len() * alternatives.len() > limit {
            return None;
        }
        paths = paths
            .iter()
            .flat_map(|path| {
                alternatives
                    .iter()
                    .map(move |alternative| [path.as_slice(), alternative].concat())
            })
            .collect();
        cursor = cursor.max(chain.span.end);
    }

    let after = Span::new(cursor, span.end.max(cursor));
    for path in &mut paths {
        path.push(after);
    }
    Some(paths)
}
