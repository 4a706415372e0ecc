//! Execution paths through a method body.

use nonempty::NonEmpty;

use crate::grammar::Span;

/// The parts of a method body executed together, in source order.
///
/// Segments never overlap. Code outside every segment, such as the arms of
/// a branch chain that were not taken, does not run on this path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPath(NonEmpty<Span>);

impl ExecutionPath {
    /// A path covering `span` entirely.
    #[must_use]
    pub fn whole(span: Span) -> Self {
        Self(NonEmpty::new(span))
    }

    /// A path made of `segments`. Empty segments are dropped and the rest
    /// is sorted; `None` if nothing remains.
    #[must_use]
    pub fn from_segments(segments: impl IntoIterator<Item = Span>) -> Option<Self> {
        let mut segments: Vec<Span> = segments.into_iter().filter(|s| !s.is_empty()).collect();
        segments.sort();
        NonEmpty::from_vec(segments).map(Self)
    }

    /// The segments in source order.
    pub fn segments(&self) -> impl Iterator<Item = &Span> {
        self.0.iter()
    }

    /// Whether the byte at `offset` is executed on this path.
    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        self.0.iter().any(|segment| segment.contains(offset))
    }

    /// Whether `span` is executed on this path. A span counts when its
    /// start is covered.
    #[must_use]
    pub fn covers(&self, span: Span) -> bool {
        self.contains(span.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_sorted_and_skip_empty_ones() {
        let path = ExecutionPath::from_segments([
            Span::new(30, 40),
            Span::new(12, 12),
            Span::new(0, 10),
        ])
        .unwrap();
        let segments: Vec<_> = path.segments().copied().collect();
        assert_eq!(segments, [Span::new(0, 10), Span::new(30, 40)]);
        assert!(path.contains(5));
        assert!(!path.contains(20));
        assert!(path.covers(Span::new(35, 60)));
    }

    #[test]
    fn nothing_left_is_no_path() {
        assert!(ExecutionPath::from_segments([Span::new(3, 3)]).is_none());
    }
}
