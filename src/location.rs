//! Source location utilities.

use saphyr_parser::Span as ParserSpan;

/// Identifies one loaded file inside a [`crate::sources::SourceMap`].
///
/// The root document is always source `0`; every `!Include` adds a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SourceId(pub(crate) u32);

impl SourceId {
    /// The root document of a parse.
    pub const ROOT: Self = Self(0);

    /// Index of this source in the source map.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Row/column location within one of the loaded files (1-indexed, character-based).
///
/// Every event carries a `Location`, so errors raised while matching replayed (aliased)
/// or merged content still point at the file and line the content came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    /// 1-indexed row number in the input stream.
    pub(crate) line: u32,
    /// 1-indexed column number in the input stream.
    pub(crate) column: u32,
    /// File the position belongs to.
    pub(crate) source: SourceId,
}

impl Location {
    /// Line number, starting at 1.
    #[inline]
    pub fn line(&self) -> u64 {
        self.line as u64
    }

    /// Column number, starting at 1.
    #[inline]
    pub fn column(&self) -> u64 {
        self.column as u64
    }

    /// The file this location points into.
    #[inline]
    pub fn source(&self) -> SourceId {
        self.source
    }
}

impl Location {
    /// Sentinel value meaning "location unknown".
    ///
    /// Used when a precise position is not yet available at error creation time,
    /// and for values coming from the command line or the environment.
    pub const UNKNOWN: Self = Self {
        line: 0,
        column: 0,
        source: SourceId::ROOT,
    };

    /// Create a new location record.
    ///
    /// Arguments:
    /// - `line`: 1-indexed line.
    /// - `column`: 1-indexed column.
    /// - `source`: file the position belongs to.
    pub(crate) const fn new(line: usize, column: usize, source: SourceId) -> Self {
        // Configuration files beyond 4 billion lines are not a concern, and this is
        // error reporting only.
        Self {
            line: line as u32,
            column: column as u32,
            source,
        }
    }

    /// True unless this is [`Location::UNKNOWN`].
    #[inline]
    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

/// Convert a `saphyr_parser::Span` to a 1-indexed [`Location`] inside `source`.
///
/// Called by:
/// - The include layer for each raw parser event.
pub(crate) fn location_from_span(span: &ParserSpan, source: SourceId) -> Location {
    let start = &span.start;
    Location::new(start.line(), start.col() + 1, source)
}
