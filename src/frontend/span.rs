// src/frontend/span.rs
//
// Byte-offset + line/column source spans, tagged with a `FileId` so the
// semantic core can merge namespaces across multiple source files.
//
// Grounded on vole `src/frontend/token.rs` (`Span`), extended with a
// `FileId` as recorded in DESIGN.md.

use miette::SourceSpan;

/// Identifies the source file a span belongs to.
///
/// PenguinLang merges namespaces across files, so every span carries the
/// file it originated from. Synthesized spans use [`FileId::SYNTHETIC`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileId(pub u32);

impl FileId {
    /// The file id used for compiler-synthesized nodes with no real source.
    pub const SYNTHETIC: FileId = FileId(u32::MAX);

    /// Create a file id from a raw index.
    pub fn new(index: u32) -> Self {
        FileId(index)
    }
}

/// A source-location span: byte offsets plus 1-indexed line/column for both
/// ends, tagged with the originating [`FileId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub file: FileId,
    pub start: usize,    // Byte offset
    pub end: usize,      // Byte offset (exclusive)
    pub line: u32,       // Start line (1-indexed)
    pub column: u32,     // Start column (1-indexed)
    pub end_line: u32,   // End line (1-indexed)
    pub end_column: u32, // End column (1-indexed, exclusive)
}

impl Span {
    /// Create a span with explicit end position.
    #[allow(clippy::too_many_arguments)]
    pub fn new_with_end(
        file: FileId,
        start: usize,
        end: usize,
        line: u32,
        column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            file,
            start,
            end,
            line,
            column,
            end_line,
            end_column,
        }
    }

    /// Create a span, computing the end column for single-line ASCII tokens.
    pub fn new(file: FileId, start: usize, end: usize, line: u32, column: u32) -> Self {
        let length = end.saturating_sub(start);
        Self {
            file,
            start,
            end,
            line,
            column,
            end_line: line,
            end_column: column + length as u32,
        }
    }

    /// A span for compiler-synthesized nodes that have no real source text.
    pub fn synthesized() -> Self {
        Self {
            file: FileId::SYNTHETIC,
            start: 0,
            end: 0,
            line: 0,
            column: 0,
            end_line: 0,
            end_column: 0,
        }
    }

    /// Combine two spans into one covering from the start of `self` to the
    /// end of `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            file: self.file,
            start: self.start,
            end: other.end,
            line: self.line,
            column: self.column,
            end_line: other.end_line,
            end_column: other.end_column,
        }
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::from((span.start, span.end.saturating_sub(span.start)))
    }
}
