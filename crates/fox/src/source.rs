//! Source manager: file buffers and byte-offset-to-(line, column) mapping.
//!
//! Spec §6.1 lists the source manager as an external collaborator "consumed via a stable
//! interface" rather than core design weight. Nothing upstream of this crate supplies one, so
//! this module gives the pipeline a minimal, self-contained implementation: opaque `FileId`
//! handles, a `SourceLoc`/`SourceRange` pair, and line/column lookup from a byte offset.

use std::fmt;

/// Opaque handle to a loaded source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FileId(u32);

/// A byte offset into a single file's buffer.
///
/// Carries the owning [`FileId`] so a `SourceLoc` is meaningful without external context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceLoc {
    file: FileId,
    offset: u32,
}

impl SourceLoc {
    #[must_use]
    pub fn dummy() -> Self {
        Self { file: FileId(u32::MAX), offset: 0 }
    }

    #[must_use]
    pub fn is_dummy(self) -> bool {
        self.file.0 == u32::MAX
    }

    #[must_use]
    pub fn file(self) -> FileId {
        self.file
    }

    #[must_use]
    pub fn offset(self) -> u32 {
        self.offset
    }
}

/// An ordered pair of `SourceLoc`s, `begin <= end`. Equality is by (begin, end), as spec §6.1
/// requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceRange {
    begin: SourceLoc,
    end: SourceLoc,
}

impl SourceRange {
    #[must_use]
    pub fn new(begin: SourceLoc, end: SourceLoc) -> Self {
        debug_assert_eq!(begin.file, end.file, "a range cannot span files");
        debug_assert!(begin.offset <= end.offset, "begin must precede end");
        Self { begin, end }
    }

    #[must_use]
    pub fn single(loc: SourceLoc) -> Self {
        Self { begin: loc, end: loc }
    }

    #[must_use]
    pub fn dummy() -> Self {
        Self { begin: SourceLoc::dummy(), end: SourceLoc::dummy() }
    }

    #[must_use]
    pub fn begin(self) -> SourceLoc {
        self.begin
    }

    #[must_use]
    pub fn end(self) -> SourceLoc {
        self.end
    }

    /// Returns the smallest range containing both `self` and `other`.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        debug_assert_eq!(self.begin.file, other.begin.file);
        Self {
            begin: if self.begin.offset <= other.begin.offset { self.begin } else { other.begin },
            end: if self.end.offset >= other.end.offset { self.end } else { other.end },
        }
    }

    #[must_use]
    pub fn contains(self, loc: SourceLoc) -> bool {
        loc.file == self.begin.file && self.begin.offset <= loc.offset && loc.offset <= self.end.offset
    }
}

/// 1-based (line, column) pair, the human-facing form of a [`SourceLoc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompleteLoc {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for CompleteLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

struct LoadedFile {
    path: Box<str>,
    buffer: Box<str>,
    /// Byte offset of the start of each line, used for binary-search line lookup.
    line_starts: Vec<u32>,
}

/// Owns source buffers and answers byte-offset-to-location queries.
///
/// Spec §6.1's `readFile`, `getCompleteLoc`, and `getLocFromPtr` operations.
#[derive(Default)]
pub struct SourceManager {
    files: Vec<LoadedFile>,
}

impl SourceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an in-memory buffer as a file, returning its handle.
    ///
    /// `readFile` in spec §6.1 reads from disk; callers that already have the text (the common
    /// case in tests and embedders) use this directly instead.
    pub fn add_buffer(&mut self, path: impl Into<Box<str>>, buffer: impl Into<Box<str>>) -> FileId {
        let buffer = buffer.into();
        let mut line_starts = vec![0u32];
        for (i, b) in buffer.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(u32::try_from(i + 1).expect("file too large"));
            }
        }
        self.files.push(LoadedFile { path: path.into(), buffer, line_starts });
        FileId(u32::try_from(self.files.len() - 1).expect("too many files"))
    }

    /// Reads `path` from disk and registers it.
    ///
    /// # Errors
    /// Returns the underlying I/O error on failure.
    pub fn read_file(&mut self, path: &str) -> std::io::Result<FileId> {
        let contents = std::fs::read_to_string(path)?;
        Ok(self.add_buffer(path, contents))
    }

    #[must_use]
    pub fn buffer(&self, file: FileId) -> &str {
        &self.files[file.0 as usize].buffer
    }

    #[must_use]
    pub fn path(&self, file: FileId) -> &str {
        &self.files[file.0 as usize].path
    }

    /// Builds a `SourceLoc` from a byte offset within `file`.
    #[must_use]
    pub fn loc_at(&self, file: FileId, offset: u32) -> SourceLoc {
        SourceLoc { file, offset }
    }

    /// 1-based (line, column) for a `SourceLoc`. Spec §6.1's `getCompleteLoc`.
    #[must_use]
    pub fn complete_loc(&self, loc: SourceLoc) -> CompleteLoc {
        let file = &self.files[loc.file.0 as usize];
        let line_idx = match file.line_starts.binary_search(&loc.offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = file.line_starts[line_idx];
        let column = loc.offset - line_start + 1;
        CompleteLoc { line: u32::try_from(line_idx + 1).expect("line count overflow"), column }
    }
}

#[cfg(test)]
mod tests {
    use super::SourceManager;

    #[test]
    fn locations_map_to_1_based_line_and_column() {
        let mut sm = SourceManager::new();
        let file = sm.add_buffer("test.fox", "let x : int = 1;\nlet y : int = 2;\n");
        let loc = sm.loc_at(file, 0);
        assert_eq!(sm.complete_loc(loc), super::CompleteLoc { line: 1, column: 1 });
        let loc2 = sm.loc_at(file, 18);
        assert_eq!(sm.complete_loc(loc2), super::CompleteLoc { line: 2, column: 1 });
    }
}
