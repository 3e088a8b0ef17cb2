/// A 1-based line and column position within a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineCol {
    line: u32,
    column: u32,
}

impl LineCol {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }
}

/// Byte offsets of every line start in a text.
#[derive(Clone, Debug)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    length: usize,
}

impl LineIndex {
    #[must_use]
    pub fn new(text: &[u8]) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in text.iter().enumerate() {
            if *byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }

        Self {
            line_starts,
            length: text.len(),
        }
    }

    /// Convert a byte offset into a 1-based line/column.
    ///
    /// Offsets past the end clamp to the end of the text. Columns count UTF-8
    /// characters, falling back to bytes on invalid sequences.
    #[must_use]
    pub fn to_line_col(&self, text: &[u8], offset: usize) -> LineCol {
        let offset = offset.min(self.length);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line - 1,
        };
        let line_start = self.line_starts[line];
        let prefix = &text[line_start..offset];
        let column = match std::str::from_utf8(prefix) {
            Ok(s) => s.chars().count(),
            Err(_) => prefix.len(),
        };

        LineCol::new(
            u32::try_from(line + 1).unwrap_or(u32::MAX),
            u32::try_from(column + 1).unwrap_or(u32::MAX),
        )
    }
}
