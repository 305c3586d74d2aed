/// One run of physical lines joined by trailing-backslash continuation.
#[derive(Debug, Clone)]
pub struct JoinedLine {
    pub text: String,
    pub phys_start: usize,
    pub phys_end: usize,
}

/// A complete command: continuation lines and unbalanced braces are folded in.
#[derive(Debug, Clone)]
pub struct LogicalLine {
    pub text: String,
    /// 0-based index of the first physical line
    pub phys_start: usize,
    /// 0-based index of the last physical line
    pub phys_end: usize,
    /// Brace nesting depth left open at the end of the text (0 when balanced)
    pub open_braces: u16,
}

impl LogicalLine {
    /// 1-based first line, as used by script locations.
    pub fn start_line(&self) -> usize {
        self.phys_start + 1
    }

    /// 1-based last line.
    pub fn end_line(&self) -> usize {
        self.phys_end + 1
    }
}

/// Output of preprocessing: logical lines + mapping back from physical indices.
#[derive(Debug)]
pub struct PreprocessResult {
    pub logical: Vec<LogicalLine>,
    pub phys_to_logical: Vec<usize>,
}

/// How a word was delimited in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordKind {
    Bare,
    Braced,
    Quoted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub kind: WordKind,
}

impl Word {
    /// Braced and single-quoted words are never substituted.
    pub fn is_literal(&self) -> bool {
        self.kind == WordKind::Braced
    }
}
