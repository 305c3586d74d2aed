mod preprocessor;
mod types;
mod words;

pub use preprocessor::{brace_delta, preprocess_lines};
pub use types::{LogicalLine, PreprocessResult, Word, WordKind};
pub use words::{is_comment, quote_list, quote_word, split_words, substitute};

/// Parse a boolean the way the control surface accepts it.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a whole script into logical lines (1-based line numbers are
/// recovered through [`LogicalLine::start_line`]).
pub fn preprocess_script(text: &str) -> PreprocessResult {
    let physical: Vec<&str> = text.lines().collect();
    preprocess_lines(&physical)
}
