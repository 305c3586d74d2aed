use crate::error::{DebugError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// A source location: file name plus 1-based inclusive line range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScriptLocation {
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl ScriptLocation {
    pub fn new(file: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            file: file.into(),
            start_line,
            end_line,
        }
    }

    /// Empty file names are allowed (scripts without a source name); line
    /// numbers must be 1-based and ordered.
    pub fn check(&self) -> Result<()> {
        if self.start_line == 0 || self.end_line < self.start_line {
            return Err(DebugError::InvalidLocation(format!(
                "bad script location \"{}\"",
                self
            )));
        }
        Ok(())
    }

    pub fn normalized_file(&self) -> String {
        self.file.trim().replace('\\', "/")
    }
}

impl fmt::Display for ScriptLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.file, self.start_line, self.end_line)
    }
}

/// Token breakpoints keyed by exact (file, start line, end line).
#[derive(Debug, Clone, Default)]
pub struct TokenBreakpoints {
    points: BTreeMap<String, BTreeSet<(usize, usize)>>,
}

impl TokenBreakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the location was already set.
    pub fn set(&mut self, location: &ScriptLocation) -> Result<bool> {
        location.check()?;
        let inserted = self
            .points
            .entry(location.normalized_file())
            .or_default()
            .insert((location.start_line, location.end_line));
        debug!(%location, was_already = !inserted, "token breakpoint set");
        Ok(!inserted)
    }

    /// Returns whether the location was set before clearing it.
    pub fn clear(&mut self, location: &ScriptLocation) -> Result<bool> {
        location.check()?;
        let file = location.normalized_file();
        let removed = match self.points.get_mut(&file) {
            Some(lines) => {
                let removed = lines.remove(&(location.start_line, location.end_line));
                if lines.is_empty() {
                    self.points.remove(&file);
                }
                removed
            }
            None => false,
        };
        debug!(%location, was_already = removed, "token breakpoint cleared");
        Ok(removed)
    }

    pub fn matches(&self, location: &ScriptLocation) -> Result<bool> {
        location.check()?;
        Ok(self
            .points
            .get(&location.normalized_file())
            .map(|lines| lines.contains(&(location.start_line, location.end_line)))
            .unwrap_or(false))
    }

    pub fn len(&self) -> usize {
        self.points.values().map(|lines| lines.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.points.clear();
    }

    /// `file:start-end` entries whose text matches the glob pattern.
    pub fn list(&self, pattern: Option<&str>) -> Vec<String> {
        self.points
            .iter()
            .flat_map(|(file, lines)| {
                lines
                    .iter()
                    .map(move |(start, end)| format!("{}:{}-{}", file, start, end))
            })
            .filter(|entry| pattern.map_or(true, |p| glob_match(p, entry)))
            .collect()
    }
}

/// `*` and `?` wildcard match over the whole string.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_wildcards() {
        assert!(glob_match("foo*", "foo.tcl:10-10"));
        assert!(glob_match("*:1?-*", "foo.tcl:10-12"));
        assert!(!glob_match("bar*", "foo.tcl:10-10"));
    }

    #[test]
    fn rejects_bad_ranges() {
        let mut points = TokenBreakpoints::new();
        assert!(points.set(&ScriptLocation::new("a", 0, 1)).is_err());
        assert!(points.set(&ScriptLocation::new("a", 5, 4)).is_err());
    }

    #[test]
    fn list_is_ordered_by_file_and_line() {
        let mut points = TokenBreakpoints::new();
        points.set(&ScriptLocation::new("b.tcl", 3, 3)).unwrap();
        points.set(&ScriptLocation::new("a.tcl", 9, 10)).unwrap();
        points.set(&ScriptLocation::new("a.tcl", 2, 2)).unwrap();
        assert_eq!(
            points.list(None),
            vec!["a.tcl:2-2", "a.tcl:9-10", "b.tcl:3-3"]
        );
        assert_eq!(points.list(Some("a*")).len(), 2);
    }
}
