use super::types::{JoinedLine, LogicalLine, PreprocessResult};

/// Join physical lines that are continued with a trailing backslash.
pub fn join_continued_lines(physical: &[&str]) -> Vec<JoinedLine> {
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < physical.len() {
        let start = i;
        let mut buf = String::new();

        loop {
            let line = physical[i];
            let det = line.trim_end_matches([' ', '\t', '\r']);
            let slash_count = det.chars().rev().take_while(|&c| c == '\\').count();
            let continues = slash_count % 2 == 1;

            let piece = if continues {
                // drop the continuation backslash itself
                &det[..det.len() - 1]
            } else {
                line.trim_end_matches('\r')
            };

            if buf.is_empty() {
                buf.push_str(piece);
            } else {
                buf.push(' ');
                buf.push_str(piece.trim_start());
            }

            if continues && i + 1 < physical.len() {
                i += 1;
                continue;
            }
            break;
        }

        out.push(JoinedLine {
            text: buf,
            phys_start: start,
            phys_end: i,
        });

        i += 1;
    }

    out
}

/// Net `{`/`}` delta for a line, honoring backslash escapes and quotes
/// outside braces.
pub fn brace_delta(line: &str) -> i32 {
    let mut delta = 0i32;
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in line.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' if delta == 0 => in_quotes = !in_quotes,
            '{' if !in_quotes => delta += 1,
            '}' if !in_quotes => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Fold joined lines so that a command with an open brace continues until
/// the brace closes. Bodies keep their newlines.
pub fn fold_braces(joined: Vec<JoinedLine>) -> Vec<LogicalLine> {
    let mut logical: Vec<LogicalLine> = Vec::with_capacity(joined.len());
    let mut depth: i32 = 0;

    for j in joined {
        let delta = brace_delta(&j.text);

        match logical.last_mut() {
            Some(open) if depth > 0 => {
                open.text.push('\n');
                open.text.push_str(&j.text);
                open.phys_end = j.phys_end;
            }
            _ => logical.push(LogicalLine {
                text: j.text,
                phys_start: j.phys_start,
                phys_end: j.phys_end,
                open_braces: 0,
            }),
        }

        depth = (depth + delta).max(0);
        if let Some(last) = logical.last_mut() {
            last.open_braces = depth as u16;
        }
    }

    logical
}

/// Full preprocessing pipeline
pub fn preprocess_lines(physical: &[&str]) -> PreprocessResult {
    let joined = join_continued_lines(physical);
    let logical = fold_braces(joined);

    let mut phys_to_logical = vec![0usize; physical.len()];
    for (li, l) in logical.iter().enumerate() {
        for p in l.phys_start..=l.phys_end {
            if p < phys_to_logical.len() {
                phys_to_logical[p] = li;
            }
        }
    }

    PreprocessResult {
        logical,
        phys_to_logical,
    }
}
