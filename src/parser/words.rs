use super::types::{Word, WordKind};
use crate::error::{DebugError, Result};

/// Split one command into words.
///
/// Braced and single-quoted words are kept verbatim; bare and double-quoted
/// words keep their raw text so [`substitute`] can process escapes and
/// variable references in a single pass.
pub fn split_words(line: &str) -> Result<Vec<Word>> {
    let mut words = Vec::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;

    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        let (word, next) = match chars[i] {
            '{' => read_braced(&chars, i)?,
            '"' => read_quoted(&chars, i, '"', WordKind::Quoted)?,
            '\'' => read_quoted(&chars, i, '\'', WordKind::Braced)?,
            _ => read_bare(&chars, i),
        };

        if next < chars.len() && !chars[next].is_whitespace() {
            let what = match word.kind {
                WordKind::Braced => "close-brace",
                _ => "close-quote",
            };
            return Err(DebugError::script(format!("extra characters after {}", what)));
        }

        words.push(word);
        i = next;
    }

    Ok(words)
}

fn read_braced(chars: &[char], start: usize) -> Result<(Word, usize)> {
    let mut depth = 0i32;
    let mut escaped = false;
    let mut text = String::new();

    for (offset, &ch) in chars[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            text.push(ch);
            continue;
        }
        match ch {
            '\\' => {
                escaped = true;
                text.push(ch);
            }
            '{' => {
                depth += 1;
                if depth > 1 {
                    text.push(ch);
                }
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let word = Word {
                        text,
                        kind: WordKind::Braced,
                    };
                    return Ok((word, start + offset + 1));
                }
                text.push(ch);
            }
            _ => text.push(ch),
        }
    }

    Err(DebugError::script("missing close-brace"))
}

fn read_quoted(chars: &[char], start: usize, quote: char, kind: WordKind) -> Result<(Word, usize)> {
    let mut escaped = false;
    let mut text = String::new();

    for (offset, &ch) in chars[start + 1..].iter().enumerate() {
        if escaped {
            escaped = false;
            text.push(ch);
            continue;
        }
        if ch == '\\' && quote == '"' {
            escaped = true;
            text.push(ch);
            continue;
        }
        if ch == quote {
            return Ok((Word { text, kind }, start + offset + 2));
        }
        text.push(ch);
    }

    Err(DebugError::script(format!("missing close-quote ({})", quote)))
}

fn read_bare(chars: &[char], start: usize) -> (Word, usize) {
    let mut escaped = false;
    let mut text = String::new();
    let mut i = start;

    while i < chars.len() {
        let ch = chars[i];
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch.is_whitespace() {
            break;
        }
        text.push(ch);
        i += 1;
    }

    (
        Word {
            text,
            kind: WordKind::Bare,
        },
        i,
    )
}

/// Resolve backslash escapes and `$name` / `${name}` references.
pub fn substitute<F>(word: &Word, mut lookup: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    if word.is_literal() {
        return Ok(word.text.clone());
    }

    let chars: Vec<char> = word.text.chars().collect();
    let mut out = String::with_capacity(word.text.len());
    let mut i = 0usize;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                out.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            '$' if i + 1 < chars.len() && chars[i + 1] == '{' => {
                let close = chars[i + 2..]
                    .iter()
                    .position(|&c| c == '}')
                    .ok_or_else(|| DebugError::script("missing close-brace for variable name"))?;
                let name: String = chars[i + 2..i + 2 + close].iter().collect();
                out.push_str(&lookup(&name)?);
                i += close + 3;
            }
            '$' if i + 1 < chars.len() && is_name_char(chars[i + 1]) => {
                let len = chars[i + 1..].iter().take_while(|&&c| is_name_char(c)).count();
                let name: String = chars[i + 1..i + 1 + len].iter().collect();
                out.push_str(&lookup(&name)?);
                i += len + 1;
            }
            ch => {
                out.push(ch);
                i += 1;
            }
        }
    }

    Ok(out)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == ':'
}

/// Check if line is a comment
pub fn is_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Format words back into a single command line that [`split_words`]
/// reads as the same words.
pub fn quote_list<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| quote_word(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn quote_word(word: &str) -> String {
    if word.is_empty() {
        return "{}".to_string();
    }
    let plain = word
        .chars()
        .all(|c| !c.is_whitespace() && !matches!(c, '{' | '}' | '"' | '\'' | '\\' | '$' | ';'));
    if plain {
        return word.to_string();
    }
    if braces_balanced(word) && !word.ends_with('\\') {
        return format!("{{{}}}", word);
    }
    match shlex::try_quote(word) {
        Ok(quoted) => quoted.into_owned(),
        Err(_) => format!("{{{}}}", word),
    }
}

fn braces_balanced(text: &str) -> bool {
    let mut depth = 0i32;
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &str) -> Vec<String> {
        split_words(line)
            .unwrap()
            .into_iter()
            .map(|w| w.text)
            .collect()
    }

    #[test]
    fn splits_braces_and_quotes() {
        assert_eq!(
            texts(r#"debug secureeval -trusted true child {set x 1} "a b""#),
            vec!["debug", "secureeval", "-trusted", "true", "child", "set x 1", "a b"]
        );
    }

    #[test]
    fn nested_braces_are_kept() {
        assert_eq!(texts("eval {if {1} {set a 2}}"), vec!["eval", "if {1} {set a 2}"]);
    }

    #[test]
    fn missing_close_brace_is_error() {
        assert!(split_words("eval {set a 1").is_err());
        assert!(split_words("set a {b}c").is_err());
    }

    #[test]
    fn substitutes_variables_outside_braces() {
        let words = split_words(r#"puts "x=$x ${y}!" {$x}"#).unwrap();
        let lookup = |name: &str| Ok(format!("<{}>", name));
        assert_eq!(substitute(&words[1], lookup).unwrap(), "x=<x> <y>!");
        assert_eq!(substitute(&words[2], lookup).unwrap(), "$x");
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let words = split_words(r"puts \$x").unwrap();
        let out = substitute(&words[1], |_| Err(DebugError::script("no lookup"))).unwrap();
        assert_eq!(out, "$x");
    }

    #[test]
    fn quote_list_round_trips_through_split() {
        let words = ["debug", "run", "set a {b}", "", "it's"];
        let line = quote_list(&words);
        assert_eq!(texts(&line), words.to_vec());
    }
}
