use crate::error::{DebugError, Result};
use crate::parser::parse_bool;
use std::collections::BTreeMap;
use std::time::Duration;

/// One recognised `-name` option.
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    pub name: &'static str,
    /// Consumes the following argument as its value
    pub takes_value: bool,
}

impl OptionSpec {
    pub const fn switch(name: &'static str) -> Self {
        Self {
            name,
            takes_value: false,
        }
    }

    pub const fn value(name: &'static str) -> Self {
        Self {
            name,
            takes_value: true,
        }
    }
}

/// Options found at the front of an argument list.
#[derive(Debug, Clone, Default)]
pub struct ParsedOptions {
    found: BTreeMap<&'static str, Option<String>>,
}

impl ParsedOptions {
    pub fn has(&self, name: &str) -> bool {
        self.found.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.found.get(name).and_then(|v| v.as_deref())
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>> {
        match self.value(name) {
            None => Ok(None),
            Some(text) => parse_bool(text)
                .map(Some)
                .ok_or_else(|| DebugError::script(format!("expected boolean value but got \"{}\"", text))),
        }
    }

    pub fn millis(&self, name: &str) -> Result<Option<Duration>> {
        match self.value(name) {
            None => Ok(None),
            Some(text) => text
                .trim()
                .parse::<u64>()
                .map(|ms| Some(Duration::from_millis(ms)))
                .map_err(|_| DebugError::script(format!("expected milliseconds but got \"{}\"", text))),
        }
    }
}

/// Pull leading options off `args`. Options end at the first argument not
/// starting with `-`, or after `--`. Returns the remaining arguments.
pub fn parse_options<'a>(
    specs: &[OptionSpec],
    args: &'a [String],
) -> Result<(ParsedOptions, &'a [String])> {
    let mut parsed = ParsedOptions::default();
    let mut i = 0usize;

    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "--" {
            i += 1;
            break;
        }
        if !arg.starts_with('-') || arg.len() < 2 {
            break;
        }
        let spec = specs
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(arg))
            .ok_or_else(|| bad_option(arg, specs))?;

        if spec.takes_value {
            let value = args
                .get(i + 1)
                .ok_or_else(|| DebugError::script(format!("value for \"{}\" missing", spec.name)))?;
            parsed.found.insert(spec.name, Some(value.clone()));
            i += 2;
        } else {
            parsed.found.insert(spec.name, None);
            i += 1;
        }
    }

    Ok((parsed, &args[i..]))
}

fn bad_option(arg: &str, specs: &[OptionSpec]) -> DebugError {
    let names: Vec<&str> = specs.iter().map(|s| s.name).collect();
    DebugError::script(format!(
        "bad option \"{}\": must be {}",
        arg,
        names.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    const SPECS: &[OptionSpec] = &[
        OptionSpec::value("-trusted"),
        OptionSpec::value("-timeout"),
        OptionSpec::switch("-file"),
    ];

    #[test]
    fn options_stop_at_first_plain_argument() {
        let a = args(&["-trusted", "yes", "-file", "child", "script.tcl"]);
        let (opts, rest) = parse_options(SPECS, &a).unwrap();
        assert_eq!(opts.bool("-trusted").unwrap(), Some(true));
        assert!(opts.has("-file"));
        assert_eq!(rest, &a[3..]);
    }

    #[test]
    fn double_dash_ends_options() {
        let a = args(&["--", "-file"]);
        let (opts, rest) = parse_options(SPECS, &a).unwrap();
        assert!(!opts.has("-file"));
        assert_eq!(rest, &a[1..]);
    }

    #[test]
    fn unknown_and_incomplete_options_fail() {
        assert!(parse_options(SPECS, &args(&["-bogus", "x"])).is_err());
        assert!(parse_options(SPECS, &args(&["-timeout"])).is_err());
    }

    #[test]
    fn millis_parses_numbers_only() {
        let a = args(&["-timeout", "250", "x"]);
        let (opts, _) = parse_options(SPECS, &a).unwrap();
        assert_eq!(opts.millis("-timeout").unwrap(), Some(Duration::from_millis(250)));

        let a = args(&["-timeout", "soon", "x"]);
        let (opts, _) = parse_options(SPECS, &a).unwrap();
        assert!(opts.millis("-timeout").is_err());
    }
}
