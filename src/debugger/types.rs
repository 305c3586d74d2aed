use crate::flags::flag_set;

flag_set! {
    /// Independent trigger categories consulted by the evaluator.
    pub struct BreakpointType: u32 {
        /// Explicit break request (`debug break`)
        const DEMAND = 1 << 0, "Demand";
        const CANCEL = 1 << 1, "Cancel";
        const ERROR = 1 << 2, "Error";
        const EXECUTE = 1 << 3, "Execute";
        const EXECUTE_ARGUMENT = 1 << 4, "ExecuteArgument";
        const EXIT = 1 << 5, "Exit";
        const RETURN = 1 << 6, "Return";
        const TEST = 1 << 7, "Test";
        /// Source-location breakpoints
        const TOKEN = 1 << 8, "Token";
    }
}

impl BreakpointType {
    pub const DEFAULT: Self = Self::DEMAND;

    /// Types a debugger starts with, or the set the emergency path toggles.
    pub fn default_types(enabled: Option<bool>, tokens: bool) -> Self {
        if enabled == Some(false) {
            return Self::NONE;
        }
        let mut types = Self::DEFAULT;
        if tokens {
            types.set(Self::TOKEN);
        }
        types
    }

    /// Compare against `wanted`: with `enabled` true (or unknown) all of
    /// `wanted` must be present, with `enabled` false all of it must be
    /// missing. Returns the verdict and a status line.
    pub fn match_types(self, wanted: Self, enabled: Option<bool>) -> (bool, String) {
        if wanted.is_empty() {
            let all_missing = self.is_empty();
            let line = format!(
                "debugger types are {}",
                if all_missing { "all missing" } else { "present" }
            );
            return (all_missing, line);
        }

        let all = enabled != Some(false);
        let verdict = if all {
            self.has(wanted)
        } else {
            !self.has_any(wanted)
        };
        let line = match (all, verdict) {
            (true, true) => "debugger types are present",
            (true, false) => "debugger types are missing",
            (false, true) => "debugger types are all missing",
            (false, false) => "debugger types are present",
        };
        (verdict, line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_types_follow_enabled_and_tokens() {
        assert_eq!(BreakpointType::default_types(Some(false), true), BreakpointType::NONE);
        assert_eq!(
            BreakpointType::default_types(None, true),
            BreakpointType::DEMAND | BreakpointType::TOKEN
        );
        assert_eq!(BreakpointType::default_types(Some(true), false), BreakpointType::DEMAND);
    }

    #[test]
    fn match_types_checks_presence_or_absence() {
        let types = BreakpointType::DEMAND | BreakpointType::ERROR;
        assert!(types.match_types(BreakpointType::DEMAND, Some(true)).0);
        assert!(!types.match_types(BreakpointType::TOKEN, None).0);
        assert!(types.match_types(BreakpointType::TOKEN, Some(false)).0);
        assert!(!types.match_types(BreakpointType::ERROR, Some(false)).0);
    }
}
