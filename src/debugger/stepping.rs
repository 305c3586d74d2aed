/// Single-step flag plus the `Steps` countdown.
///
/// The evaluator calls [`Stepping::maybe_next_step`] once per command; a
/// countdown that reaches zero on that call asks for a break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stepping {
    pub single_step: bool,
    pub steps: i64,
}

impl Stepping {
    /// Decrement a positive countdown and return what remains.
    pub fn next_step(&mut self) -> i64 {
        if self.steps > 0 {
            self.steps -= 1;
        }
        self.steps.max(0)
    }

    /// Decrement a non-zero countdown; true when it just reached zero.
    pub fn maybe_next_step(&mut self) -> bool {
        if self.steps == 0 {
            return false;
        }
        self.steps -= 1;
        self.steps == 0
    }

    /// Whether the evaluator should break before the next command.
    pub fn should_break(&mut self) -> bool {
        // countdown first so it keeps moving even while single-stepping
        let counted = self.maybe_next_step();
        self.single_step || counted
    }
}
