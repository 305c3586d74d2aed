use super::frame::{CallFrame, FrameFlags, FrameHandle, FrameId};
use crate::error::{DebugError, Result};
use std::collections::BTreeMap;
use tracing::trace;

/// Where an uplevel call runs, resolved against the live stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplevelTarget {
    /// Index of the frame variable resolution currently lands on
    pub current: usize,
    /// Index of the frame the call must run in
    pub target: usize,
    /// The level was written as `#N`
    pub absolute: bool,
    /// Frames between target and current must be masked for the call
    pub marked: bool,
}

/// Frames masked by [`CallStack::mark_frames`]; hand back to
/// [`CallStack::unmark_frames`] to undo exactly those.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct FrameMark {
    ids: Vec<FrameId>,
    flag: FrameFlags,
}

impl FrameMark {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Ordered scope chain owned by one interpreter. Index 0 is the global frame.
#[derive(Debug, Clone)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    next_id: u64,
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStack {
    pub fn new() -> Self {
        Self {
            frames: vec![CallFrame::new(FrameId(0), "global", FrameFlags::GLOBAL, None)],
            next_id: 1,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn frame(&self, id: FrameId) -> Option<&CallFrame> {
        self.frames.iter().find(|f| f.id == id)
    }

    pub fn top(&self) -> &CallFrame {
        // the global frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    fn push(&mut self, name: &str, flags: FrameFlags) -> FrameHandle {
        let depth_before = self.frames.len();
        let id = FrameId(self.next_id);
        self.next_id += 1;
        let parent = Some(self.top().id);
        self.frames.push(CallFrame::new(id, name, flags, parent));
        trace!(frame = id.0, name, depth = depth_before + 1, "frame pushed");
        FrameHandle { id, depth_before }
    }

    /// Push a marker frame for a "push, run, pop" span. The frame has no
    /// variables of its own unless `flags` says otherwise through a scope.
    pub fn push_tracking_frame(&mut self, name: &str, flags: FrameFlags) -> FrameHandle {
        self.push(name, flags | FrameFlags::TRACKING | FrameFlags::NO_VARIABLES)
    }

    /// Push a variable-bearing frame opened by a script.
    pub fn push_scope_frame(&mut self, name: &str) -> FrameHandle {
        self.push(name, FrameFlags::SCOPE)
    }

    /// Pop the innermost frame if it is a scope frame.
    pub fn pop_scope(&mut self) -> Result<CallFrame> {
        if self.frames.len() > 1 && self.top().flags.has(FrameFlags::SCOPE) {
            if let Some(frame) = self.frames.pop() {
                return Ok(frame);
            }
        }
        Err(DebugError::InvalidFrame("no scope frame to close".to_string()))
    }

    /// Unwind the marker frame and everything pushed above it that was never
    /// closed. Afterwards the depth equals the depth before the marker push.
    pub fn pop_scope_frames_and_one_more(&mut self, handle: FrameHandle) -> Result<usize> {
        let position = self
            .frames
            .iter()
            .rposition(|f| f.id == handle.id)
            .ok_or_else(|| DebugError::InvalidFrame(format!("frame {} is not on the stack", handle.id.0)))?;

        if position == 0 {
            return Err(DebugError::InvalidFrame("cannot pop the global frame".to_string()));
        }

        let popped = self.frames.len() - position;
        self.frames.truncate(position);
        if popped > 1 {
            trace!(frame = handle.id.0, orphans = popped - 1, "unwound unclosed frames");
        }

        if position != handle.depth_before {
            return Err(DebugError::InvalidFrame(format!(
                "frame {} was pushed at depth {} but found at depth {}",
                handle.id.0, handle.depth_before, position
            )));
        }
        Ok(popped)
    }

    /// Index of the frame variable resolution lands on.
    pub fn current_index(&self) -> usize {
        self.frames.iter().rposition(|f| f.is_visible()).unwrap_or(0)
    }

    pub fn current(&self) -> &CallFrame {
        &self.frames[self.current_index()]
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.current().variables
    }

    pub fn variables_mut(&mut self) -> &mut BTreeMap<String, String> {
        let index = self.current_index();
        &mut self.frames[index].variables
    }

    pub fn global_variables(&self) -> &BTreeMap<String, String> {
        &self.frames[0].variables
    }

    /// Indices of level frames from the root up to the current frame.
    fn level_indices(&self) -> Vec<usize> {
        let current = self.current_index();
        (0..=current).filter(|&i| self.frames[i].is_level()).collect()
    }

    /// Number of levels above the global frame at the current position.
    pub fn level(&self) -> usize {
        self.level_indices().len().saturating_sub(1)
    }

    /// Whether `text` has the shape of a level: `N` or `#N`.
    pub fn is_level_spec(text: &str) -> bool {
        let digits = text.strip_prefix('#').unwrap_or(text);
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    }

    /// Interpret `N` (relative) or `#N` (absolute) against the live stack.
    pub fn resolve_uplevel_target(&self, spec: &str) -> Result<UplevelTarget> {
        let bad = || DebugError::InvalidLevel(spec.to_string());
        let (absolute, digits) = match spec.strip_prefix('#') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        if !Self::is_level_spec(spec) {
            return Err(bad());
        }
        let n: usize = digits.parse().map_err(|_| bad())?;

        let levels = self.level_indices();
        let depth = levels.len() - 1;
        let level = if absolute {
            n
        } else {
            depth.checked_sub(n).ok_or_else(bad)?
        };
        if level > depth {
            return Err(bad());
        }

        let current = levels[depth];
        let target = levels[level];
        Ok(UplevelTarget {
            current,
            target,
            absolute,
            marked: target != current,
        })
    }

    /// Set `flag` on every level frame above `target` that doesn't already
    /// carry it, so a call running at `target` can't see their variables.
    pub fn mark_frames(&mut self, target: usize, flag: FrameFlags) -> Result<FrameMark> {
        if target >= self.frames.len() {
            return Err(DebugError::InvalidFrame(format!("no frame at index {}", target)));
        }
        let mut ids = Vec::new();
        for frame in self.frames.iter_mut().skip(target + 1) {
            if frame.is_level() && !frame.flags.has(flag) {
                frame.flags.set(flag);
                ids.push(frame.id);
            }
        }
        trace!(target, marked = ids.len(), flag = %flag, "frames marked");
        Ok(FrameMark { ids, flag })
    }

    /// Clear the flag set by `mark_frames`. Every frame still present is
    /// unmarked; frames that vanished meanwhile are reported as an error.
    pub fn unmark_frames(&mut self, mark: FrameMark) -> Result<()> {
        let mut missing = Vec::new();
        for id in &mark.ids {
            match self.frames.iter_mut().find(|f| f.id == *id) {
                Some(frame) => frame.flags.clear(mark.flag),
                None => missing.push(id.0.to_string()),
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DebugError::InvalidFrame(format!(
                "cannot unmark missing frames: {}",
                missing.join(" ")
            )))
        }
    }

    /// One line per frame, innermost first.
    pub fn describe(&self) -> Vec<String> {
        let current = self.current_index();
        self.frames
            .iter()
            .enumerate()
            .rev()
            .map(|(i, f)| {
                format!(
                    "{} #{}: {} [{}] ({} vars)",
                    if i == current { "*" } else { " " },
                    i,
                    f.name,
                    f.flags,
                    f.variables.len()
                )
            })
            .collect()
    }
}
