use crate::flags::flag_set;
use std::collections::BTreeMap;

flag_set! {
    /// Capabilities and markers carried by a call frame.
    pub struct FrameFlags: u32 {
        /// Skipped by variable resolution while set (uplevel masking)
        const INVISIBLE = 1 << 0, "Invisible";
        /// Has no variable table of its own; resolution passes through
        const NO_VARIABLES = 1 << 1, "NoVariables";
        const EVALUATE = 1 << 2, "Evaluate";
        const SUBSTITUTE = 1 << 3, "Substitute";
        /// Pushed by the debugger control surface
        const DEBUGGER = 1 << 4, "Debugger";
        const RESTRICTED = 1 << 5, "Restricted";
        /// Root frame of an interpreter
        const GLOBAL = 1 << 6, "Global";
        /// Opened by a script and expected to be closed by it
        const SCOPE = 1 << 7, "Scope";
        /// Marker pushed around a "push, run, pop" span
        const TRACKING = 1 << 8, "Tracking";
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

/// Returned by a push; identifies the marker frame and the depth to unwind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHandle {
    pub id: FrameId,
    pub depth_before: usize,
}

#[derive(Debug, Clone)]
pub struct CallFrame {
    pub id: FrameId,
    pub name: String,
    pub flags: FrameFlags,
    pub variables: BTreeMap<String, String>,
    /// Frame below this one when it was pushed; never owning.
    pub parent: Option<FrameId>,
}

impl CallFrame {
    pub fn new(id: FrameId, name: impl Into<String>, flags: FrameFlags, parent: Option<FrameId>) -> Self {
        Self {
            id,
            name: name.into(),
            flags,
            variables: BTreeMap::new(),
            parent,
        }
    }

    /// Counts as a level for uplevel resolution.
    pub fn is_level(&self) -> bool {
        !self.flags.has(FrameFlags::NO_VARIABLES)
    }

    /// Participates in variable resolution right now.
    pub fn is_visible(&self) -> bool {
        self.is_level() && !self.flags.has(FrameFlags::INVISIBLE)
    }
}
