//! Call frames and the per-interpreter call stack.

mod frame;
mod stack;

pub use frame::{CallFrame, FrameFlags, FrameHandle, FrameId};
pub use stack::{CallStack, FrameMark, UplevelTarget};
