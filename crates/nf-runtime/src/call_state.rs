//! Call-scoped state of the executing thread: the call stack, the current
//! call id and the current implementation name. Every spawned task runs on
//! its own thread and therefore starts from an empty unit.

use std::cell::RefCell;
use std::sync::Arc;

use nf_core::{NfError, NfResult, NfValue};
use tracing::trace;
use uuid::Uuid;

use crate::context::ContextId;
use crate::declarations::DeclaredFunction;

#[derive(Debug, Clone)]
pub struct CallFrame {
    pub function: Arc<DeclaredFunction>,
    pub arguments: Vec<(String, NfValue)>,
    pub context: ContextId,
    pub return_value: Option<NfValue>,
}

#[derive(Debug, Default)]
struct ExecutionUnit {
    frames: Vec<CallFrame>,
    call_id: Option<String>,
    implementation: Option<String>,
}

thread_local! {
    static UNIT: RefCell<ExecutionUnit> = RefCell::new(ExecutionUnit::default());
}

pub fn generate_call_id(depth: usize, name: &str) -> String {
    format!("{}-{}-{}", depth, name, Uuid::new_v4())
}

/// Pushes a frame and makes its function's implementation current. The
/// returned guard pops the frame on every exit path.
pub fn push_call(frame: CallFrame) -> CallFrameGuard {
    UNIT.with(|unit| {
        let mut unit = unit.borrow_mut();
        trace!(
            function = %frame.function.qualified_name(),
            depth = unit.frames.len() + 1,
            "push call frame"
        );
        unit.implementation = frame.function.implementation().map(str::to_string);
        unit.frames.push(frame);
    });
    CallFrameGuard { popped: false }
}

/// Pops the top frame and restores the implementation name from the new
/// top, clearing it when the stack is empty.
pub fn pop_call() -> NfResult<CallFrame> {
    UNIT.with(|unit| {
        let mut unit = unit.borrow_mut();
        let frame = unit.frames.pop().ok_or_else(|| {
            NfError::new("RUNTIME_CALL_STACK_EMPTY", "The call stack is empty.")
        })?;
        unit.implementation = unit
            .frames
            .last()
            .and_then(|top| top.function.implementation().map(str::to_string));
        trace!(
            function = %frame.function.qualified_name(),
            depth = unit.frames.len(),
            "pop call frame"
        );
        Ok(frame)
    })
}

/// A copy of the innermost frame, leaving the stack as it is.
pub fn peek_call() -> Option<CallFrame> {
    UNIT.with(|unit| unit.borrow().frames.last().cloned())
}

pub fn call_depth() -> usize {
    UNIT.with(|unit| unit.borrow().frames.len())
}

/// Records the value a running frame is about to return.
pub fn set_return_value(value: NfValue) {
    UNIT.with(|unit| {
        if let Some(top) = unit.borrow_mut().frames.last_mut() {
            top.return_value = Some(value);
        }
    });
}

pub fn current_call_id() -> Option<String> {
    UNIT.with(|unit| unit.borrow().call_id.clone())
}

pub fn current_implementation() -> Option<String> {
    UNIT.with(|unit| unit.borrow().implementation.clone())
}

/// Sets the call id for the duration of one dispatch; the previous id is
/// put back when the guard drops.
pub fn enter_call_id(call_id: String) -> CallIdGuard {
    let previous = UNIT.with(|unit| unit.borrow_mut().call_id.replace(call_id));
    CallIdGuard { previous }
}

/// Drops every frame and id held by this thread.
pub fn reset() {
    UNIT.with(|unit| *unit.borrow_mut() = ExecutionUnit::default());
}

pub struct CallFrameGuard {
    popped: bool,
}

impl CallFrameGuard {
    pub fn finish(mut self) -> NfResult<CallFrame> {
        self.popped = true;
        pop_call()
    }
}

impl Drop for CallFrameGuard {
    fn drop(&mut self) {
        if !self.popped {
            let _ = pop_call();
        }
    }
}

pub struct CallIdGuard {
    previous: Option<String>,
}

impl Drop for CallIdGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        UNIT.with(|unit| unit.borrow_mut().call_id = previous);
    }
}
