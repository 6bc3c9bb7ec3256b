pub mod breakpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod log;
pub mod session;
pub mod stack;
pub mod vm;

pub use breakpoint::{
    BreakpointId, BreakpointListener, BreakpointManager, BreakpointStore, ListenerId,
    SourceBreakpoint,
};
pub use config::SessionConfig;
pub use error::{SessionError, VmError};
pub use event::{ResumeReason, SessionEvent, SessionState, SuspendReason};
pub use session::{DebugSession, DebugThread, TranslatedBreakpoint};
pub use stack::{SourceLocation, StackFrame};
pub use vm::{
    BreakpointTarget, CallFrame, Script, StepAction, SuspendContext, SuspendSnapshot,
    VmBreakpoint, VmBreakpointHandle, VmClient, VmConnector, VmEventListener,
};
