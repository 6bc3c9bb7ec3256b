use std::sync::{Arc, Weak};

use tracing::{debug, info};

use crate::breakpoint::{BreakpointListener, SourceBreakpoint};
use crate::session::SessionCore;
use crate::vm::{Script, SuspendContext, VmEventListener};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Attached, initial breakpoints not installed yet
    Connecting,
    Running,
    Suspended,
    /// Terminal; no further transitions
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspendReason {
    /// At least one source breakpoint was hit
    BreakpointHit,
    /// Step completion or a pause without a mapped breakpoint
    StepEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumeReason {
    ClientRequest,
    StepInto,
    StepOver,
    StepReturn,
}

/// Lifecycle notifications produced by a debug session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created,
    Resumed(ResumeReason),
    Suspended(SuspendReason),
    Terminated,
}

/// Routes remote VM events and breakpoint changes into the owning session.
///
/// Holds the session weakly: events arriving after the session was dropped are
/// discarded.
pub(crate) struct EventDispatcher {
    session: Weak<SessionCore>,
}

impl EventDispatcher {
    pub(crate) fn new(session: Weak<SessionCore>) -> Self {
        Self { session }
    }

    fn with_session(&self, f: impl FnOnce(&SessionCore)) {
        match self.session.upgrade() {
            Some(session) => f(&session),
            None => debug!("Session dropped, discarding event"),
        }
    }
}

impl VmEventListener for EventDispatcher {
    fn suspended(&self, context: Arc<dyn SuspendContext>) {
        self.with_session(|session| session.on_suspended(context));
    }

    fn resumed(&self) {
        self.with_session(SessionCore::on_resumed);
    }

    fn disconnected(&self) {
        self.with_session(SessionCore::on_disconnected);
    }

    fn script_loaded(&self, script: &Script) {
        info!(id = script.id, name = ?script.name, "Script loaded");
    }

    fn script_content_changed(&self, script: &Script) {
        info!(id = script.id, name = ?script.name, "Script content changed");
    }

    fn script_collected(&self, script: &Script) {
        info!(id = script.id, name = ?script.name, "Script collected");
    }
}

impl BreakpointListener for EventDispatcher {
    fn breakpoint_added(&self, breakpoint: &SourceBreakpoint) {
        self.with_session(|session| {
            session.add_breakpoint(breakpoint);
        });
    }

    fn breakpoint_removed(&self, breakpoint: &SourceBreakpoint) {
        self.with_session(|session| session.remove_breakpoint(breakpoint));
    }

    fn breakpoint_changed(&self, breakpoint: &SourceBreakpoint) {
        self.with_session(|session| session.breakpoint_changed(breakpoint));
    }
}
