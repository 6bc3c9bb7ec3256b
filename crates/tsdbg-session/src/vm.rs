use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::VmError;

/// Script a remote breakpoint or call frame refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BreakpointTarget {
    /// Script addressed by its name, the emitted file identity of a position map
    ScriptName(String),
    /// Script addressed by a VM-internal id
    ScriptId(u64),
    /// Target kind the client could not classify
    Unknown,
}

impl BreakpointTarget {
    /// Name usable for a position map lookup. Only named scripts resolve.
    pub fn script_name(&self) -> Option<&str> {
        match self {
            BreakpointTarget::ScriptName(name) => Some(name),
            BreakpointTarget::ScriptId(_) | BreakpointTarget::Unknown => None,
        }
    }
}

/// Granularity of a resume command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepAction {
    /// Resume normal execution
    Continue,
    /// Step into the next call
    In,
    /// Run until the current function returns
    Out,
    /// Step to the next line, stepping over calls
    Over,
}

/// Opaque handle of a breakpoint installed on the remote VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VmBreakpointHandle(pub u64);

/// Breakpoint in emitted coordinates as reported by the remote VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmBreakpoint {
    pub handle: VmBreakpointHandle,
    pub target: BreakpointTarget,
    /// 1-based line in the emitted script
    pub line: u32,
}

/// Frame of the remote call stack, in emitted coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub function_name: String,
    pub script: BreakpointTarget,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub id: u64,
    pub name: Option<String>,
}

/// Snapshot of the remote VM captured when execution paused.
pub trait SuspendContext: Debug + Send + Sync {
    /// Call frames, innermost first.
    fn call_frames(&self) -> Vec<CallFrame>;
    /// Breakpoints that caused the pause. Empty for step ends and pause requests.
    fn breakpoints_hit(&self) -> Vec<VmBreakpoint>;
}

/// Plain-data [`SuspendContext`] for clients that decode the whole snapshot eagerly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuspendSnapshot {
    pub frames: Vec<CallFrame>,
    pub hits: Vec<VmBreakpoint>,
}

impl SuspendContext for SuspendSnapshot {
    fn call_frames(&self) -> Vec<CallFrame> {
        self.frames.clone()
    }

    fn breakpoints_hit(&self) -> Vec<VmBreakpoint> {
        self.hits.clone()
    }
}

/// Sink for asynchronous events of a remote VM connection.
///
/// Clients deliver events on their own connection thread. Only
/// [`VmClient::attach`] may deliver an entry pause synchronously.
pub trait VmEventListener: Send + Sync {
    fn suspended(&self, context: Arc<dyn SuspendContext>);

    fn resumed(&self);

    fn disconnected(&self);

    fn script_loaded(&self, _script: &Script) {}

    fn script_content_changed(&self, _script: &Script) {}

    fn script_collected(&self, _script: &Script) {}
}

/// Control surface of an attached remote VM.
pub trait VmClient: Send + Sync {
    fn attach(&self, listener: Arc<dyn VmEventListener>) -> Result<(), VmError>;

    fn detach(&self) -> Result<(), VmError>;

    /// Requests a pause; confirmed later by [`VmEventListener::suspended`].
    fn suspend(&self) -> Result<(), VmError>;

    fn resume(&self, action: StepAction) -> Result<(), VmError>;

    fn set_breakpoint(
        &self,
        target: &BreakpointTarget,
        line: u32,
        condition: Option<&str>,
        enabled: bool,
    ) -> Result<VmBreakpointHandle, VmError>;

    fn clear_breakpoint(&self, handle: VmBreakpointHandle) -> Result<(), VmError>;
}

/// Opens remote VM connections.
pub trait VmConnector {
    fn connect(&self, endpoint: SocketAddr) -> Result<Box<dyn VmClient>, VmError>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(BreakpointTarget::ScriptName("app.js".to_string()), Some("app.js"))]
    #[case(BreakpointTarget::ScriptId(7), None)]
    #[case(BreakpointTarget::Unknown, None)]
    fn test_script_name(#[case] target: BreakpointTarget, #[case] expected: Option<&str>) {
        assert_eq!(target.script_name(), expected);
    }

    #[test]
    fn test_suspend_snapshot() {
        let snapshot = SuspendSnapshot {
            frames: vec![CallFrame {
                function_name: "main".to_string(),
                script: BreakpointTarget::ScriptName("app.js".to_string()),
                line: 3,
                column: 0,
            }],
            hits: Vec::new(),
        };

        assert_eq!(snapshot.call_frames().len(), 1);
        assert!(snapshot.breakpoints_hit().is_empty());
    }
}
