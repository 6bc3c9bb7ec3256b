use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tsdbg_session::{
    BreakpointTarget, CallFrame, StepAction, SuspendSnapshot, VmBreakpoint, VmBreakpointHandle,
    VmClient, VmConnector, VmError, VmEventListener,
};

/// Command received by [`FakeVm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmCall {
    Attach,
    Detach,
    Suspend,
    Resume(StepAction),
    SetBreakpoint {
        target: BreakpointTarget,
        line: u32,
        condition: Option<String>,
        enabled: bool,
    },
    ClearBreakpoint(VmBreakpointHandle),
}

#[derive(Default)]
struct FakeVmInner {
    calls: Vec<VmCall>,
    listener: Option<Arc<dyn VmEventListener>>,
    next_handle: u64,
    failing: Option<VmError>,
    pause_on_attach: bool,
}

/// Remote VM double that records commands and lets tests emit events.
///
/// Clones share state, so a test keeps one handle while the session owns another.
#[derive(Clone, Default)]
pub struct FakeVm {
    inner: Arc<Mutex<FakeVmInner>>,
}

impl FakeVm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following command fail with `error`.
    pub fn fail_with(&self, error: VmError) {
        self.inner.lock().unwrap().failing = Some(error);
    }

    /// Delivers an entry pause, without hits, from inside `attach`.
    pub fn pause_on_attach(&self) {
        self.inner.lock().unwrap().pause_on_attach = true;
    }

    pub fn recover(&self) {
        self.inner.lock().unwrap().failing = None;
    }

    pub fn calls(&self) -> Vec<VmCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn set_breakpoint_calls(&self) -> Vec<VmCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, VmCall::SetBreakpoint { .. }))
            .collect()
    }

    fn listener(&self) -> Arc<dyn VmEventListener> {
        self.inner
            .lock()
            .unwrap()
            .listener
            .clone()
            .expect("No listener attached")
    }

    /// Delivers a suspend event with the given hits and frames.
    pub fn emit_suspended(&self, hits: Vec<VmBreakpoint>, frames: Vec<CallFrame>) {
        self.listener()
            .suspended(Arc::new(SuspendSnapshot { frames, hits }));
    }

    /// Delivers a suspend event for a breakpoint hit at `line` of `script`.
    pub fn emit_hit(&self, script: &str, line: u32) {
        let target = BreakpointTarget::ScriptName(script.to_string());
        self.emit_suspended(
            vec![VmBreakpoint {
                handle: VmBreakpointHandle(0),
                target: target.clone(),
                line,
            }],
            vec![CallFrame {
                function_name: "main".to_string(),
                script: target,
                line,
                column: 0,
            }],
        );
    }

    pub fn emit_resumed(&self) {
        self.listener().resumed();
    }

    pub fn emit_disconnected(&self) {
        self.listener().disconnected();
    }

    fn record(&self, call: VmCall) -> Result<(), VmError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = &inner.failing {
            return Err(error.clone());
        }
        inner.calls.push(call);
        Ok(())
    }
}

impl VmClient for FakeVm {
    fn attach(&self, listener: Arc<dyn VmEventListener>) -> Result<(), VmError> {
        self.record(VmCall::Attach)?;
        let pause = {
            let mut inner = self.inner.lock().unwrap();
            inner.listener = Some(Arc::clone(&listener));
            inner.pause_on_attach
        };
        if pause {
            listener.suspended(Arc::new(SuspendSnapshot::default()));
        }
        Ok(())
    }

    fn detach(&self) -> Result<(), VmError> {
        self.record(VmCall::Detach)
    }

    fn suspend(&self) -> Result<(), VmError> {
        self.record(VmCall::Suspend)
    }

    fn resume(&self, action: StepAction) -> Result<(), VmError> {
        self.record(VmCall::Resume(action))
    }

    fn set_breakpoint(
        &self,
        target: &BreakpointTarget,
        line: u32,
        condition: Option<&str>,
        enabled: bool,
    ) -> Result<VmBreakpointHandle, VmError> {
        self.record(VmCall::SetBreakpoint {
            target: target.clone(),
            line,
            condition: condition.map(str::to_string),
            enabled,
        })?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_handle += 1;
        Ok(VmBreakpointHandle(inner.next_handle))
    }

    fn clear_breakpoint(&self, handle: VmBreakpointHandle) -> Result<(), VmError> {
        self.record(VmCall::ClearBreakpoint(handle))
    }
}

/// Connector handing out a shared [`FakeVm`].
#[derive(Clone, Default)]
pub struct FakeConnector {
    vm: FakeVm,
    refuse: Option<VmError>,
}

impl FakeConnector {
    pub fn new(vm: FakeVm) -> Self {
        Self { vm, refuse: None }
    }

    pub fn refusing(error: VmError) -> Self {
        Self {
            vm: FakeVm::new(),
            refuse: Some(error),
        }
    }
}

impl VmConnector for FakeConnector {
    fn connect(&self, _endpoint: SocketAddr) -> Result<Box<dyn VmClient>, VmError> {
        match &self.refuse {
            Some(error) => Err(error.clone()),
            None => Ok(Box::new(self.vm.clone())),
        }
    }
}
