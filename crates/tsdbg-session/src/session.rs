use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};
use tsdbg_sourcemap::{MapLocator, PositionMapRegistry};

use crate::breakpoint::{BreakpointId, BreakpointListener, BreakpointManager, ListenerId, SourceBreakpoint};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::event::{EventDispatcher, ResumeReason, SessionEvent, SessionState, SuspendReason};
use crate::stack::StackFrame;
use crate::vm::{
    BreakpointTarget, StepAction, SuspendContext, VmBreakpointHandle, VmClient, VmConnector,
};

const MAIN_THREAD_ID: i64 = 1;

/// A source breakpoint installed on the remote VM in emitted coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedBreakpoint {
    pub breakpoint: BreakpointId,
    pub source_line: u32,
    pub condition: Option<String>,
    pub target: BreakpointTarget,
    pub emitted_line: u32,
    pub handle: VmBreakpointHandle,
}

/// The single logical thread of a script VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugThread {
    pub id: i64,
    pub name: String,
    /// Breakpoints that caused the current suspension
    pub breakpoints: Vec<SourceBreakpoint>,
}

impl Default for DebugThread {
    fn default() -> Self {
        Self {
            id: MAIN_THREAD_ID,
            name: "main".to_string(),
            breakpoints: Vec::new(),
        }
    }
}

struct SessionData {
    state: SessionState,
    context: Option<Arc<dyn SuspendContext>>,
    suspend_reason: Option<SuspendReason>,
    thread: DebugThread,
    installed: BTreeMap<BreakpointId, TranslatedBreakpoint>,
    listener: Option<ListenerId>,
}

impl SessionData {
    fn new() -> Self {
        Self {
            state: SessionState::Connecting,
            context: None,
            suspend_reason: None,
            thread: DebugThread::default(),
            installed: BTreeMap::new(),
            listener: None,
        }
    }

    fn is_suspended(&self) -> bool {
        self.state == SessionState::Suspended && self.context.is_some()
    }

    fn clear_suspension(&mut self) {
        self.context = None;
        self.suspend_reason = None;
        self.thread.breakpoints.clear();
    }
}

pub(crate) struct SessionCore {
    vm: Box<dyn VmClient>,
    registry: PositionMapRegistry,
    breakpoints: Arc<dyn BreakpointManager>,
    model_id: String,
    data: Mutex<SessionData>,
    event_tx: Sender<SessionEvent>,
}

impl SessionCore {
    fn lock(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        debug!(?event, "Session event");
        // Nobody listening is not an error.
        let _ = self.event_tx.send(event);
    }

    fn supports(&self, breakpoint: &SourceBreakpoint) -> bool {
        breakpoint.model_id == self.model_id
    }

    fn started(&self, listener: Arc<dyn BreakpointListener>) {
        let listener_id = self.breakpoints.add_listener(listener);

        let mut data = self.lock();
        if data.state == SessionState::Terminated {
            drop(data);
            self.breakpoints.remove_listener(listener_id);
            return;
        }
        data.listener = Some(listener_id);

        for breakpoint in self.breakpoints.breakpoints(&self.model_id) {
            self.install(&mut data, &breakpoint);
        }

        if data.state == SessionState::Connecting {
            data.state = SessionState::Running;
        }
        info!(installed = data.installed.len(), "Debug session started");

        // Only an entry pause is continued; a breakpoint hit during startup stays suspended.
        if data.suspend_reason == Some(SuspendReason::StepEnd) {
            let _ = self.continue_vm(&mut data, StepAction::Continue, ResumeReason::ClientRequest);
        }
    }

    fn install(&self, data: &mut SessionData, breakpoint: &SourceBreakpoint) -> Option<TranslatedBreakpoint> {
        if !self.supports(breakpoint) || !breakpoint.enabled {
            return None;
        }

        if let Some(installed) = data.installed.get(&breakpoint.id) {
            return Some(installed.clone());
        }

        let map = match self.registry.resolve(&breakpoint.path) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %breakpoint.path, error = %e, "Breakpoint is not supported without a position map");
                return None;
            }
        };

        // Bundles share line numbers between sources.
        let item = if map.sources().len() > 1 {
            self.registry
                .source_index(&breakpoint.path)
                .and_then(|source| map.item_by_source_line_in(source, breakpoint.line))
        } else {
            map.item_by_source_line(breakpoint.line)
        };
        let Some(item) = item else {
            debug!(path = %breakpoint.path, line = breakpoint.line, "No emitted line for source line");
            return None;
        };

        let target = BreakpointTarget::ScriptName(map.file().to_string());
        match self.vm.set_breakpoint(
            &target,
            item.emitted_line,
            breakpoint.condition.as_deref(),
            true,
        ) {
            Ok(handle) => {
                debug!(
                    path = %breakpoint.path,
                    line = breakpoint.line,
                    file = %map.file(),
                    emitted_line = item.emitted_line,
                    "Installed breakpoint"
                );
                let translated = TranslatedBreakpoint {
                    breakpoint: breakpoint.id,
                    source_line: breakpoint.line,
                    condition: breakpoint.condition.clone(),
                    target,
                    emitted_line: item.emitted_line,
                    handle,
                };
                data.installed.insert(breakpoint.id, translated.clone());
                Some(translated)
            }
            Err(e) => {
                error!(path = %breakpoint.path, line = breakpoint.line, error = %e, "Failed to install breakpoint");
                None
            }
        }
    }

    fn uninstall(&self, data: &mut SessionData, id: BreakpointId) {
        data.thread.breakpoints.retain(|active| active.id != id);

        let Some(translated) = data.installed.remove(&id) else {
            return;
        };

        match self.vm.clear_breakpoint(translated.handle) {
            Ok(()) => debug!(id = id.0, emitted_line = translated.emitted_line, "Cleared breakpoint"),
            Err(e) => error!(id = id.0, error = %e, "Failed to clear breakpoint"),
        }
    }

    pub(crate) fn add_breakpoint(&self, breakpoint: &SourceBreakpoint) -> Option<TranslatedBreakpoint> {
        let mut data = self.lock();
        if data.state == SessionState::Terminated {
            return None;
        }
        self.install(&mut data, breakpoint)
    }

    pub(crate) fn remove_breakpoint(&self, breakpoint: &SourceBreakpoint) {
        if !self.supports(breakpoint) {
            return;
        }

        let mut data = self.lock();
        if data.state != SessionState::Terminated {
            self.uninstall(&mut data, breakpoint.id);
        }
    }

    pub(crate) fn breakpoint_changed(&self, breakpoint: &SourceBreakpoint) {
        if !self.supports(breakpoint) {
            return;
        }

        let mut data = self.lock();
        if data.state == SessionState::Terminated {
            return;
        }

        let unchanged = data.installed.get(&breakpoint.id).map(|t| {
            t.source_line == breakpoint.line && t.condition == breakpoint.condition
        });
        match (breakpoint.enabled, unchanged) {
            (true, Some(true)) => {}
            (true, Some(false)) => {
                self.uninstall(&mut data, breakpoint.id);
                self.install(&mut data, breakpoint);
            }
            (true, None) => {
                self.install(&mut data, breakpoint);
            }
            (false, _) => self.uninstall(&mut data, breakpoint.id),
        }
    }

    fn continue_vm(
        &self,
        data: &mut SessionData,
        action: StepAction,
        reason: ResumeReason,
    ) -> Result<(), SessionError> {
        if !data.is_suspended() {
            debug!(state = ?data.state, ?action, "Ignoring resume, session is not suspended");
            return Ok(());
        }

        if let Err(e) = self.vm.resume(action) {
            error!(?action, error = %e, "Failed to resume remote VM");
            return Err(SessionError::Vm(e));
        }

        data.clear_suspension();
        data.state = SessionState::Running;
        self.emit(SessionEvent::Resumed(reason));
        Ok(())
    }

    fn step(&self, action: StepAction, reason: ResumeReason) -> Result<(), SessionError> {
        let mut data = self.lock();
        self.continue_vm(&mut data, action, reason)
    }

    fn suspend(&self) -> Result<(), SessionError> {
        let data = self.lock();
        if data.state != SessionState::Running {
            debug!(state = ?data.state, "Ignoring suspend, session is not running");
            return Ok(());
        }

        self.vm.suspend().map_err(|e| {
            error!(error = %e, "Failed to suspend remote VM");
            SessionError::Vm(e)
        })
    }

    /// Moves to `Terminated` once. Returns false when already terminated.
    fn shut_down(&self) -> bool {
        let listener = {
            let mut data = self.lock();
            if data.state == SessionState::Terminated {
                return false;
            }
            data.state = SessionState::Terminated;
            data.clear_suspension();
            data.installed.clear();
            data.listener.take()
        };

        if let Some(listener) = listener {
            self.breakpoints.remove_listener(listener);
        }
        self.registry.clear();
        self.emit(SessionEvent::Terminated);
        true
    }

    fn terminate(&self) -> Result<(), SessionError> {
        if !self.shut_down() {
            debug!("Session already terminated");
            return Ok(());
        }

        info!("Terminating debug session");
        self.vm.detach().map_err(|e| {
            error!(error = %e, "Failed to detach from remote VM");
            SessionError::Vm(e)
        })
    }

    pub(crate) fn on_suspended(&self, context: Arc<dyn SuspendContext>) {
        let mut data = self.lock();
        if data.state == SessionState::Terminated {
            debug!("Ignoring suspend event of terminated session");
            return;
        }

        let hits = context.breakpoints_hit();
        let candidates = if hits.is_empty() {
            Vec::new()
        } else {
            self.breakpoints.breakpoints(&self.model_id)
        };

        let mut active: Vec<SourceBreakpoint> = Vec::new();
        for hit in &hits {
            let Some(script) = hit.target.script_name() else {
                debug!(target = ?hit.target, "Unresolvable breakpoint target");
                continue;
            };
            let Some(map) = self.registry.by_emitted(script) else {
                debug!(script = %script, "No position map for emitted file");
                continue;
            };
            let Some(item) = map.item_by_emitted_line(hit.line) else {
                debug!(script = %script, line = hit.line, "No source line for emitted line");
                continue;
            };

            let sources = self.registry.source_paths_at(script, item.source);
            for breakpoint in candidates.iter().filter(|breakpoint| {
                breakpoint.enabled
                    && breakpoint.line == item.source_line
                    && sources.contains(&breakpoint.path)
            }) {
                if !active.iter().any(|a| a.id == breakpoint.id) {
                    active.push(breakpoint.clone());
                }
            }
        }

        let reason = if active.is_empty() {
            SuspendReason::StepEnd
        } else {
            SuspendReason::BreakpointHit
        };
        debug!(?reason, hits = hits.len(), active = active.len(), "Remote VM suspended");

        data.thread.breakpoints = active;
        data.context = Some(context);
        data.suspend_reason = Some(reason);
        data.state = SessionState::Suspended;
        self.emit(SessionEvent::Suspended(reason));
    }

    pub(crate) fn on_resumed(&self) {
        let mut data = self.lock();
        if data.state != SessionState::Suspended {
            debug!(state = ?data.state, "Resume already applied");
            return;
        }

        data.clear_suspension();
        data.state = SessionState::Running;
        self.emit(SessionEvent::Resumed(ResumeReason::StepOver));
    }

    pub(crate) fn on_disconnected(&self) {
        if self.shut_down() {
            info!("Remote VM disconnected");
        }
    }
}

/// Debug session over one remote VM connection.
///
/// Commands and VM events are serialized through one lock. VM clients must
/// deliver events from their own connection thread.
pub struct DebugSession {
    core: Arc<SessionCore>,
    events: Receiver<SessionEvent>,
}

impl std::fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSession")
            .field("model_id", &self.core.model_id)
            .field("state", &self.state())
            .finish()
    }
}

impl DebugSession {
    /// Connects to the remote VM, attaches, installs the enabled breakpoints of
    /// the configured debug model and lets execution proceed.
    pub fn start(
        config: &SessionConfig,
        connector: &dyn VmConnector,
        breakpoints: Arc<dyn BreakpointManager>,
    ) -> Result<Self, SessionError> {
        Self::start_with_locator(config, connector, breakpoints, Box::new(config.map_locator()))
    }

    pub fn start_with_locator(
        config: &SessionConfig,
        connector: &dyn VmConnector,
        breakpoints: Arc<dyn BreakpointManager>,
        locator: Box<dyn MapLocator>,
    ) -> Result<Self, SessionError> {
        let endpoint = config.endpoint()?;
        info!(%endpoint, model = %config.debug_model, "Connecting to remote VM");

        let vm = connector.connect(endpoint).map_err(|e| {
            error!(%endpoint, error = %e, "Failed to connect to remote VM");
            SessionError::Connect(e)
        })?;

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let core = Arc::new(SessionCore {
            vm,
            registry: PositionMapRegistry::new(locator),
            breakpoints,
            model_id: config.debug_model.clone(),
            data: Mutex::new(SessionData::new()),
            event_tx,
        });

        core.emit(SessionEvent::Created);

        let dispatcher = Arc::new(EventDispatcher::new(Arc::downgrade(&core)));
        core.vm.attach(dispatcher.clone()).map_err(|e| {
            error!(%endpoint, error = %e, "Failed to attach to remote VM");
            SessionError::Attach(e)
        })?;

        core.started(dispatcher);

        Ok(Self {
            core,
            events: event_rx,
        })
    }

    /// Receiver of lifecycle events, in the order they were produced.
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> SessionState {
        self.core.lock().state
    }

    pub fn is_suspended(&self) -> bool {
        self.core.lock().is_suspended()
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == SessionState::Terminated
    }

    pub fn model_id(&self) -> &str {
        &self.core.model_id
    }

    /// Installs `breakpoint` on the remote VM if its line is mapped.
    pub fn add_breakpoint(&self, breakpoint: &SourceBreakpoint) -> Option<TranslatedBreakpoint> {
        self.core.add_breakpoint(breakpoint)
    }

    pub fn remove_breakpoint(&self, breakpoint: &SourceBreakpoint) {
        self.core.remove_breakpoint(breakpoint)
    }

    pub fn installed_breakpoints(&self) -> Vec<TranslatedBreakpoint> {
        self.core.lock().installed.values().cloned().collect()
    }

    pub fn resume(&self) -> Result<(), SessionError> {
        self.core.step(StepAction::Continue, ResumeReason::ClientRequest)
    }

    pub fn step_over(&self) -> Result<(), SessionError> {
        self.core.step(StepAction::Over, ResumeReason::StepOver)
    }

    pub fn step_into(&self) -> Result<(), SessionError> {
        self.core.step(StepAction::In, ResumeReason::StepInto)
    }

    pub fn step_out(&self) -> Result<(), SessionError> {
        self.core.step(StepAction::Out, ResumeReason::StepReturn)
    }

    /// Requests a pause. The session becomes suspended when the VM confirms it.
    pub fn suspend(&self) -> Result<(), SessionError> {
        self.core.suspend()
    }

    pub fn terminate(&self) -> Result<(), SessionError> {
        self.core.terminate()
    }

    pub fn thread(&self) -> DebugThread {
        self.core.lock().thread.clone()
    }

    pub fn threads(&self) -> Vec<DebugThread> {
        vec![self.thread()]
    }

    /// Stack frames of the suspended VM, innermost first. Empty unless suspended.
    pub fn stack_frames(&self) -> Vec<StackFrame> {
        let context = {
            let data = self.core.lock();
            if !data.is_suspended() {
                return Vec::new();
            }
            data.context.clone()
        };

        context
            .map(|context| StackFrame::translate_all(&context.call_frames(), &self.core.registry))
            .unwrap_or_default()
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        if !self.is_terminated() {
            let _ = self.terminate();
        }
    }
}
