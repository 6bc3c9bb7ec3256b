use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Line breakpoint in source coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceBreakpoint {
    /// Unique identifier for the breakpoint
    pub id: BreakpointId,
    /// Debug model the breakpoint belongs to
    pub model_id: String,
    /// Path of the source file
    pub path: String,
    /// 1-based line in the source file
    pub line: u32,
    /// Whether the breakpoint is enabled
    pub enabled: bool,
    /// Condition evaluated by the remote VM
    pub condition: Option<String>,
}

/// Observer of breakpoint additions, removals and changes.
pub trait BreakpointListener: Send + Sync {
    fn breakpoint_added(&self, breakpoint: &SourceBreakpoint);

    fn breakpoint_removed(&self, breakpoint: &SourceBreakpoint);

    fn breakpoint_changed(&self, breakpoint: &SourceBreakpoint);
}

/// Source of breakpoints and breakpoint change notifications.
pub trait BreakpointManager: Send + Sync {
    /// Breakpoints belonging to `model_id`.
    fn breakpoints(&self, model_id: &str) -> Vec<SourceBreakpoint>;

    fn add_listener(&self, listener: Arc<dyn BreakpointListener>) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}

#[derive(Default)]
struct StoreInner {
    breakpoints: BTreeMap<BreakpointId, SourceBreakpoint>,
    listeners: Vec<(ListenerId, Arc<dyn BreakpointListener>)>,
    next_breakpoint_id: u64,
    next_listener_id: u64,
}

/// In-memory [`BreakpointManager`].
///
/// Listeners are notified after the store lock is released, so they may query
/// the store from their callbacks.
#[derive(Default)]
pub struct BreakpointStore {
    inner: Mutex<StoreInner>,
}

impl std::fmt::Debug for BreakpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("BreakpointStore")
            .field("breakpoints", &inner.breakpoints)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl BreakpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> Vec<Arc<dyn BreakpointListener>> {
        self.lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    /// Adds an enabled breakpoint and notifies listeners.
    pub fn add(&self, model_id: &str, path: &str, line: u32) -> BreakpointId {
        self.add_with_condition(model_id, path, line, None)
    }

    pub fn add_with_condition(
        &self,
        model_id: &str,
        path: &str,
        line: u32,
        condition: Option<String>,
    ) -> BreakpointId {
        let breakpoint = {
            let mut inner = self.lock();
            inner.next_breakpoint_id += 1;
            let breakpoint = SourceBreakpoint {
                id: BreakpointId(inner.next_breakpoint_id),
                model_id: model_id.to_string(),
                path: path.to_string(),
                line,
                enabled: true,
                condition,
            };
            inner
                .breakpoints
                .insert(breakpoint.id, breakpoint.clone());
            breakpoint
        };

        debug!(id = breakpoint.id.0, path = %path, line = line, "Breakpoint added");
        for listener in self.listeners() {
            listener.breakpoint_added(&breakpoint);
        }
        breakpoint.id
    }

    pub fn remove(&self, id: BreakpointId) -> Option<SourceBreakpoint> {
        let removed = self.lock().breakpoints.remove(&id)?;

        debug!(id = id.0, "Breakpoint removed");
        for listener in self.listeners() {
            listener.breakpoint_removed(&removed);
        }
        Some(removed)
    }

    pub fn set_enabled(&self, id: BreakpointId, enabled: bool) -> bool {
        self.update(id, |breakpoint| breakpoint.enabled = enabled)
    }

    pub fn set_line(&self, id: BreakpointId, line: u32) -> bool {
        self.update(id, |breakpoint| breakpoint.line = line)
    }

    pub fn set_condition(&self, id: BreakpointId, condition: Option<String>) -> bool {
        self.update(id, |breakpoint| breakpoint.condition = condition)
    }

    fn update(&self, id: BreakpointId, f: impl FnOnce(&mut SourceBreakpoint)) -> bool {
        let changed = {
            let mut inner = self.lock();
            let Some(breakpoint) = inner.breakpoints.get_mut(&id) else {
                return false;
            };
            f(breakpoint);
            breakpoint.clone()
        };

        debug!(id = id.0, enabled = changed.enabled, line = changed.line, "Breakpoint changed");
        for listener in self.listeners() {
            listener.breakpoint_changed(&changed);
        }
        true
    }

    pub fn get(&self, id: BreakpointId) -> Option<SourceBreakpoint> {
        self.lock().breakpoints.get(&id).cloned()
    }
}

impl BreakpointManager for BreakpointStore {
    fn breakpoints(&self, model_id: &str) -> Vec<SourceBreakpoint> {
        self.lock()
            .breakpoints
            .values()
            .filter(|breakpoint| breakpoint.model_id == model_id)
            .cloned()
            .collect()
    }

    fn add_listener(&self, listener: Arc<dyn BreakpointListener>) -> ListenerId {
        let mut inner = self.lock();
        inner.next_listener_id += 1;
        let id = ListenerId(inner.next_listener_id);
        inner.listeners.push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.lock().listeners.retain(|(listener_id, _)| *listener_id != id);
    }
}
