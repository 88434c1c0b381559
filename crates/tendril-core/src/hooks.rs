//! Lifecycle hooks
//!
//! Hooks run synchronously inside the engine call that triggers them. An
//! error from a `pre_*` hook aborts the operation before the store is touched.
//! `post_*` hooks run once the write has committed; every one of them runs,
//! and their errors are logged rather than returned.

use crate::error::{Error, Result};
use crate::instance::NodeInstance;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    PreSave,
    PostSave,
    PostCreate,
    PreDelete,
    PostDelete,
}

pub type Hook = Arc<dyn Fn(&mut NodeInstance) -> Result<()> + Send + Sync>;

struct Registration {
    event: HookEvent,
    /// `None` applies to every kind
    kind: Option<String>,
    hook: Hook,
}

/// Registered hooks, run in registration order
#[derive(Default)]
pub struct HookDispatcher {
    hooks: RwLock<Vec<Registration>>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event: HookEvent, kind: Option<&str>, hook: Hook) {
        let registration = Registration {
            event,
            kind: kind.map(str::to_string),
            hook,
        };
        match self.hooks.write() {
            Ok(mut hooks) => hooks.push(registration),
            Err(poisoned) => poisoned.into_inner().push(registration),
        }
    }

    fn selected(&self, event: HookEvent, instance: &NodeInstance) -> Vec<Hook> {
        // Clone out so a hook may register further hooks without deadlocking
        let hooks = match self.hooks.read() {
            Ok(hooks) => hooks,
            Err(poisoned) => poisoned.into_inner(),
        };
        hooks
            .iter()
            .filter(|r| r.event == event)
            .filter(|r| r.kind.as_deref().map_or(true, |k| k == instance.label()))
            .map(|r| r.hook.clone())
            .collect()
    }

    /// Run hooks in order, stopping at the first error
    pub fn dispatch(&self, event: HookEvent, instance: &mut NodeInstance) -> Result<()> {
        for hook in self.selected(event, instance) {
            tracing::trace!("Running {:?} hook on {}", event, instance.describe());
            hook(instance)?;
        }
        Ok(())
    }

    /// Run every hook, returning the errors of those that failed
    pub fn dispatch_all(&self, event: HookEvent, instance: &mut NodeInstance) -> Vec<Error> {
        self.selected(event, instance)
            .into_iter()
            .filter_map(|hook| {
                tracing::trace!("Running {:?} hook on {}", event, instance.describe());
                hook(instance).err()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("hooks", &self.len())
            .finish()
    }
}
