//! Execution-state tracking.
//!
//! Each hook name records the outcome of its most recent dispatch only:
//! every dispatch resets the name to [`HookState::Processed`] before any
//! callback runs, so a name that ran earlier drops back to `Processed` if a
//! later dispatch finds nothing to invoke.
//!
//! The current-action and current-filter cursors are single slots. A nested
//! dispatch overwrites the slot and clears it when it finishes, so the
//! outer dispatch's name is not restored.

use std::cell::RefCell;
use std::collections::HashMap;

use serde::Serialize;

use crate::name::HookName;
use crate::registry::{HookKind, HookRegistry};

/// Outcome of the latest dispatch of a hook name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookState {
    /// Never dispatched.
    #[default]
    Unset,
    /// Dispatched, but no callback has been applied yet.
    Processed,
    /// At least one callback was applied.
    Run,
}

#[derive(Default)]
pub(crate) struct ExecutionState {
    records: RefCell<HashMap<HookName, HookState>>,
    current_action: RefCell<Option<HookName>>,
    current_filter: RefCell<Option<HookName>>,
}

impl ExecutionState {
    pub(crate) fn mark(&self, name: &HookName, state: HookState) {
        let _ = self.records.borrow_mut().insert(name.clone(), state);
    }

    fn get(&self, name: &HookName) -> HookState {
        self.records.borrow().get(name).copied().unwrap_or_default()
    }

    fn executed(&self) -> Vec<HookName> {
        let mut names: Vec<HookName> = self
            .records
            .borrow()
            .iter()
            .filter(|(_, state)| **state == HookState::Run)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn slot(&self, kind: HookKind) -> &RefCell<Option<HookName>> {
        match kind {
            HookKind::Action => &self.current_action,
            HookKind::Filter => &self.current_filter,
        }
    }

    /// Point the cursor for `kind` at `name` until the guard drops.
    pub(crate) fn enter(&self, kind: HookKind, name: &HookName) -> CursorGuard<'_> {
        let slot = self.slot(kind);
        *slot.borrow_mut() = Some(name.clone());
        CursorGuard { slot }
    }

    fn current(&self, kind: HookKind) -> Option<HookName> {
        self.slot(kind).borrow().clone()
    }

    pub(crate) fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

/// Empties a cursor slot on drop, including when a callback fails or
/// panics.
pub(crate) struct CursorGuard<'a> {
    slot: &'a RefCell<Option<HookName>>,
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        *self.slot.borrow_mut() = None;
    }
}

impl HookRegistry {
    /// Whether the latest dispatch of `name` applied at least one callback.
    pub fn has_run(&self, name: &str) -> bool {
        self.hook_state(name) == HookState::Run
    }

    /// Outcome of the latest dispatch of `name`.
    pub fn hook_state(&self, name: &str) -> HookState {
        self.state.get(&self.canonicalize(name))
    }

    /// Canonical names whose latest dispatch applied a callback, sorted.
    pub fn executed_hooks(&self) -> Vec<HookName> {
        self.state.executed()
    }

    /// Action being dispatched right now, if any.
    pub fn current_action(&self) -> Option<HookName> {
        self.state.current(HookKind::Action)
    }

    /// Filter being applied right now, if any.
    pub fn current_filter(&self) -> Option<HookName> {
        self.state.current(HookKind::Filter)
    }
}
