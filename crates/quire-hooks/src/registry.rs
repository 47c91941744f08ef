//! Hook registry.
//!
//! Holds, separately for actions and filters,
//! `name -> priority -> callback id -> callback`. Priorities iterate in
//! ascending order; entries inside a priority bucket keep registration
//! order, and re-registering an id replaces the callback in its original
//! slot.
//!
//! The registry is single-threaded: state sits behind `RefCell`s and no
//! borrow is held while a callback runs, so callbacks may register, remove
//! and dispatch re-entrantly.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;

use indexmap::IndexMap;
use quire_settings::{HookSettings, MAX_HOOK_PRIORITY};
use tracing::{debug, warn};

use crate::callback::{Callback, CallbackId, HookFn, Resolved};
use crate::errors::{HookError, HookResult};
use crate::name::{HookName, HookNames, NameCanonicalizer};
use crate::output::OutputSink;
use crate::state::ExecutionState;

/// Priority used when the caller has no preference.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Highest allowed priority.
pub const MAX_PRIORITY: i32 = MAX_HOOK_PRIORITY;

/// Which half of the registry an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    /// Side-effect callbacks.
    Action,
    /// Value-transforming callbacks.
    Filter,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => f.write_str("action"),
            Self::Filter => f.write_str("filter"),
        }
    }
}

type Bucket = IndexMap<CallbackId, Callback>;

/// Registrations for one kind of hook.
#[derive(Default)]
pub(crate) struct HookTable {
    hooks: HashMap<HookName, BTreeMap<i32, Bucket>>,
}

impl HookTable {
    fn insert(&mut self, name: HookName, priority: i32, callback: Callback) {
        let id = callback.id();
        let _ = self
            .hooks
            .entry(name)
            .or_default()
            .entry(priority)
            .or_default()
            .insert(id, callback);
    }

    fn remove(&mut self, name: &HookName, priority: i32, id: &CallbackId) -> bool {
        let Some(priorities) = self.hooks.get_mut(name) else {
            return false;
        };
        let Some(bucket) = priorities.get_mut(&priority) else {
            return false;
        };
        if bucket.shift_remove(id).is_none() {
            return false;
        }
        if bucket.is_empty() {
            let _ = priorities.remove(&priority);
        }
        if priorities.is_empty() {
            let _ = self.hooks.remove(name);
        }
        true
    }

    fn contains(&self, name: &HookName) -> bool {
        self.hooks
            .get(name)
            .is_some_and(|priorities| priorities.values().any(|bucket| !bucket.is_empty()))
    }

    fn count(&self, name: &HookName) -> usize {
        self.hooks
            .get(name)
            .map_or(0, |priorities| priorities.values().map(IndexMap::len).sum())
    }

    fn total(&self) -> usize {
        self.hooks
            .values()
            .flat_map(BTreeMap::values)
            .map(IndexMap::len)
            .sum()
    }

    /// Callbacks for `name` in dispatch order, detached from the live table.
    pub(crate) fn snapshot(&self, name: &HookName) -> Vec<(i32, Callback)> {
        self.hooks
            .get(name)
            .map(|priorities| {
                priorities
                    .iter()
                    .flat_map(|(priority, bucket)| {
                        bucket
                            .values()
                            .map(move |callback| (*priority, callback.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clear(&mut self) {
        self.hooks.clear();
    }
}

/// Registry of action and filter callbacks.
///
/// Owned by the application context and passed to collaborators; nothing is
/// process-global, so separate instances are fully isolated.
pub struct HookRegistry {
    pub(crate) canonicalizer: NameCanonicalizer,
    default_priority: i32,
    functions: RefCell<HashMap<String, HookFn>>,
    pub(crate) actions: RefCell<HookTable>,
    pub(crate) filters: RefCell<HookTable>,
    pub(crate) state: ExecutionState,
    pub(crate) output: OutputSink,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Create an empty registry with default settings, writing output to
    /// stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::from_settings(&HookSettings::default())
    }

    /// Create an empty registry configured from `settings`.
    ///
    /// A default priority outside `0..=10000` falls back to
    /// [`DEFAULT_PRIORITY`].
    #[must_use]
    pub fn from_settings(settings: &HookSettings) -> Self {
        let default_priority = if (0..=MAX_PRIORITY).contains(&settings.default_priority) {
            settings.default_priority
        } else {
            warn!(
                priority = settings.default_priority,
                "default hook priority out of range, using {DEFAULT_PRIORITY}"
            );
            DEFAULT_PRIORITY
        };

        Self {
            canonicalizer: NameCanonicalizer::from_settings(settings),
            default_priority,
            functions: RefCell::new(HashMap::new()),
            actions: RefCell::new(HookTable::default()),
            filters: RefCell::new(HookTable::default()),
            state: ExecutionState::default(),
            output: OutputSink::stdout(),
        }
    }

    /// Send uncaptured output to `writer` instead of stdout.
    #[must_use]
    pub fn with_output(mut self, writer: impl Write + 'static) -> Self {
        self.output = OutputSink::new(Box::new(writer));
        self
    }

    /// Priority configured by `hooks.defaultPriority`, used by
    /// [`add_action_default`](Self::add_action_default) and
    /// [`add_filter_default`](Self::add_filter_default).
    pub fn default_priority(&self) -> i32 {
        self.default_priority
    }

    /// Canonicalize a name with this registry's rules.
    pub fn canonicalize(&self, name: &str) -> HookName {
        self.canonicalizer.canonicalize(name)
    }

    /// Make a named function invocable as a [`Callback::Function`] (plain
    /// name) or [`Callback::Static`] (`Type::method`). Redefining a name
    /// replaces the function for existing registrations too.
    pub fn define_function(&self, name: impl Into<String>, function: HookFn) {
        let name = name.into();
        debug!(function = %name, "defining hook function");
        let _ = self.functions.borrow_mut().insert(name, function);
    }

    /// Whether a named function has been defined.
    pub fn is_defined(&self, name: &str) -> bool {
        self.functions.borrow().contains_key(name)
    }

    /// Register an action callback under one or more names.
    ///
    /// Fails with [`HookError::InvalidHookName`] when a name canonicalizes
    /// to nothing (`""`, `"123"`, `"!!!"`), with
    /// [`HookError::PriorityOutOfRange`] outside `0..=10000`, and with
    /// [`HookError::InvalidCallback`] when the callback cannot be invoked.
    /// Each is wrapped in [`HookError::Registration`]; on failure no name is
    /// registered.
    pub fn add_action(
        &self,
        names: impl Into<HookNames>,
        callback: Callback,
        priority: i32,
    ) -> HookResult<()> {
        self.add(HookKind::Action, &names.into(), callback, priority)
    }

    /// Register a filter callback (or sentinel) under one or more names.
    /// Validation is the same as for [`add_action`](Self::add_action).
    pub fn add_filter(
        &self,
        names: impl Into<HookNames>,
        callback: Callback,
        priority: i32,
    ) -> HookResult<()> {
        self.add(HookKind::Filter, &names.into(), callback, priority)
    }

    /// [`add_action`](Self::add_action) at the configured default priority.
    pub fn add_action_default(
        &self,
        names: impl Into<HookNames>,
        callback: Callback,
    ) -> HookResult<()> {
        self.add_action(names, callback, self.default_priority)
    }

    /// [`add_filter`](Self::add_filter) at the configured default priority.
    pub fn add_filter_default(
        &self,
        names: impl Into<HookNames>,
        callback: Callback,
    ) -> HookResult<()> {
        self.add_filter(names, callback, self.default_priority)
    }

    /// Remove an action registration. Returns `true` if any name had it.
    pub fn remove_action(
        &self,
        names: impl Into<HookNames>,
        callback: &Callback,
        priority: i32,
    ) -> bool {
        self.remove(HookKind::Action, &names.into(), callback, priority)
    }

    /// Remove a filter registration. Returns `true` if any name had it.
    pub fn remove_filter(
        &self,
        names: impl Into<HookNames>,
        callback: &Callback,
        priority: i32,
    ) -> bool {
        self.remove(HookKind::Filter, &names.into(), callback, priority)
    }

    /// Whether any action is registered for `name`.
    pub fn has_action(&self, name: &str) -> bool {
        self.table(HookKind::Action)
            .borrow()
            .contains(&self.canonicalize(name))
    }

    /// Whether any filter is registered for `name`.
    pub fn has_filter(&self, name: &str) -> bool {
        self.table(HookKind::Filter)
            .borrow()
            .contains(&self.canonicalize(name))
    }

    /// Whether any action or filter is registered for `name`.
    pub fn has_hook(&self, name: &str) -> bool {
        self.has_action(name) || self.has_filter(name)
    }

    /// Number of action callbacks registered for `name`.
    pub fn action_count(&self, name: &str) -> usize {
        self.table(HookKind::Action)
            .borrow()
            .count(&self.canonicalize(name))
    }

    /// Number of filter callbacks registered for `name`.
    pub fn filter_count(&self, name: &str) -> usize {
        self.table(HookKind::Filter)
            .borrow()
            .count(&self.canonicalize(name))
    }

    /// Drop every registration and execution record. Defined functions
    /// are kept.
    pub fn clear(&self) {
        self.actions.borrow_mut().clear();
        self.filters.borrow_mut().clear();
        self.state.clear();
        debug!("cleared hook registry");
    }

    pub(crate) fn table(&self, kind: HookKind) -> &RefCell<HookTable> {
        match kind {
            HookKind::Action => &self.actions,
            HookKind::Filter => &self.filters,
        }
    }

    fn add(
        &self,
        kind: HookKind,
        names: &HookNames,
        callback: Callback,
        priority: i32,
    ) -> HookResult<()> {
        let canonical = match self.validate(names, &callback, priority) {
            Ok(canonical) => canonical,
            Err((hook, err)) => {
                warn!(kind = %kind, hook = %hook, error = %err, "rejected hook registration");
                return Err(HookError::registration(hook, err));
            }
        };

        let mut table = self.table(kind).borrow_mut();
        for name in canonical {
            debug!(kind = %kind, hook = %name, priority, callback = %callback.id(), "registered hook");
            table.insert(name, priority, callback.clone());
        }
        Ok(())
    }

    /// Check everything up front so a failed call writes nothing. Errors
    /// carry the hook name to report.
    fn validate(
        &self,
        names: &HookNames,
        callback: &Callback,
        priority: i32,
    ) -> Result<Vec<HookName>, (String, HookError)> {
        if !(0..=MAX_PRIORITY).contains(&priority) {
            return Err((names.describe(), HookError::PriorityOutOfRange(priority)));
        }
        if names.is_empty() {
            return Err((
                names.describe(),
                HookError::InvalidHookName("no hook names given".to_string()),
            ));
        }

        let mut canonical = Vec::with_capacity(names.len());
        for raw in names.iter() {
            let name = self.canonicalize(raw);
            if name.is_empty() {
                return Err((
                    raw.to_string(),
                    HookError::InvalidHookName(format!("'{raw}' has no usable characters")),
                ));
            }
            canonical.push(name);
        }

        self.validate_callback(callback)
            .map_err(|err| (names.describe(), err))?;
        Ok(canonical)
    }

    fn validate_callback(&self, callback: &Callback) -> HookResult<()> {
        match callback {
            Callback::Sentinel(_) => Ok(()),
            Callback::Closure(_) => Err(HookError::InvalidCallback(
                "cannot be a closure".to_string(),
            )),
            Callback::Function(name) if name.trim().is_empty() => {
                Err(HookError::InvalidCallback("empty callback".to_string()))
            }
            Callback::Function(name) => {
                if self.is_defined(name) {
                    Ok(())
                } else {
                    Err(HookError::InvalidCallback(format!(
                        "not callable: function '{name}' is not defined"
                    )))
                }
            }
            Callback::Static { type_name, method } => {
                if type_name.is_empty() || method.is_empty() {
                    return Err(HookError::InvalidCallback(format!(
                        "malformed callback pair [{type_name:?}, {method:?}]"
                    )));
                }
                let key = format!("{type_name}::{method}");
                if self.is_defined(&key) {
                    Ok(())
                } else {
                    Err(HookError::InvalidCallback(format!(
                        "not callable: '{key}' is not defined"
                    )))
                }
            }
            Callback::Method { target, method } => {
                if method.is_empty() {
                    return Err(HookError::InvalidCallback(format!(
                        "malformed callback pair [{}, \"\"]",
                        target.type_name()
                    )));
                }
                if target.responds_to(method) {
                    Ok(())
                } else {
                    Err(HookError::InvalidCallback(format!(
                        "not callable: {}::{method}",
                        target.type_name()
                    )))
                }
            }
        }
    }

    fn remove(&self, kind: HookKind, names: &HookNames, callback: &Callback, priority: i32) -> bool {
        let id = callback.id();
        let mut table = self.table(kind).borrow_mut();
        let mut removed = false;
        for raw in names.iter() {
            let name = self.canonicalize(raw);
            if name.is_empty() {
                continue;
            }
            if table.remove(&name, priority, &id) {
                debug!(kind = %kind, hook = %name, priority, callback = %id, "removed hook");
                removed = true;
            }
        }
        removed
    }

    /// Resolve a registered callback to something callable now, or `None`
    /// if it no longer is.
    pub(crate) fn resolve(&self, callback: &Callback) -> Option<Resolved> {
        match callback {
            Callback::Sentinel(sentinel) => Some(Resolved::Fixed(sentinel.value())),
            Callback::Function(name) => self
                .functions
                .borrow()
                .get(name)
                .copied()
                .map(Resolved::Function),
            Callback::Static { type_name, method } => self
                .functions
                .borrow()
                .get(&format!("{type_name}::{method}"))
                .copied()
                .map(Resolved::Function),
            Callback::Method { target, method } => {
                target.responds_to(method).then(|| Resolved::Method {
                    target: target.clone(),
                    method: method.clone(),
                })
            }
            Callback::Closure(_) => None,
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("action_count", &self.actions.borrow().total())
            .field("filter_count", &self.filters.borrow().total())
            .field("default_priority", &self.default_priority)
            .finish_non_exhaustive()
    }
}
