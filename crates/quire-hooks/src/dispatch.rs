//! Action and filter dispatch.
//!
//! Both dispatchers canonicalize the name, point their cursor at it, mark it
//! [`HookState::Processed`], then walk a snapshot of the registered
//! callbacks: priorities ascending, registration order within a priority.
//! Callbacks added or removed while the dispatch runs do not affect the
//! walk already in progress.
//!
//! Callback errors are never caught here. The first error stops the
//! dispatch and is returned unchanged; the cursor is cleared on every exit.

use serde_json::Value;
use tracing::{debug, trace};

use crate::callback::HookCall;
use crate::errors::HookResult;
use crate::registry::{HookKind, HookRegistry};
use crate::state::HookState;

impl HookRegistry {
    /// Invoke every action registered for `name`, discarding return values.
    ///
    /// Callbacks receive `params` and the name as passed here. Dispatching a
    /// name with no callbacks still marks it `Processed`. A name that
    /// canonicalizes to nothing is ignored.
    pub fn do_action(&self, name: &str, params: &Value) -> HookResult<()> {
        let hook = self.canonicalize(name);
        if hook.is_empty() {
            debug!(name, "ignoring action with empty hook name");
            return Ok(());
        }

        let _cursor = self.state.enter(HookKind::Action, &hook);
        self.state.mark(&hook, HookState::Processed);

        let callbacks = self.actions.borrow().snapshot(&hook);
        if callbacks.is_empty() {
            trace!(hook = %hook, "no actions registered");
            return Ok(());
        }

        debug!(hook = %hook, callbacks = callbacks.len(), "dispatching action");
        for (priority, callback) in callbacks {
            let resolved = match self.resolve(&callback) {
                Some(resolved) if !resolved.is_fixed() => resolved,
                _ => {
                    debug!(hook = %hook, priority, callback = %callback.id(), "skipping non-invocable action");
                    continue;
                }
            };
            let _ = resolved.invoke(HookCall::new(self, name, params, Value::Null))?;
            self.state.mark(&hook, HookState::Run);
        }
        Ok(())
    }

    /// Thread `value` through every filter registered for `name` and return
    /// the result.
    ///
    /// Each callback receives the current value, `params` and the name as
    /// passed here; its return value replaces the current value, whatever
    /// its type. Sentinels replace it with their fixed literal. With no
    /// filters registered, `value` comes back unchanged.
    pub fn apply_filter(&self, name: &str, value: Value, params: &Value) -> HookResult<Value> {
        let hook = self.canonicalize(name);
        if hook.is_empty() {
            debug!(name, "ignoring filter with empty hook name");
            return Ok(value);
        }

        let _cursor = self.state.enter(HookKind::Filter, &hook);
        self.state.mark(&hook, HookState::Processed);

        let callbacks = self.filters.borrow().snapshot(&hook);
        if callbacks.is_empty() {
            trace!(hook = %hook, "no filters registered");
            return Ok(value);
        }

        debug!(hook = %hook, callbacks = callbacks.len(), "applying filter");
        let mut value = value;
        for (priority, callback) in callbacks {
            let Some(resolved) = self.resolve(&callback) else {
                debug!(hook = %hook, priority, callback = %callback.id(), "skipping non-invocable filter");
                continue;
            };
            value = resolved.invoke(HookCall::new(self, name, params, value))?;
            self.state.mark(&hook, HookState::Run);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::callback::{Callback, HookTarget, Sentinel};
    use crate::errors::HookError;

    /// Records every method call as `"<label>:<hook>"`.
    struct Recorder {
        label: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        active: Cell<bool>,
    }

    impl Recorder {
        fn new(label: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Rc<Self> {
            Rc::new(Self {
                label,
                log: Rc::clone(log),
                active: Cell::new(true),
            })
        }
    }

    impl HookTarget for Recorder {
        fn type_name(&self) -> &str {
            "Recorder"
        }
        fn responds_to(&self, method: &str) -> bool {
            method == "record" && self.active.get()
        }
        fn call_method(&self, _method: &str, call: HookCall<'_>) -> HookResult<Value> {
            self.log
                .borrow_mut()
                .push(format!("{}:{}", self.label, call.hook()));
            Ok(json!("ignored"))
        }
    }

    fn append(call: HookCall<'_>) -> HookResult<Value> {
        let suffix = call.param("suffix").and_then(Value::as_str).unwrap_or("?");
        let current = call.value.as_str().unwrap_or_default();
        Ok(Value::String(format!("{current}{suffix}")))
    }

    fn upper(call: HookCall<'_>) -> HookResult<Value> {
        Ok(Value::String(call.value.as_str().unwrap_or_default().to_uppercase()))
    }

    fn length(call: HookCall<'_>) -> HookResult<Value> {
        Ok(json!(call.value.as_str().map_or(0, str::len)))
    }

    fn fail(call: HookCall<'_>) -> HookResult<Value> {
        Err(HookError::handler(call.hook(), "boom"))
    }

    fn echo_hook(call: HookCall<'_>) -> HookResult<Value> {
        call.echo(call.hook())?;
        Ok(Value::Null)
    }

    fn cursor_probe(call: HookCall<'_>) -> HookResult<Value> {
        let registry = call.registry();
        let current = registry.current_action().map(|n| n.into_inner());
        call.echo(&format!("{};", current.unwrap_or_default()))?;
        Ok(Value::Null)
    }

    fn nested_dispatch(call: HookCall<'_>) -> HookResult<Value> {
        let registry = call.registry();
        registry.do_action("inner", call.params())?;
        let after = registry.current_action().map(|n| n.into_inner());
        call.echo(&format!("after:{};", after.unwrap_or_default()))?;
        Ok(Value::Null)
    }

    fn register_late(call: HookCall<'_>) -> HookResult<Value> {
        call.echo("first;")?;
        call.registry()
            .add_action(call.hook(), Callback::function("echo_hook"), 10)?;
        Ok(Value::Null)
    }

    fn remove_later(call: HookCall<'_>) -> HookResult<Value> {
        call.echo("remover;")?;
        let _ = call
            .registry()
            .remove_action(call.hook(), &Callback::function("echo_hook"), 20);
        Ok(Value::Null)
    }

    fn append_and_register_upper(call: HookCall<'_>) -> HookResult<Value> {
        call.registry()
            .add_filter(call.hook(), Callback::function("upper"), 10)?;
        append(call)
    }

    fn append_and_remove_upper(call: HookCall<'_>) -> HookResult<Value> {
        let _ = call
            .registry()
            .remove_filter(call.hook(), &Callback::function("upper"), 20);
        append(call)
    }

    fn registry() -> HookRegistry {
        let registry = HookRegistry::new().with_output(std::io::sink());
        registry.define_function("append", append);
        registry.define_function("upper", upper);
        registry.define_function("length", length);
        registry.define_function("fail", fail);
        registry.define_function("echo_hook", echo_hook);
        registry.define_function("cursor_probe", cursor_probe);
        registry.define_function("nested_dispatch", nested_dispatch);
        registry.define_function("register_late", register_late);
        registry.define_function("remove_later", remove_later);
        registry.define_function("append_and_register_upper", append_and_register_upper);
        registry.define_function("append_and_remove_upper", append_and_remove_upper);
        registry
    }

    #[test]
    fn actions_run_in_priority_then_registration_order() {
        let registry = registry();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = Recorder::new("A", &log);
        let b = Recorder::new("B", &log);
        let c = Recorder::new("C", &log);
        registry.add_action("app.init", Callback::method(a, "record"), 10).unwrap();
        registry.add_action("app.init", Callback::method(b, "record"), 10).unwrap();
        registry.add_action("app.init", Callback::method(c, "record"), 20).unwrap();

        registry.do_action("app.init", &json!({})).unwrap();
        assert_eq!(*log.borrow(), vec!["A:app.init", "B:app.init", "C:app.init"]);
    }

    #[test]
    fn lower_priority_registered_later_still_runs_first() {
        let registry = registry();
        let log = Rc::new(RefCell::new(Vec::new()));
        registry
            .add_action("boot", Callback::method(Recorder::new("late", &log), "record"), 50)
            .unwrap();
        registry
            .add_action("boot", Callback::method(Recorder::new("early", &log), "record"), 0)
            .unwrap();

        registry.do_action("BOOT", &json!({})).unwrap();
        assert_eq!(*log.borrow(), vec!["early:BOOT", "late:BOOT"]);
    }

    #[test]
    fn action_on_unregistered_name_marks_processed() {
        let registry = registry();
        registry.do_action("nothing.here", &json!({})).unwrap();
        assert_eq!(registry.hook_state("nothing/here"), HookState::Processed);
        assert!(!registry.has_run("nothing.here"));
    }

    #[test]
    fn action_marks_run() {
        let registry = registry();
        registry.add_action("x", Callback::function("echo_hook"), 10).unwrap();
        registry.do_action("x", &json!({})).unwrap();
        assert!(registry.has_run("x"));
        assert_eq!(registry.executed_hooks(), vec![registry.canonicalize("x")]);
    }

    #[test]
    fn has_run_reflects_latest_dispatch_only() {
        let registry = registry();
        let callback = Callback::function("echo_hook");
        registry.add_action("x", callback.clone(), 10).unwrap();
        registry.do_action("x", &json!({})).unwrap();
        assert!(registry.has_run("x"));

        assert!(registry.remove_action("x", &callback, 10));
        registry.do_action("x", &json!({})).unwrap();
        assert!(!registry.has_run("x"));
        assert_eq!(registry.hook_state("x"), HookState::Processed);
        assert!(registry.executed_hooks().is_empty());
    }

    #[test]
    fn empty_name_is_a_no_op() {
        let registry = registry();
        registry.do_action("!!!", &json!({})).unwrap();
        assert_eq!(registry.apply_filter("123", json!(7), &json!({})).unwrap(), json!(7));
        assert_eq!(registry.hook_state(""), HookState::Unset);
    }

    #[test]
    fn action_error_propagates_and_stops_dispatch() {
        let registry = registry();
        let log = Rc::new(RefCell::new(Vec::new()));
        registry.add_action("x", Callback::function("fail"), 10).unwrap();
        registry
            .add_action("x", Callback::method(Recorder::new("after", &log), "record"), 20)
            .unwrap();

        let err = registry.do_action("x", &json!({})).unwrap_err();
        assert_matches!(err, HookError::Handler { ref name, ref message } if name == "x" && message == "boom");
        assert!(log.borrow().is_empty());
        assert_eq!(registry.hook_state("x"), HookState::Processed);
    }

    #[test]
    fn cursor_empty_before_during_and_after() {
        let registry = registry();
        registry.add_action("app.init", Callback::function("cursor_probe"), 10).unwrap();
        assert_eq!(registry.current_action(), None);

        let output = registry.capture_output("App.Init", &json!({})).unwrap();
        assert_eq!(output, "app/init;");
        assert_eq!(registry.current_action(), None);
    }

    #[test]
    fn cursor_cleared_after_callback_error() {
        let registry = registry();
        registry.add_action("x", Callback::function("fail"), 10).unwrap();
        registry.add_filter("y", Callback::function("fail"), 10).unwrap();

        assert!(registry.do_action("x", &json!({})).is_err());
        assert_eq!(registry.current_action(), None);
        assert!(registry.apply_filter("y", json!(1), &json!({})).is_err());
        assert_eq!(registry.current_filter(), None);
    }

    #[test]
    fn nested_dispatch_leaves_cursor_empty() {
        let registry = registry();
        registry.add_action("outer", Callback::function("nested_dispatch"), 10).unwrap();
        registry.add_action("inner", Callback::function("cursor_probe"), 10).unwrap();

        let output = registry.capture_output("outer", &json!({})).unwrap();
        assert_eq!(output, "inner;after:;");
        assert!(registry.has_run("outer"));
        assert!(registry.has_run("inner"));
    }

    #[test]
    fn callbacks_added_during_dispatch_wait_for_next_dispatch() {
        let registry = registry();
        registry.add_action("grow", Callback::function("register_late"), 1).unwrap();

        assert_eq!(registry.capture_output("grow", &json!({})).unwrap(), "first;");
        assert_eq!(registry.action_count("grow"), 2);
        assert_eq!(registry.capture_output("grow", &json!({})).unwrap(), "first;grow");
    }

    #[test]
    fn callbacks_removed_during_dispatch_still_run_once() {
        let registry = registry();
        registry.add_action("shrink", Callback::function("remove_later"), 10).unwrap();
        registry.add_action("shrink", Callback::function("echo_hook"), 20).unwrap();

        assert_eq!(
            registry.capture_output("shrink", &json!({})).unwrap(),
            "remover;shrink"
        );
        assert_eq!(registry.capture_output("shrink", &json!({})).unwrap(), "remover;");
    }

    #[test]
    fn filters_added_during_dispatch_wait_for_next_dispatch() {
        let registry = registry();
        registry
            .add_filter("title", Callback::function("append_and_register_upper"), 1)
            .unwrap();
        let params = json!({"suffix": "!"});

        assert_eq!(registry.apply_filter("title", json!("hi"), &params).unwrap(), json!("hi!"));
        assert_eq!(registry.filter_count("title"), 2);
        assert_eq!(registry.apply_filter("title", json!("hi"), &params).unwrap(), json!("HI!"));
    }

    #[test]
    fn filters_removed_during_dispatch_still_apply_once() {
        let registry = registry();
        registry
            .add_filter("title", Callback::function("append_and_remove_upper"), 10)
            .unwrap();
        registry.add_filter("title", Callback::function("upper"), 20).unwrap();
        let params = json!({"suffix": "!"});

        assert_eq!(registry.apply_filter("title", json!("hi"), &params).unwrap(), json!("HI!"));
        assert_eq!(registry.filter_count("title"), 1);
        assert_eq!(registry.apply_filter("title", json!("hi"), &params).unwrap(), json!("hi!"));
    }

    #[test]
    fn targets_that_stop_responding_are_skipped() {
        let registry = registry();
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = Recorder::new("r", &log);
        registry
            .add_action("x", Callback::method(recorder.clone(), "record"), 10)
            .unwrap();
        recorder.active.set(false);

        registry.do_action("x", &json!({})).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(registry.hook_state("x"), HookState::Processed);
    }

    #[test]
    fn sentinels_are_not_invoked_as_actions() {
        let registry = registry();
        registry.add_action("x", Sentinel::ReturnTrue.into(), 10).unwrap();
        registry.do_action("x", &json!({})).unwrap();
        assert!(!registry.has_run("x"));
    }

    #[test]
    fn filter_passes_through_when_unregistered() {
        let registry = registry();
        assert_eq!(registry.apply_filter("unregistered", json!(5), &json!({})).unwrap(), json!(5));
        assert_eq!(registry.hook_state("unregistered"), HookState::Processed);
    }

    #[test]
    fn filters_chain_in_order() {
        let registry = registry();
        registry.add_filter("title", Callback::function("upper"), 20).unwrap();
        registry.add_filter("title", Callback::function("append"), 10).unwrap();

        let title = registry
            .apply_filter("title", json!("home"), &json!({"suffix": " page"}))
            .unwrap();
        assert_eq!(title, json!("HOME PAGE"));
        assert!(registry.has_run("title"));
        assert_eq!(registry.current_filter(), None);
    }

    #[test]
    fn filter_may_change_type() {
        let registry = registry();
        registry.add_filter("len", Callback::function("length"), 10).unwrap();
        assert_eq!(registry.apply_filter("len", json!("abcd"), &json!({})).unwrap(), json!(4));
    }

    #[test]
    fn sentinel_filter_replaces_value() {
        let registry = registry();
        registry.add_filter("x", Sentinel::ReturnFalse.into(), 10).unwrap();
        assert_eq!(registry.apply_filter("x", json!(true), &json!({})).unwrap(), json!(false));
        assert!(registry.has_run("x"));
    }

    #[test]
    fn sentinel_then_callback() {
        let registry = registry();
        registry.add_filter("x", Sentinel::ReturnEmptyString.into(), 1).unwrap();
        registry.add_filter("x", Callback::function("append"), 2).unwrap();
        let value = registry
            .apply_filter("x", json!("discarded"), &json!({"suffix": "kept"}))
            .unwrap();
        assert_eq!(value, json!("kept"));
    }

    #[test]
    fn every_sentinel_literal() {
        for sentinel in Sentinel::ALL {
            let registry = registry();
            registry.add_filter("x", sentinel.into(), 10).unwrap();
            assert_eq!(
                registry.apply_filter("x", json!({"a": 1}), &json!({})).unwrap(),
                sentinel.value()
            );
        }
    }

    #[test]
    fn filter_methods_receive_name_as_passed() {
        let registry = registry();
        let log = Rc::new(RefCell::new(Vec::new()));
        registry
            .add_filter("Page.Title", Callback::method(Recorder::new("m", &log), "record"), 10)
            .unwrap();

        let value = registry.apply_filter("PAGE TITLE", json!("t"), &json!({})).unwrap();
        assert_eq!(value, json!("ignored"));
        assert_eq!(*log.borrow(), vec!["m:PAGE TITLE"]);
    }

    #[test]
    fn filter_error_propagates() {
        let registry = registry();
        registry.add_filter("x", Callback::function("append"), 1).unwrap();
        registry.add_filter("x", Callback::function("fail"), 2).unwrap();

        let err = registry
            .apply_filter("x", json!("a"), &json!({"suffix": "b"}))
            .unwrap_err();
        assert_matches!(err, HookError::Handler { .. });
        assert!(registry.has_run("x"));
    }

    #[test]
    fn dispatch_is_logged() {
        let (logs, _guard) = quire_core::logging::capture_logs();
        let registry = registry();
        registry.add_action("App.Init", Callback::function("echo_hook"), 10).unwrap();
        registry.do_action("App.Init", &json!({})).unwrap();

        let dispatched = logs.matching("dispatching action");
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].field("hook"), Some("app/init"));
        assert_eq!(dispatched[0].field("callbacks"), Some("1"));
    }

    #[test]
    fn actions_and_filters_are_separate() {
        let registry = registry();
        registry.add_filter("shared", Callback::function("upper"), 10).unwrap();
        registry.do_action("shared", &json!({})).unwrap();
        assert!(!registry.has_run("shared"));
        assert_eq!(
            registry.apply_filter("shared", json!("a"), &json!({})).unwrap(),
            json!("A")
        );
    }
}
