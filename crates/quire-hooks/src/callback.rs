//! Callback references and their identities.
//!
//! A [`Callback`] names something the registry can invoke later. Every
//! callback has a [`CallbackId`], which is what registration deduplicates on
//! and what removal matches against. Anonymous closures have no stable
//! identity, so they are representable but always refused at registration.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::errors::{HookError, HookResult};
use crate::name::value_kind;
use crate::registry::HookRegistry;

/// Signature of a named function callback.
///
/// Actions receive [`Value::Null`] in [`HookCall::value`] and their return
/// value is discarded. Filters receive the current value and return the
/// replacement.
pub type HookFn = fn(HookCall<'_>) -> HookResult<Value>;

/// Boxed anonymous callable. See [`Callback::Closure`].
pub type ClosureFn = Rc<dyn Fn(HookCall<'_>) -> HookResult<Value>>;

/// Fixed filter results usable in place of a callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// Replace the value with `0`.
    ReturnZero,
    /// Replace the value with `true`.
    ReturnTrue,
    /// Replace the value with `false`.
    ReturnFalse,
    /// Replace the value with `null`.
    ReturnNull,
    /// Replace the value with `""`.
    ReturnEmptyString,
    /// Replace the value with `[]`.
    ReturnEmptyArray,
}

impl Sentinel {
    /// All sentinels.
    pub const ALL: [Sentinel; 6] = [
        Self::ReturnZero,
        Self::ReturnTrue,
        Self::ReturnFalse,
        Self::ReturnNull,
        Self::ReturnEmptyString,
        Self::ReturnEmptyArray,
    ];

    /// Constant name, also used as the callback identity.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReturnZero => "RETURN_ZERO",
            Self::ReturnTrue => "RETURN_TRUE",
            Self::ReturnFalse => "RETURN_FALSE",
            Self::ReturnNull => "RETURN_NULL",
            Self::ReturnEmptyString => "RETURN_EMPTY_STRING",
            Self::ReturnEmptyArray => "RETURN_EMPTY_ARRAY",
        }
    }

    /// Look a sentinel up by constant name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// The literal this sentinel produces.
    pub fn value(self) -> Value {
        match self {
            Self::ReturnZero => Value::from(0),
            Self::ReturnTrue => Value::Bool(true),
            Self::ReturnFalse => Value::Bool(false),
            Self::ReturnNull => Value::Null,
            Self::ReturnEmptyString => Value::String(String::new()),
            Self::ReturnEmptyArray => Value::Array(Vec::new()),
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object whose methods can be registered as hook callbacks.
///
/// Registered through [`Callback::method`]; the registry keeps the `Rc`
/// alive, and identity is tied to that allocation.
pub trait HookTarget {
    /// Type name, used in log output.
    fn type_name(&self) -> &str;

    /// Whether `method` can currently be called on this object.
    fn responds_to(&self, method: &str) -> bool;

    /// Invoke `method`.
    fn call_method(&self, method: &str, call: HookCall<'_>) -> HookResult<Value>;
}

/// Identity of a callback within the running process.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(String);

impl CallbackId {
    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference to something invocable by the registry.
#[derive(Clone)]
pub enum Callback {
    /// Fixed filter result.
    Sentinel(Sentinel),
    /// Free function, resolved by name through
    /// [`HookRegistry::define_function`].
    Function(String),
    /// Method on a live object.
    Method {
        /// The object; identity is the address of this allocation.
        target: Rc<dyn HookTarget>,
        /// Method name passed to [`HookTarget::call_method`].
        method: String,
    },
    /// Static method, resolved as `Type::method` through
    /// [`HookRegistry::define_function`].
    Static {
        /// Owning type name.
        type_name: String,
        /// Method name.
        method: String,
    },
    /// Anonymous callable. Always rejected at registration: it could
    /// never be matched for removal.
    Closure(ClosureFn),
}

impl Callback {
    /// Free function callback. A `Type::method` name becomes
    /// [`Callback::Static`], so both spellings share one identity.
    pub fn function(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.split_once("::") {
            Some((type_name, method)) => Self::static_method(type_name, method),
            None => Self::Function(name),
        }
    }

    /// Method callback bound to `target`.
    pub fn method(target: Rc<dyn HookTarget>, method: impl Into<String>) -> Self {
        Self::Method {
            target,
            method: method.into(),
        }
    }

    /// Static method callback.
    pub fn static_method(type_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self::Static {
            type_name: type_name.into(),
            method: method.into(),
        }
    }

    /// Wrap an anonymous callable.
    pub fn closure(f: impl Fn(HookCall<'_>) -> HookResult<Value> + 'static) -> Self {
        Self::Closure(Rc::new(f))
    }

    /// Parse a textual callback: a sentinel name, `Type::method`, or a free
    /// function name. Validity is checked at registration.
    pub fn parse(spec: &str) -> Self {
        if let Some(sentinel) = Sentinel::from_name(spec) {
            return Self::Sentinel(sentinel);
        }
        Self::function(spec)
    }

    /// Parse a callback from a plugin manifest value: a string (see
    /// [`Callback::parse`]) or a `[type, method]` pair.
    pub fn from_value(value: &Value) -> HookResult<Self> {
        match value {
            Value::String(spec) => Ok(Self::parse(spec)),
            Value::Array(pair) => match pair.as_slice() {
                [Value::String(type_name), Value::String(method)] => {
                    Ok(Self::static_method(type_name.as_str(), method.as_str()))
                }
                _ => Err(HookError::InvalidCallback(format!(
                    "malformed callback pair: expected [type, method], got {} element(s)",
                    pair.len()
                ))),
            },
            Value::Null => Err(HookError::InvalidCallback("empty callback".to_string())),
            other => Err(HookError::InvalidCallback(format!(
                "unrecognized callback {}",
                value_kind(other)
            ))),
        }
    }

    /// Identity used for deduplication and removal.
    pub fn id(&self) -> CallbackId {
        let id = match self {
            Self::Sentinel(sentinel) => sentinel.as_str().to_string(),
            Self::Function(name) if name.contains("::") => name.clone(),
            Self::Function(name) => format!("function::{name}"),
            Self::Method { target, method } => {
                let token = Rc::as_ptr(target).cast::<()>().addr();
                format!("{token:016x}::{method}")
            }
            Self::Static { type_name, method } => format!("{type_name}::{method}"),
            Self::Closure(f) => {
                let token = Rc::as_ptr(f).cast::<()>().addr();
                format!("closure::{token:016x}")
            }
        };
        CallbackId(id)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sentinel(sentinel) => f.debug_tuple("Sentinel").field(sentinel).finish(),
            Self::Function(name) => f.debug_tuple("Function").field(name).finish(),
            Self::Method { target, method } => f
                .debug_struct("Method")
                .field("type_name", &target.type_name())
                .field("method", method)
                .finish(),
            Self::Static { type_name, method } => f
                .debug_struct("Static")
                .field("type_name", type_name)
                .field("method", method)
                .finish(),
            Self::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

impl From<Sentinel> for Callback {
    fn from(sentinel: Sentinel) -> Self {
        Self::Sentinel(sentinel)
    }
}

/// Arguments handed to a callback during dispatch.
pub struct HookCall<'a> {
    /// Current filter value; `null` for actions.
    pub value: Value,
    registry: &'a HookRegistry,
    hook: &'a str,
    params: &'a Value,
}

impl<'a> HookCall<'a> {
    pub(crate) fn new(
        registry: &'a HookRegistry,
        hook: &'a str,
        params: &'a Value,
        value: Value,
    ) -> Self {
        Self {
            value,
            registry,
            hook,
            params,
        }
    }

    /// Hook name exactly as passed to the dispatch call.
    pub fn hook(&self) -> &'a str {
        self.hook
    }

    /// Dispatch parameters.
    pub fn params(&self) -> &'a Value {
        self.params
    }

    /// A single named parameter.
    pub fn param(&self, key: &str) -> Option<&'a Value> {
        self.params.get(key)
    }

    /// The registry running this dispatch, for nested dispatch and
    /// registration.
    pub fn registry(&self) -> &'a HookRegistry {
        self.registry
    }

    /// Write output through the registry (captured when inside
    /// [`HookRegistry::capture_output`]).
    pub fn echo(&self, text: &str) -> HookResult<()> {
        self.registry.echo(text)
    }

    /// Take the value out of the call.
    pub fn into_value(self) -> Value {
        self.value
    }
}

/// A registered callback resolved to something callable right now.
pub(crate) enum Resolved {
    Fixed(Value),
    Function(HookFn),
    Method {
        target: Rc<dyn HookTarget>,
        method: String,
    },
}

impl Resolved {
    pub(crate) fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    pub(crate) fn invoke(self, call: HookCall<'_>) -> HookResult<Value> {
        match self {
            Self::Fixed(value) => Ok(value),
            Self::Function(f) => f(call),
            Self::Method { target, method } => target.call_method(&method, call),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    struct Widget;

    impl HookTarget for Widget {
        fn type_name(&self) -> &str {
            "Widget"
        }
        fn responds_to(&self, method: &str) -> bool {
            method == "render"
        }
        fn call_method(&self, _method: &str, call: HookCall<'_>) -> HookResult<Value> {
            Ok(call.into_value())
        }
    }

    #[test]
    fn sentinel_names_round_trip() {
        for sentinel in Sentinel::ALL {
            assert_eq!(Sentinel::from_name(sentinel.as_str()), Some(sentinel));
        }
        assert_eq!(Sentinel::from_name("RETURN_MAYBE"), None);
    }

    #[test]
    fn sentinel_values() {
        assert_eq!(Sentinel::ReturnZero.value(), json!(0));
        assert_eq!(Sentinel::ReturnTrue.value(), json!(true));
        assert_eq!(Sentinel::ReturnFalse.value(), json!(false));
        assert_eq!(Sentinel::ReturnNull.value(), Value::Null);
        assert_eq!(Sentinel::ReturnEmptyString.value(), json!(""));
        assert_eq!(Sentinel::ReturnEmptyArray.value(), json!([]));
    }

    #[test]
    fn ids_by_variant() {
        assert_eq!(Callback::from(Sentinel::ReturnFalse).id().as_str(), "RETURN_FALSE");
        assert_eq!(Callback::function("render_header").id().as_str(), "function::render_header");
        assert_eq!(Callback::static_method("Theme", "boot").id().as_str(), "Theme::boot");
        assert_eq!(Callback::parse("Theme::boot").id(), Callback::static_method("Theme", "boot").id());
        assert!(Callback::closure(|call| Ok(call.into_value())).id().as_str().starts_with("closure::"));
    }

    #[test]
    fn qualified_function_names_are_static() {
        assert_matches!(
            Callback::function("Theme::boot"),
            Callback::Static { type_name, method } if type_name == "Theme" && method == "boot"
        );
        assert_eq!(
            Callback::Function("Theme::boot".to_string()).id(),
            Callback::parse("Theme::boot").id()
        );
    }

    #[test]
    fn method_ids_follow_the_instance() {
        let first: Rc<dyn HookTarget> = Rc::new(Widget);
        let second: Rc<dyn HookTarget> = Rc::new(Widget);

        let a = Callback::method(Rc::clone(&first), "render");
        let b = Callback::method(Rc::clone(&first), "render");
        let c = Callback::method(second, "render");

        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert!(a.id().as_str().ends_with("::render"));
    }

    #[test]
    fn parse_forms() {
        assert_matches!(Callback::parse("RETURN_TRUE"), Callback::Sentinel(Sentinel::ReturnTrue));
        assert_matches!(Callback::parse("emit_headers"), Callback::Function(name) if name == "emit_headers");
        assert_matches!(
            Callback::parse("Page::render"),
            Callback::Static { type_name, method } if type_name == "Page" && method == "render"
        );
        assert_matches!(Callback::parse(""), Callback::Function(name) if name.is_empty());
    }

    #[test]
    fn from_value_forms() {
        assert_matches!(
            Callback::from_value(&json!(["Page", "render"])),
            Ok(Callback::Static { .. })
        );
        assert_matches!(Callback::from_value(&json!("RETURN_ZERO")), Ok(Callback::Sentinel(_)));
        assert_matches!(
            Callback::from_value(&json!(["Page"])),
            Err(HookError::InvalidCallback(msg)) if msg.contains("malformed")
        );
        assert_matches!(
            Callback::from_value(&json!(["Page", "render", "extra"])),
            Err(HookError::InvalidCallback(_))
        );
        assert_matches!(
            Callback::from_value(&json!(["Page", 3])),
            Err(HookError::InvalidCallback(_))
        );
        assert_matches!(
            Callback::from_value(&json!(null)),
            Err(HookError::InvalidCallback(msg)) if msg == "empty callback"
        );
        assert_matches!(
            Callback::from_value(&json!(12)),
            Err(HookError::InvalidCallback(msg)) if msg.contains("number")
        );
    }

    #[test]
    fn debug_omits_closure_body() {
        let closure = Callback::closure(|call| Ok(call.into_value()));
        assert_eq!(format!("{closure:?}"), "Closure(..)");
        let method = Callback::method(Rc::new(Widget), "render");
        assert!(format!("{method:?}").contains("Widget"));
    }
}
