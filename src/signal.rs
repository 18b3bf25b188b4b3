//! Signals.
//!
//! A component emits a signal by event name. The event goes to the nearest *signal handler*
//! above it: the nearest component ancestor that is not a signal proxy. What happens there is
//! decided by the emitter's signal maps:
//!
//! - `signals`: `false` drops the event, `true` calls the handler method of the same name, a
//!   string calls the handler method of that name.
//! - `passSignals`: `true` re-emits the event from the handler, a string re-emits it under that
//!   name. The handler's own maps then apply.
//!
//! A `signals` entry that reaches a handler method ends dispatch there; otherwise `passSignals`
//! is consulted for the same event. Events nobody handles are dropped without error.
//!
//! Ancestor events (`fire_ancestors`) skip the maps: the nearest handler with a method of that
//! exact name is called.

use crate::component::Deferred;
use crate::element::ElementId;
use crate::error::{Error, Result};
use crate::stage::Stage;
use crate::value::{Value, ValueMap};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::trace;

/// Ancestor event names must start with this.
pub const ANCESTOR_MARKER: char = '$';

/// Entry of a `signals` map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalRoute {
    /// Drop the event.
    Suppress,
    /// Call the handler method named like the event.
    Forward,
    /// Call the handler method with this name.
    Rename(String),
}

impl SignalRoute {
    /// Only `false` suppresses; other falsy values leave the event unmapped.
    fn from_value(value: &Value) -> Option<SignalRoute> {
        match value {
            Value::Bool(false) => Some(SignalRoute::Suppress),
            Value::Str(name) if !name.is_empty() => Some(SignalRoute::Rename(name.clone())),
            value if value.is_truthy() => Some(SignalRoute::Forward),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            SignalRoute::Suppress => Value::Bool(false),
            SignalRoute::Forward => Value::Bool(true),
            SignalRoute::Rename(name) => Value::from(name.as_str()),
        }
    }
}

/// Entry of a `passSignals` map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassRoute {
    /// Re-emit under the same name.
    Bubble,
    /// Re-emit under this name.
    Rename(String),
}

impl PassRoute {
    /// Falsy values mean "do not pass".
    fn from_value(value: &Value) -> Option<PassRoute> {
        match value {
            Value::Str(name) if !name.is_empty() => Some(PassRoute::Rename(name.clone())),
            value if value.is_truthy() => Some(PassRoute::Bubble),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            PassRoute::Bubble => Value::Bool(true),
            PassRoute::Rename(name) => Value::from(name.as_str()),
        }
    }
}

pub type SignalMap = IndexMap<String, SignalRoute>;
pub type PassSignalMap = IndexMap<String, PassRoute>;

fn signal_entries(value: &Value) -> Result<&ValueMap> {
    value
        .as_map()
        .ok_or_else(|| Error::Config("specify a map of signal-to-fire mappings".to_owned()))
}

impl Stage {
    fn component_slot_mut(&mut self, id: ElementId) -> Result<&mut crate::component::ComponentSlot> {
        self.element_mut(id)?
            .component
            .as_mut()
            .ok_or(Error::NotAComponent(id))
    }

    /// Replaces the `signals` map.
    pub fn set_signals(&mut self, id: ElementId, value: &Value) -> Result<()> {
        let entries = signal_entries(value)?;
        let map: SignalMap = entries
            .iter()
            .filter_map(|(k, v)| Some((k.clone(), SignalRoute::from_value(v)?)))
            .collect();
        self.component_slot_mut(id)?.signals = Some(map);
        Ok(())
    }

    /// Merges entries into the `signals` map; an entry that maps to no route (`Undefined`, `0`,
    /// `""`) deletes it.
    pub fn alter_signals(&mut self, id: ElementId, value: &Value) -> Result<()> {
        let entries = signal_entries(value)?;
        let map = self.component_slot_mut(id)?.signals.get_or_insert_with(SignalMap::new);
        for (key, value) in entries {
            match SignalRoute::from_value(value) {
                Some(route) => {
                    map.insert(key.clone(), route);
                }
                None => {
                    map.shift_remove(key);
                }
            }
        }
        Ok(())
    }

    /// Merges entries into the `passSignals` map; falsy values delete an entry.
    pub fn set_pass_signals(&mut self, id: ElementId, value: &Value) -> Result<()> {
        let entries = signal_entries(value)?;
        let map = self
            .component_slot_mut(id)?
            .pass_signals
            .get_or_insert_with(PassSignalMap::new);
        for (key, value) in entries {
            match PassRoute::from_value(value) {
                Some(route) => {
                    map.insert(key.clone(), route);
                }
                None => {
                    map.shift_remove(key);
                }
            }
        }
        Ok(())
    }

    /// Same as [`Stage::set_pass_signals`].
    pub fn alter_pass_signals(&mut self, id: ElementId, value: &Value) -> Result<()> {
        self.set_pass_signals(id, value)
    }

    pub fn signals(&self, id: ElementId) -> Option<&SignalMap> {
        self.element(id)?.component.as_ref()?.signals.as_ref()
    }

    pub fn pass_signals(&self, id: ElementId) -> Option<&PassSignalMap> {
        self.element(id)?.component.as_ref()?.pass_signals.as_ref()
    }

    /// The signal maps as plain values, for property reads.
    pub(crate) fn signal_property(&self, id: ElementId, key: &str) -> Option<Value> {
        let slot = self.element(id)?.component.as_ref()?;
        match key {
            "signals" => Some(Value::Map(
                slot.signals
                    .iter()
                    .flatten()
                    .map(|(k, r)| (k.clone(), r.to_value()))
                    .collect(),
            )),
            "passSignals" => Some(Value::Map(
                slot.pass_signals
                    .iter()
                    .flatten()
                    .map(|(k, r)| (k.clone(), r.to_value()))
                    .collect(),
            )),
            _ => None,
        }
    }

    /// Handles the signal map properties; None for any other key.
    pub(crate) fn set_signal_property(
        &mut self,
        id: ElementId,
        key: &str,
        value: &Value,
    ) -> Option<Result<()>> {
        Some(match key {
            "signals" => self.set_signals(id, value),
            "passSignals" => self.set_pass_signals(id, value),
            "alterSignals" => self.alter_signals(id, value),
            "alterPassSignals" => self.alter_pass_signals(id, value),
            _ => return None,
        })
    }

    /// The element itself if it can handle signals, else its nearest handler above.
    pub fn signal_handler(&self, id: ElementId) -> Option<ElementId> {
        match self.class_of(id) {
            Some(class) if !class.signal_proxy() => Some(id),
            _ => self.parent_signal_handler(id),
        }
    }

    /// The nearest component above that is not a signal proxy.
    pub fn parent_signal_handler(&self, id: ElementId) -> Option<ElementId> {
        let mut current = self.cparent(id);
        while let Some(c) = current {
            if self.class_of(c).map_or(false, |class| !class.signal_proxy()) {
                return Some(c);
            }
            current = self.cparent(c);
        }
        None
    }

    /// Emits a signal from a component.
    ///
    /// Returns the result of the handler method it reached, if any; `Undefined` results count as
    /// none.
    pub fn signal(&mut self, id: ElementId, event: &str, args: &[Value]) -> Result<Option<Value>> {
        let element = self.element_ref(id)?;
        let handler = match self.parent_signal_handler(id) {
            Some(handler) => handler,
            None => return Ok(None),
        };

        let slot = element.component.as_ref();
        let route = slot
            .and_then(|s| s.signals.as_ref())
            .and_then(|m| m.get(event))
            .cloned();
        let pass = slot
            .and_then(|s| s.pass_signals.as_ref())
            .and_then(|m| m.get(event))
            .cloned();

        let handled = match route {
            Some(SignalRoute::Suppress) => return Ok(None),
            Some(SignalRoute::Forward) => self.invoke(handler, event, args),
            Some(SignalRoute::Rename(method)) => self.invoke(handler, &method, args),
            None => None,
        };
        if let Some(result) = handled {
            return Ok(defined(result));
        }

        match pass {
            Some(PassRoute::Bubble) => self.signal(handler, event, args),
            Some(PassRoute::Rename(name)) => self.signal(handler, &name, args),
            None => Ok(None),
        }
    }

    /// Calls the nearest ancestor handler that has a method called `name`.
    ///
    /// `name` must start with [`ANCESTOR_MARKER`].
    pub fn fire_ancestors(&mut self, id: ElementId, name: &str, args: &[Value]) -> Result<Option<Value>> {
        if !name.starts_with(ANCESTOR_MARKER) {
            return Err(Error::AncestorName(name.to_owned()));
        }
        self.element_ref(id)?;

        let mut current = self.parent_signal_handler(id);
        while let Some(handler) = current {
            if self.class_of(handler).map_or(false, |c| c.handlers().contains(name)) {
                return Ok(self.invoke(handler, name, args).and_then(defined));
            }
            current = self.parent_signal_handler(handler);
        }
        Ok(None)
    }

    /// Calls a handler method; None if there is no such method.
    ///
    /// A handler that is busy gets the call once its running hook returns, and the result seen
    /// here is `Undefined`.
    fn invoke(&mut self, handler: ElementId, method: &str, args: &[Value]) -> Option<Value> {
        if !self.class_of(handler)?.handlers().contains(method) {
            return None;
        }
        if self.is_busy(handler) {
            trace!(?handler, method, "handler busy, call deferred");
            self.deferred.push(Deferred::Handler {
                id: handler,
                method: method.to_owned(),
                args: args.to_vec(),
            });
            return Some(Value::Undefined);
        }
        self.call_handler(handler, method, args)
    }

    pub(crate) fn call_handler(&mut self, handler: ElementId, method: &str, args: &[Value]) -> Option<Value> {
        let class = Arc::clone(self.class_of(handler)?);
        let f = class.handlers().get(method)?;
        self.with_behavior(handler, |c, cx| f(c, cx, args))
    }
}

fn defined(value: Value) -> Option<Value> {
    if value.is_undefined() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentType, Handlers, Registry};
    use crate::template::Template;
    use crate::Cx;

    #[derive(Debug, Default)]
    struct Leaf;
    impl Component for Leaf {}

    /// Records handler calls; holds a Leaf and a proxied Leaf.
    #[derive(Debug, Default)]
    struct Parent {
        calls: Vec<String>,
    }

    impl Parent {
        fn on_click(&mut self, _: &mut Cx, args: &[Value]) -> Value {
            self.calls.push(format!("click {:?}", args));
            Value::from("handled")
        }
        fn on_press(&mut self, _: &mut Cx, _: &[Value]) -> Value {
            self.calls.push("press".to_owned());
            Value::Undefined
        }
        fn on_ancestor(&mut self, _: &mut Cx, _: &[Value]) -> Value {
            self.calls.push("$ping".to_owned());
            Value::from(1)
        }
    }

    impl Component for Parent {
        fn template() -> Template {
            template! {
                Child: { type: ComponentType::of::<Leaf>() },
                Proxy: {
                    type: ComponentType::of::<Proxy>(),
                    Inner: { type: ComponentType::of::<Leaf>() },
                },
            }
        }

        fn attach(&mut self, cx: &mut Cx) {
            let child = cx.tag("Child").unwrap();
            let signalled = cx.stage().signal(child, "click", &[]).unwrap();
            let fired = cx.stage().fire_ancestors(child, "$ping", &[]).unwrap();
            self.calls.push(format!("attach {:?} {:?}", signalled, fired));
        }

        fn handlers() -> Handlers<Parent> {
            Handlers::new()
                .on("click", Parent::on_click)
                .on("press", Parent::on_press)
                .on("$ping", Parent::on_ancestor)
        }
    }

    #[derive(Debug, Default)]
    struct Proxy;
    impl Component for Proxy {
        fn signal_proxy() -> bool {
            true
        }
        fn handlers() -> Handlers<Proxy> {
            Handlers::new().on("click", |_, _, _| Value::from("proxy"))
        }
    }

    fn setup() -> (Stage, ElementId, ElementId) {
        let mut stage = Stage::new(Registry::new());
        stage.register::<Parent>();
        let parent = stage.create_component::<Parent>(None).unwrap();
        let child = stage.tag(parent, "Child").unwrap();
        (stage, parent, child)
    }

    fn calls(stage: &Stage, parent: ElementId) -> Vec<String> {
        stage.behavior::<Parent>(parent).unwrap().calls.clone()
    }

    #[test]
    fn forward_and_rename() {
        let (mut stage, parent, child) = setup();
        stage
            .set_signals(child, &Value::map(vec![("click", Value::from(true)), ("tap", Value::from("click"))]))
            .unwrap();

        let result = stage.signal(child, "click", &[Value::from(1)]).unwrap();
        assert_eq!(result, Some(Value::from("handled")));
        let result = stage.signal(child, "tap", &[]).unwrap();
        assert_eq!(result, Some(Value::from("handled")));
        assert_eq!(calls(&stage, parent), ["click [Number(1.0)]", "click []"]);
    }

    #[test]
    fn unmapped_and_unhandled_events_are_dropped() {
        let (mut stage, parent, child) = setup();
        assert_eq!(stage.signal(child, "click", &[]).unwrap(), None);

        stage
            .set_signals(child, &Value::map(vec![("hover", Value::from(true))]))
            .unwrap();
        assert_eq!(stage.signal(child, "hover", &[]).unwrap(), None);
        assert_eq!(stage.signal(parent, "click", &[]).unwrap(), None, "no handler above the root");
        assert!(calls(&stage, parent).is_empty());
    }

    #[test]
    fn suppressed_events_reach_nobody() {
        let (mut stage, parent, child) = setup();
        stage
            .set_signals(child, &Value::map(vec![("click", Value::from(false))]))
            .unwrap();
        stage
            .set_pass_signals(child, &Value::map(vec![("click", Value::from(true))]))
            .unwrap();
        assert_eq!(stage.signal(child, "click", &[]).unwrap(), None);
        assert!(calls(&stage, parent).is_empty());
    }

    #[test]
    fn undefined_results_count_as_none() {
        let (mut stage, parent, child) = setup();
        stage
            .set_signals(child, &Value::map(vec![("press", Value::from(true))]))
            .unwrap();
        assert_eq!(stage.signal(child, "press", &[]).unwrap(), None);
        assert_eq!(calls(&stage, parent), ["press"]);
    }

    #[test]
    fn proxies_are_skipped() {
        let (mut stage, parent, _) = setup();
        let inner = stage.tag(parent, "Proxy.Inner").unwrap();
        assert_eq!(stage.parent_signal_handler(inner), Some(parent));

        stage
            .set_signals(inner, &Value::map(vec![("click", Value::from(true))]))
            .unwrap();
        let result = stage.signal(inner, "click", &[]).unwrap();
        assert_eq!(result, Some(Value::from("handled")));
    }

    #[test]
    fn signal_maps_require_maps() {
        let (mut stage, _, child) = setup();
        for key in &["signals", "passSignals", "alterSignals", "alterPassSignals"] {
            let err = stage.set_property(child, key, Value::from(true)).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{}: {:?}", key, err);
        }
    }

    #[test]
    fn alter_signals_stores_entries() {
        let (mut stage, _, child) = setup();
        stage
            .set_property(child, "signals", Value::map(vec![("a", Value::from(true))]))
            .unwrap();
        stage
            .set_property(
                child,
                "alterSignals",
                Value::map(vec![("a", Value::Undefined), ("b", Value::from("other"))]),
            )
            .unwrap();

        let map = stage.signals(child).unwrap();
        assert_eq!(map.get("a"), None);
        assert_eq!(map.get("b"), Some(&SignalRoute::Rename("other".to_owned())));
        assert_eq!(
            stage.get_property(child, "signals"),
            Value::map(vec![("b", Value::from("other"))])
        );
    }

    #[test]
    fn pass_signals_merge() {
        let (mut stage, _, child) = setup();
        stage
            .set_pass_signals(child, &Value::map(vec![("a", Value::from(true))]))
            .unwrap();
        stage
            .set_pass_signals(child, &Value::map(vec![("b", Value::from("c"))]))
            .unwrap();
        assert_eq!(stage.pass_signals(child).map(|m| m.len()), Some(2));

        stage
            .alter_pass_signals(child, &Value::map(vec![("a", Value::from(false))]))
            .unwrap();
        assert_eq!(stage.pass_signals(child).map(|m| m.len()), Some(1));
    }

    #[test]
    fn fire_ancestors_needs_the_marker() {
        let (mut stage, parent, child) = setup();
        assert!(matches!(
            stage.fire_ancestors(child, "ping", &[]),
            Err(Error::AncestorName(_))
        ));
        assert_eq!(stage.fire_ancestors(child, "$ping", &[]).unwrap(), Some(Value::from(1)));
        assert_eq!(stage.fire_ancestors(child, "$pong", &[]).unwrap(), None);
        assert_eq!(calls(&stage, parent), ["$ping"]);
    }

    #[test]
    fn busy_handlers_are_called_once_their_hook_returns() {
        let (mut stage, parent, child) = setup();
        stage
            .set_signals(child, &Value::map(vec![("click", Value::from(true))]))
            .unwrap();
        stage
            .set_pass_signals(child, &Value::map(vec![("click", Value::from("press"))]))
            .unwrap();

        stage.on_attach(parent).unwrap();
        assert_eq!(calls(&stage, parent), ["attach None None", "click []", "$ping"]);
    }

    #[test]
    fn only_false_suppresses() {
        let (mut stage, _, child) = setup();
        let entries = Value::map(vec![
            ("zero", Value::from(0)),
            ("empty", Value::from("")),
            ("off", Value::from(false)),
        ]);
        stage.set_signals(child, &entries).unwrap();

        let map = stage.signals(child).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("off"), Some(&SignalRoute::Suppress));
    }
}
