//! The stage: owner of the element tree.

use crate::application::Application;
use crate::binding::Setter;
use crate::component::{ClassDef, Component, ComponentSlot, ComponentType, Deferred, Registry};
use crate::element::{property_setter, Element, ElementId};
use crate::error::{BuildError, Error, Result};
use crate::template::is_ref_key;
use crate::texture::Texture;
use crate::value::{Value, ValueMap};
use core::fmt::Write;
use std::collections::HashMap;
use std::sync::Arc;

/// Owns all elements, the class registry handle and the optional application.
///
/// Elements are addressed by [`ElementId`]; everything that touches the tree goes through here.
#[derive(Debug)]
pub struct Stage {
    elements: HashMap<ElementId, Element>,
    registry: Registry,
    pub(crate) application: Option<Application>,
    /// Calls aimed at components whose behavior was busy, run once it is back in its slot.
    pub(crate) deferred: Vec<Deferred>,
    /// Number of hooks and handlers currently running.
    pub(crate) running: usize,
}

impl Stage {
    pub fn new(registry: Registry) -> Stage {
        Stage {
            elements: HashMap::new(),
            registry,
            application: None,
            deferred: Vec::new(),
            running: 0,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers a component class (and the classes its template uses) with this stage's
    /// registry.
    pub fn register<T: Component + Default>(&self) -> Arc<ClassDef> {
        self.registry.register(ComponentType::of::<T>())
    }

    /// Sets the application; focus tracking starts at its root.
    pub fn set_application(&mut self, application: Application) {
        self.application = Some(application);
    }

    pub fn application(&self) -> Option<&Application> {
        self.application.as_ref()
    }

    /// Tears down the application. Lifecycle and state calls made afterwards no longer refocus.
    pub fn shutdown_application(&mut self) -> Option<Application> {
        self.application.take()
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn element_ref(&self, id: ElementId) -> Result<&Element> {
        self.elements.get(&id).ok_or(Error::NoSuchElement(id))
    }

    pub fn element_mut(&mut self, id: ElementId) -> Result<&mut Element> {
        self.elements.get_mut(&id).ok_or(Error::NoSuchElement(id))
    }

    /// Creates a detached plain element.
    pub fn create_element(&mut self) -> ElementId {
        let id = ElementId::new();
        self.elements.insert(id, Element::new(id));
        id
    }

    /// Creates a detached instance of a registered component class.
    ///
    /// `props` must be a map if given; its entries are applied before the template is built,
    /// except for bound properties, which need the built children and are applied after.
    pub fn create_component<T: Component + Default>(
        &mut self,
        props: Option<Value>,
    ) -> Result<ElementId> {
        self.instantiate(ComponentType::of::<T>(), props)
    }

    pub(crate) fn instantiate(&mut self, ty: ComponentType, props: Option<Value>) -> Result<ElementId> {
        let class = self
            .registry
            .get(ty.type_id())
            .ok_or(BuildError::UnregisteredClass(ty.name()))?;
        let props = match props {
            None => Default::default(),
            Some(Value::Map(props)) => props,
            Some(_) => return Err(BuildError::PatchValue.into()),
        };

        let id = ElementId::new();
        let mut element = Element::new(id);
        element.tag_root = true;
        element.component = Some(ComponentSlot::new(Arc::clone(&class), ty.create()));
        self.elements.insert(id, element);

        if let Err(err) = self.initialize(id, &class, props) {
            self.remove(id)?;
            return Err(err);
        }
        Ok(id)
    }

    fn initialize(&mut self, id: ElementId, class: &ClassDef, props: ValueMap) -> Result<()> {
        let mut bound = Vec::new();
        for (key, value) in props {
            if class.setters().get(&key).is_some() {
                bound.push((key, value));
            } else {
                self.set_property(id, &key, value)?;
            }
        }

        self.with_behavior(id, |c, cx| c.construct(cx));
        class.builder().build(self, id)?;
        for (key, value) in bound {
            self.set_property(id, &key, value)?;
        }
        self.with_behavior(id, |c, cx| c.build(cx));
        Ok(())
    }

    /// Number of live elements.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Removes an element and its subtree.
    pub fn remove(&mut self, id: ElementId) -> Result<()> {
        if let Some(parent) = self.element_ref(id)?.parent {
            self.remove_child(parent, id)?;
        }
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(element) = self.elements.remove(&id) {
                stack.extend(element.children);
            }
        }
        Ok(())
    }

    /// Appends a child, detaching it from its previous parent first.
    pub fn add_child(&mut self, parent: ElementId, child: ElementId) -> Result<()> {
        self.element_ref(child)?;

        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            if id == child {
                return Err(Error::Cycle { parent, child });
            }
            ancestor = self.element_ref(id)?.parent;
        }

        if let Some(old_parent) = self.element_ref(child)?.parent {
            self.remove_child(old_parent, child)?;
        }
        self.element_mut(parent)?.children.push(child);
        self.element_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Unlinks a child. The child stays on the stage as a detached element.
    pub fn remove_child(&mut self, parent: ElementId, child: ElementId) -> Result<()> {
        self.element_mut(parent)?.children.retain(|c| *c != child);
        if let Ok(child) = self.element_mut(child) {
            child.parent = None;
        }
        Ok(())
    }

    /// Appends children described by a plain value: a map becomes one element patched from it, a
    /// list one element per map item.
    pub fn add_child_value(&mut self, parent: ElementId, value: &Value) -> Result<()> {
        match value {
            Value::Map(_) => {
                let child = self.create_element();
                self.patch(child, value)?;
                self.add_child(parent, child)
            }
            Value::List(items) => {
                for item in items {
                    match item {
                        Value::Map(_) => self.add_child_value(parent, item)?,
                        _ => return Err(BuildError::PatchValue.into()),
                    }
                }
                Ok(())
            }
            _ => Err(BuildError::PatchValue.into()),
        }
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.element(id)?.parent
    }

    /// The children of an element; empty if it does not exist.
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.element(id).map_or(&[], |e| &e.children)
    }

    pub fn child_at(&self, id: ElementId, index: usize) -> Option<ElementId> {
        self.children(id).get(index).copied()
    }

    pub fn child_count(&self, id: ElementId) -> usize {
        self.children(id).len()
    }

    /// Finds a descendant by dotted ref path, e.g. `Header.Title`.
    ///
    /// Each segment prefers a direct child; otherwise the search descends, but never into the
    /// children of a component (components are tag roots).
    pub fn tag(&self, id: ElementId, path: &str) -> Option<ElementId> {
        let mut current = id;
        for name in path.split('.') {
            current = self.find_tag(current, name)?;
        }
        Some(current)
    }

    fn find_tag(&self, id: ElementId, name: &str) -> Option<ElementId> {
        let children = self.children(id);
        for &child in children {
            if self.element(child)?.ref_name() == Some(name) {
                return Some(child);
            }
        }
        for &child in children {
            if self.element(child)?.tag_root {
                continue;
            }
            if let Some(found) = self.find_tag(child, name) {
                return Some(found);
            }
        }
        None
    }

    /// Reads a property; `Undefined` if unset or if the element does not exist.
    pub fn get_property(&self, id: ElementId, key: &str) -> Value {
        if let Some(value) = self.signal_property(id, key) {
            return value;
        }
        self.element(id).map_or(Value::Undefined, |e| e.get(key))
    }

    /// Assigns a property.
    ///
    /// On components, the signal map keys and the class's bound setters come first; built-in
    /// properties follow, and anything else lands in the component's property bag. On plain
    /// elements only built-in properties exist.
    pub fn set_property(&mut self, id: ElementId, key: &str, value: Value) -> Result<()> {
        let class = self.element_ref(id)?.component.as_ref().map(|slot| Arc::clone(&slot.class));

        if let Some(class) = class {
            if let Some(result) = self.set_signal_property(id, key, &value) {
                return result;
            }
            if let Some(setter) = class.setters().get(key) {
                self.store_prop(id, key, value.clone())?;
                return self.apply_setter(id, setter, value);
            }
            if let Some(setter) = property_setter(key) {
                return setter(self.element_mut(id)?, value);
            }
            return self.store_prop(id, key, value);
        }

        match property_setter(key) {
            Some(setter) => setter(self.element_mut(id)?, value),
            None => Err(BuildError::UnknownProperty(key.to_owned()).into()),
        }
    }

    fn store_prop(&mut self, id: ElementId, key: &str, value: Value) -> Result<()> {
        let slot = self
            .element_mut(id)?
            .component
            .as_mut()
            .ok_or(Error::NotAComponent(id))?;
        if value.is_undefined() {
            slot.props.shift_remove(key);
        } else {
            slot.props.insert(key.to_owned(), value);
        }
        Ok(())
    }

    fn apply_setter(&mut self, id: ElementId, setter: &Setter, value: Value) -> Result<()> {
        let target = |stage: &Stage, tag: &str| {
            stage
                .tag(id, tag)
                .ok_or_else(|| Error::NoSuchTag(tag.to_owned()))
        };
        match setter {
            Setter::Route { tag, property } => {
                let child = target(self, tag)?;
                self.set_property(child, property, value)
            }
            Setter::Patch { tag } => {
                let child = target(self, tag)?;
                self.patch(child, &value)
            }
            Setter::Fanout(targets) => {
                // A key missing from the assigned map leaves its target as it is instead of
                // clearing it; the numeric built-ins have no unset value.
                for t in targets {
                    if let Some(item) = value.get(&t.arg) {
                        let child = target(self, &t.tag)?;
                        self.set_property(child, &t.property, item.clone())?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Merges a map onto an element.
    ///
    /// Capitalized keys patch the direct child with that ref: a map creates the child if it is
    /// missing, `Undefined` removes it. Other keys are property assignments.
    pub fn patch(&mut self, id: ElementId, value: &Value) -> Result<()> {
        let map = value.as_map().ok_or(BuildError::PatchValue)?;
        for (key, value) in map {
            if !is_ref_key(key) {
                self.set_property(id, key, value.clone())?;
                continue;
            }

            let existing = self
                .children(id)
                .iter()
                .copied()
                .find(|&c| self.element(c).and_then(Element::ref_name) == Some(key.as_str()));
            match (existing, value) {
                (Some(child), Value::Undefined) => self.remove(child)?,
                (None, Value::Undefined) => {}
                (Some(child), value) => self.patch(child, value)?,
                (None, value) => {
                    let child = self.create_element();
                    self.set_property(child, "ref", Value::from(key.as_str()))?;
                    self.patch(child, value)?;
                    self.add_child(id, child)?;
                }
            }
        }
        Ok(())
    }

    pub fn enable_text_texture(&mut self, id: ElementId) -> Result<()> {
        self.element_mut(id)?.enable_text_texture();
        Ok(())
    }

    pub fn set_texture(&mut self, id: ElementId, texture: Texture) -> Result<()> {
        self.element_mut(id)?.texture = Some(texture);
        Ok(())
    }

    /// Describes a subtree structurally, one element per line. Ids are left out, so equally
    /// shaped trees describe equally.
    pub fn describe(&self, id: ElementId) -> String {
        let mut out = String::new();
        self.describe_into(id, 0, &mut out);
        out
    }

    fn describe_into(&self, id: ElementId, depth: usize, out: &mut String) {
        let element = match self.element(id) {
            Some(element) => element,
            None => return,
        };

        // writing to a String cannot fail
        let _ = write!(
            out,
            "{:indent$}{}",
            "",
            element.ref_name().unwrap_or("-"),
            indent = depth * 2
        );
        if let Some(slot) = &element.component {
            let _ = write!(out, " <{}>", slot.class.ty().name());
        }
        let rect = element.rect();
        let _ = write!(
            out,
            " x={} y={} w={} h={} alpha={} visible={}",
            rect.origin.x,
            rect.origin.y,
            rect.size.x,
            rect.size.y,
            element.alpha(),
            element.visible()
        );
        if let Some(text) = element.text() {
            let _ = write!(out, " text={:?}", text.text().unwrap_or(""));
        }
        if let Some(texture) = element.texture() {
            let _ = write!(out, " texture={}", texture.ty().name());
        }
        out.push('\n');

        for &child in element.children() {
            self.describe_into(child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{bind, Template};

    #[derive(Debug, Default)]
    struct Card {
        constructed_with: Option<Value>,
        built_title: Option<Value>,
    }

    impl Component for Card {
        fn template() -> Template {
            template! {
                Title: { text: { text: bind("this.title") } },
                Body: { Inner: { alpha: bind("this.opacity") } },
            }
        }

        fn construct(&mut self, cx: &mut crate::Cx) {
            self.constructed_with = Some(cx.get("tint"));
        }

        fn build(&mut self, cx: &mut crate::Cx) {
            let title = cx.tag("Title").expect("built before the build hook");
            self.built_title = Some(cx.stage().get_property(title, "text"));
        }
    }

    fn stage() -> Stage {
        let stage = Stage::new(Registry::new());
        stage.register::<Card>();
        stage
    }

    #[test]
    fn add_child_reparents_and_rejects_cycles() {
        let mut stage = stage();
        let a = stage.create_element();
        let b = stage.create_element();
        let c = stage.create_element();

        stage.add_child(a, c).unwrap();
        stage.add_child(b, c).unwrap();
        assert!(stage.children(a).is_empty());
        assert_eq!(stage.children(b), &[c]);
        assert_eq!(stage.parent(c), Some(b));

        stage.add_child(a, b).unwrap();
        assert!(matches!(stage.add_child(c, a), Err(Error::Cycle { .. })));
        assert!(matches!(stage.add_child(a, a), Err(Error::Cycle { .. })));
    }

    #[test]
    fn tag_lookup_stops_at_components() {
        let mut stage = stage();
        let root = stage.create_element();
        let card = stage.create_component::<Card>(None).unwrap();
        stage.add_child(root, card).unwrap();
        stage.set_property(card, "ref", Value::from("Card")).unwrap();

        assert_eq!(stage.tag(root, "Card"), Some(card));
        assert!(stage.tag(root, "Title").is_none());
        assert!(stage.tag(root, "Card.Title").is_some());
        assert!(stage.tag(card, "Inner").is_some());
        assert!(stage.tag(card, "Body.Inner").is_some());
        assert!(stage.tag(card, "Body.Missing").is_none());
    }

    #[test]
    fn props_before_and_after_build() {
        let mut stage = stage();
        let props = Value::map(vec![
            ("title", Value::from("Hello")),
            ("tint", Value::from("red")),
            ("x", Value::from(4)),
        ]);
        let card = stage.create_component::<Card>(Some(props)).unwrap();

        let behavior = stage.behavior::<Card>(card).unwrap();
        assert_eq!(behavior.constructed_with, Some(Value::from("red")));
        assert_eq!(behavior.built_title, Some(Value::from("Hello")));
        assert_eq!(stage.get_property(card, "x"), Value::from(4));
        assert_eq!(stage.get_property(card, "title"), Value::from("Hello"));
    }

    #[test]
    fn bound_setter_routes_to_the_tagged_child() {
        let mut stage = stage();
        let card = stage.create_component::<Card>(None).unwrap();
        stage.set_property(card, "opacity", Value::from(0.25)).unwrap();
        let inner = stage.tag(card, "Inner").unwrap();
        assert_eq!(stage.get_property(inner, "alpha"), Value::from(0.25));
    }

    #[test]
    fn component_bag_and_plain_errors() {
        let mut stage = stage();
        let card = stage.create_component::<Card>(None).unwrap();
        stage.set_property(card, "selected", Value::from(true)).unwrap();
        assert_eq!(stage.get_property(card, "selected"), Value::from(true));
        stage.set_property(card, "selected", Value::Undefined).unwrap();
        assert_eq!(stage.get_property(card, "selected"), Value::Undefined);

        let plain = stage.create_element();
        assert!(matches!(
            stage.set_property(plain, "selected", Value::from(true)),
            Err(Error::Build(BuildError::UnknownProperty(_)))
        ));
    }

    #[test]
    fn patch_creates_updates_and_removes_children() {
        let mut stage = stage();
        let root = stage.create_element();
        let create = Value::map(vec![
            ("x", Value::from(1)),
            ("Child", Value::map(vec![("y", Value::from(2))])),
        ]);
        stage.patch(root, &create).unwrap();
        let child = stage.tag(root, "Child").unwrap();
        assert_eq!(stage.get_property(root, "x"), Value::from(1));
        assert_eq!(stage.get_property(child, "y"), Value::from(2));

        let update = Value::map(vec![("Child", Value::map(vec![("y", Value::from(3))]))]);
        stage.patch(root, &update).unwrap();
        assert_eq!(stage.tag(root, "Child"), Some(child));
        assert_eq!(stage.get_property(child, "y"), Value::from(3));

        stage
            .patch(root, &Value::map(vec![("Child", Value::Undefined)]))
            .unwrap();
        assert!(stage.tag(root, "Child").is_none());
        assert!(stage.element(child).is_none());

        assert!(stage.patch(root, &Value::from(1)).is_err());
    }

    #[test]
    fn list_values_add_one_child_per_item() {
        let mut stage = stage();
        let root = stage.create_element();
        let items = Value::List(vec![
            Value::map(vec![("x", Value::from(1))]),
            Value::map(vec![("x", Value::from(2))]),
        ]);
        stage.add_child_value(root, &items).unwrap();
        assert_eq!(stage.child_count(root), 2);
        let second = stage.child_at(root, 1).unwrap();
        assert_eq!(stage.get_property(second, "x"), Value::from(2));
    }

    #[test]
    fn remove_drops_the_subtree() {
        let mut stage = stage();
        let root = stage.create_element();
        let card = stage.create_component::<Card>(None).unwrap();
        stage.add_child(root, card).unwrap();
        let title = stage.tag(card, "Title").unwrap();

        stage.remove(card).unwrap();
        assert!(stage.children(root).is_empty());
        assert!(stage.element(title).is_none());
    }

    #[derive(Debug, Default)]
    struct Broken;
    impl Component for Broken {
        fn template() -> Template {
            template! { Frame: { Box: { x: "wide" } } }
        }
    }

    #[derive(Debug, Default)]
    struct HoldsBroken;
    impl Component for HoldsBroken {
        fn template() -> Template {
            template! {
                Label: { text: "ok" },
                Inner: { type: ComponentType::of::<Broken>() },
            }
        }
    }

    #[test]
    fn failed_builds_leave_nothing_behind() {
        let mut stage = stage();
        stage.register::<HoldsBroken>();

        let err = stage.create_component::<Broken>(None).unwrap_err();
        assert!(matches!(err, Error::Build(BuildError::PropertyType { .. })));
        assert_eq!(stage.element_count(), 0);

        assert!(stage.create_component::<HoldsBroken>(None).is_err());
        assert_eq!(stage.element_count(), 0);
    }

    #[derive(Debug, Default)]
    struct Pair;
    impl Component for Pair {
        fn template() -> Template {
            template! {
                First: { alpha: bind("this.pair.first") },
                Second: { alpha: bind("this.pair.second") },
            }
        }
    }

    #[test]
    fn fan_out_leaves_targets_of_missing_keys() {
        let mut stage = stage();
        stage.register::<Pair>();
        let pair = stage.create_component::<Pair>(None).unwrap();
        let (first, second) = (stage.tag(pair, "First").unwrap(), stage.tag(pair, "Second").unwrap());

        let both = Value::map(vec![("first", Value::from(0.5)), ("second", Value::from(0.25))]);
        stage.set_property(pair, "pair", both).unwrap();
        stage
            .set_property(pair, "pair", Value::map(vec![("first", Value::from(0.75))]))
            .unwrap();

        assert_eq!(stage.get_property(first, "alpha"), Value::from(0.75));
        assert_eq!(stage.get_property(second, "alpha"), Value::from(0.25));
    }
}
