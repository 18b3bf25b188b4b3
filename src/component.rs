//! Components.
//!
//! A component is an element with behavior: a [`Component`] implementation that supplies a
//! static template, optional bindings and signal handlers, and lifecycle hooks. Classes are
//! registered once in a [`Registry`], which compiles everything class-level up front; instances
//! then share the resulting [`ClassDef`].

use crate::binding::{extract_bindings, scrape_bindings, translate, SetterTable};
use crate::compiler::{compile, CompiledTemplate};
use crate::element::ElementId;
use crate::error::Result;
use crate::lifecycle::LifecycleFlags;
use crate::signal::{PassSignalMap, SignalMap};
use crate::stage::Stage;
use crate::template::Template;
use crate::value::{Value, ValueMap};
use core::any::{Any, TypeId};
use core::fmt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// For downcasting; implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Component behavior.
///
/// Every hook is a no-op by default. Hooks receive a [`Cx`] that gives access to the stage and to
/// this component's element.
///
/// The one-time hooks (`setup`, `init`, `first_enable`, `first_active`) run at most once per
/// instance no matter how often their phase is entered again.
#[allow(unused_variables)]
pub trait Component: AsAny + fmt::Debug {
    /// The declarative description of this class's subtree.
    fn template() -> Template
    where
        Self: Sized,
    {
        Template::new()
    }

    /// Template source text to scrape `prop: this.path` bindings from, in addition to the
    /// [`bind`](crate::template::bind) placeholders of [`Component::template`].
    fn template_source() -> Option<&'static str>
    where
        Self: Sized,
    {
        None
    }

    /// Signal and ancestor-event handlers of this class.
    fn handlers() -> Handlers<Self>
    where
        Self: Sized,
    {
        Handlers::new()
    }

    /// If true, this class never handles signals itself; resolution continues at its own
    /// component parent.
    fn signal_proxy() -> bool
    where
        Self: Sized,
    {
        false
    }

    /// Runs before the template is built.
    fn construct(&mut self, cx: &mut Cx) {}

    /// Runs right after the template is built.
    fn build(&mut self, cx: &mut Cx) {}

    fn setup(&mut self, cx: &mut Cx) {}
    fn init(&mut self, cx: &mut Cx) {}
    fn attach(&mut self, cx: &mut Cx) {}
    fn detach(&mut self, cx: &mut Cx) {}
    fn first_enable(&mut self, cx: &mut Cx) {}
    fn enable(&mut self, cx: &mut Cx) {}
    fn disable(&mut self, cx: &mut Cx) {}
    fn first_active(&mut self, cx: &mut Cx) {}
    fn active(&mut self, cx: &mut Cx) {}
    fn inactive(&mut self, cx: &mut Cx) {}

    /// Called after the named state changed.
    fn state_changed(&mut self, cx: &mut Cx, from: &str, to: &str) {}

    /// This component entered the focus path.
    fn focus(&mut self, cx: &mut Cx, new_target: ElementId, prev_target: Option<ElementId>) {}

    /// This component left the focus path.
    fn unfocus(&mut self, cx: &mut Cx, new_target: Option<ElementId>) {}

    /// This component stayed in the focus path while its final target changed.
    fn focus_change(&mut self, cx: &mut Cx, target: ElementId, prev_target: Option<ElementId>) {}

    /// The child component focus is delegated to, or None to keep it here.
    fn get_focused(&mut self, cx: &mut Cx) -> Option<ElementId> {
        None
    }

    /// Contributes to the settings collected along the focus path, root first.
    fn set_focus_settings(&mut self, cx: &mut Cx, settings: &mut ValueMap) {}

    /// Reacts to the final focus settings.
    fn handle_focus_settings(&mut self, cx: &mut Cx, settings: &ValueMap) {}
}

/// A signal or ancestor-event handler method.
pub type Handler<T> = fn(&mut T, &mut Cx, &[Value]) -> Value;

/// A typed handler table, declared by [`Component::handlers`].
pub struct Handlers<T> {
    entries: Vec<(&'static str, Handler<T>)>,
}

impl<T: Component> Handlers<T> {
    pub fn new() -> Handlers<T> {
        Handlers {
            entries: Vec::new(),
        }
    }

    /// Adds a handler. Ancestor events (`fire_ancestors`) use `$`-prefixed names.
    pub fn on(mut self, name: &'static str, handler: Handler<T>) -> Handlers<T> {
        self.entries.push((name, handler));
        self
    }

    fn erase(self) -> HandlerTable {
        let mut map: HashMap<&'static str, ErasedHandler> = HashMap::new();
        for (name, handler) in self.entries {
            let erased: ErasedHandler = Box::new(
                move |component: &mut dyn Component, cx: &mut Cx, args: &[Value]| {
                    match component.as_any_mut().downcast_mut::<T>() {
                        Some(component) => handler(component, cx, args),
                        None => Value::Undefined,
                    }
                },
            );
            map.insert(name, erased);
        }
        HandlerTable { map }
    }
}

impl<T: Component> Default for Handlers<T> {
    fn default() -> Handlers<T> {
        Handlers::new()
    }
}

type ErasedHandler = Box<dyn Fn(&mut dyn Component, &mut Cx, &[Value]) -> Value + Send + Sync>;

/// Type-erased handler table of a class.
pub struct HandlerTable {
    map: HashMap<&'static str, ErasedHandler>,
}

impl HandlerTable {
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&ErasedHandler> {
        self.map.get(name)
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names: Vec<_> = self.map.keys().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}

/// Describes a component class.
#[derive(Clone, Copy)]
pub struct ComponentType {
    name: &'static str,
    type_id: TypeId,
    template: fn() -> Template,
    template_source: fn() -> Option<&'static str>,
    handlers: fn() -> HandlerTable,
    signal_proxy: fn() -> bool,
    create: fn() -> Box<dyn Component>,
}

impl ComponentType {
    pub fn of<T: Component + Default>() -> ComponentType {
        ComponentType {
            name: core::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            template: T::template,
            template_source: T::template_source,
            handlers: erased_handlers::<T>,
            signal_proxy: T::signal_proxy,
            create: create_boxed::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn create(&self) -> Box<dyn Component> {
        (self.create)()
    }
}

fn erased_handlers<T: Component>() -> HandlerTable {
    T::handlers().erase()
}

fn create_boxed<T: Component + Default>() -> Box<dyn Component> {
    Box::new(T::default())
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ComponentType({})", self.name)
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &ComponentType) -> bool {
        self.type_id == other.type_id
    }
}

/// Everything compiled for a class. Immutable once registered.
#[derive(Debug)]
pub struct ClassDef {
    ty: ComponentType,
    builder: CompiledTemplate,
    setters: SetterTable,
    handlers: HandlerTable,
    signal_proxy: bool,
}

impl ClassDef {
    fn compile(ty: ComponentType) -> ClassDef {
        let template = (ty.template)();
        let builder = compile(&template);

        let mut bindings = extract_bindings(&template);
        if let Some(source) = (ty.template_source)() {
            bindings.extend(scrape_bindings(source));
        }
        let setters = translate(&bindings);

        ClassDef {
            ty,
            builder,
            setters,
            handlers: (ty.handlers)(),
            signal_proxy: (ty.signal_proxy)(),
        }
    }

    pub fn ty(&self) -> ComponentType {
        self.ty
    }

    pub fn builder(&self) -> &CompiledTemplate {
        &self.builder
    }

    pub fn setters(&self) -> &SetterTable {
        &self.setters
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn signal_proxy(&self) -> bool {
        self.signal_proxy
    }
}

/// Class registry, shared by every stage created from it.
///
/// Registering a class compiles its template, bindings and handler table once; component
/// classes instantiated by its template are registered along with it.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    classes: Arc<RwLock<HashMap<TypeId, Arc<ClassDef>>>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Registers a class and every class its template instantiates. Registering again is a
    /// no-op that returns the existing definition.
    pub fn register(&self, ty: ComponentType) -> Arc<ClassDef> {
        if let Some(def) = self.get(ty.type_id()) {
            return def;
        }

        let def = Arc::new(ClassDef::compile(ty));
        debug!(
            class = ty.name(),
            ops = def.builder.ops().len(),
            store = def.builder.store().len(),
            setters = def.setters.len(),
            "registered component class"
        );

        let def = Arc::clone(
            self.classes
                .write()
                .entry(ty.type_id())
                .or_insert_with(|| def),
        );

        // published first, so self-referencing templates terminate
        for child in def.builder.component_types() {
            self.register(child);
        }
        def
    }

    pub fn get(&self, type_id: TypeId) -> Option<Arc<ClassDef>> {
        self.classes.read().get(&type_id).cloned()
    }

    pub fn contains<T: Component>(&self) -> bool {
        self.classes.read().contains_key(&TypeId::of::<T>())
    }
}

/// Per-instance component data, stored on the element.
#[derive(Debug)]
pub(crate) struct ComponentSlot {
    pub(crate) class: Arc<ClassDef>,
    /// Taken out while one of its hooks or handlers runs.
    pub(crate) behavior: Option<Box<dyn Component>>,
    pub(crate) flags: LifecycleFlags,
    pub(crate) signals: Option<SignalMap>,
    pub(crate) pass_signals: Option<PassSignalMap>,
    /// Properties without a built-in or bound setter.
    pub(crate) props: ValueMap,
    /// Current named state; empty when in the base state.
    pub(crate) state: String,
}

impl ComponentSlot {
    pub(crate) fn new(class: Arc<ClassDef>, behavior: Box<dyn Component>) -> ComponentSlot {
        ComponentSlot {
            class,
            behavior: Some(behavior),
            flags: LifecycleFlags::default(),
            signals: None,
            pass_signals: None,
            props: ValueMap::new(),
            state: String::new(),
        }
    }
}

/// Hook context: the stage plus the component the hook runs for.
pub struct Cx<'a> {
    stage: &'a mut Stage,
    id: ElementId,
}

impl<'a> Cx<'a> {
    pub(crate) fn new(stage: &'a mut Stage, id: ElementId) -> Cx<'a> {
        Cx { stage, id }
    }

    /// This component's element.
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn stage(&mut self) -> &mut Stage {
        self.stage
    }

    /// Finds a tagged descendant by dotted ref path.
    pub fn tag(&self, path: &str) -> Option<ElementId> {
        self.stage.tag(self.id, path)
    }

    /// Assigns a property of a tagged descendant.
    pub fn set(&mut self, path: &str, key: &str, value: impl Into<Value>) -> Result<()> {
        let target = self
            .tag(path)
            .ok_or_else(|| crate::Error::NoSuchTag(path.to_owned()))?;
        self.stage.set_property(target, key, value.into())
    }

    /// Reads a property of this component.
    pub fn get(&self, key: &str) -> Value {
        self.stage.get_property(self.id, key)
    }

    pub fn signal(&mut self, event: &str, args: &[Value]) -> Result<Option<Value>> {
        self.stage.signal(self.id, event, args)
    }

    pub fn fire_ancestors(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>> {
        self.stage.fire_ancestors(self.id, name, args)
    }

    /// This component's named state.
    pub fn state(&self) -> &str {
        self.stage.state(self.id).unwrap_or("")
    }

    pub fn set_state(&mut self, state: &str) -> Result<()> {
        self.stage.set_state(self.id, state)
    }

    pub fn refocus(&mut self) -> Result<()> {
        self.stage.refocus()
    }

    pub fn has_focus(&self) -> bool {
        self.stage.has_focus(self.id)
    }

    pub fn has_final_focus(&self) -> bool {
        self.stage.has_final_focus(self.id)
    }

    pub fn cparent(&self) -> Option<ElementId> {
        self.stage.cparent(self.id)
    }
}

/// Component-aware tree queries.
impl Stage {
    pub fn is_component(&self, id: ElementId) -> bool {
        self.element(id).map_or(false, |e| e.is_component())
    }

    /// The nearest component at or above an element.
    pub fn component_of(&self, id: ElementId) -> Option<ElementId> {
        let mut current = Some(id);
        while let Some(id) = current {
            let element = self.element(id)?;
            if element.is_component() {
                return Some(id);
            }
            current = element.parent();
        }
        None
    }

    /// The owning component of an element's parent. Plain elements in between are skipped.
    pub fn cparent(&self, id: ElementId) -> Option<ElementId> {
        let parent = self.element(id)?.parent()?;
        self.component_of(parent)
    }

    /// The nearest component ancestor of class `T`.
    pub fn seek_ancestor_by_type<T: Component>(&self, id: ElementId) -> Option<ElementId> {
        let mut current = self.cparent(id);
        while let Some(c) = current {
            if self.class_of(c).map_or(false, |def| def.ty().type_id() == TypeId::of::<T>()) {
                return Some(c);
            }
            current = self.cparent(c);
        }
        None
    }

    /// The nearest component containing both elements.
    pub fn shared_ancestor_component(&self, a: ElementId, b: ElementId) -> Option<ElementId> {
        let mut ancestors = Vec::new();
        let mut current = Some(a);
        while let Some(id) = current {
            ancestors.push(id);
            current = self.element(id)?.parent();
        }

        let mut current = Some(b);
        while let Some(id) = current {
            if ancestors.contains(&id) {
                return self.component_of(id);
            }
            current = self.element(id)?.parent();
        }
        None
    }

    /// The topmost components below an element: descent stops at each component found.
    pub fn collect_sub_components(&self, id: ElementId) -> Vec<ElementId> {
        let mut subs = Vec::new();
        self.collect_sub_components_into(id, &mut subs);
        subs
    }

    fn collect_sub_components_into(&self, id: ElementId, subs: &mut Vec<ElementId>) {
        for &child in self.children(id) {
            if self.is_component(child) {
                subs.push(child);
            } else {
                self.collect_sub_components_into(child, subs);
            }
        }
    }

    pub fn class_of(&self, id: ElementId) -> Option<&Arc<ClassDef>> {
        self.element(id)?.component.as_ref().map(|slot| &slot.class)
    }

    /// Downcasts a component's behavior.
    pub fn behavior<T: Component>(&self, id: ElementId) -> Option<&T> {
        let slot = self.element(id)?.component.as_ref()?;
        slot.behavior.as_deref()?.as_any().downcast_ref::<T>()
    }

    pub fn behavior_mut<T: Component>(&mut self, id: ElementId) -> Option<&mut T> {
        let slot = self.element_mut(id).ok()?.component.as_mut()?;
        slot.behavior.as_deref_mut()?.as_any_mut().downcast_mut::<T>()
    }

    /// Whether a component's behavior is out of its slot because one of its hooks or handlers
    /// is running.
    pub fn is_busy(&self, id: ElementId) -> bool {
        self.element(id)
            .and_then(|e| e.component.as_ref())
            .map_or(false, |slot| slot.behavior.is_none())
    }

    /// Runs `f` with a component's behavior taken out of its slot.
    ///
    /// Returns None if the element is not a component or its behavior is already running. Calls
    /// deferred for this component while it ran are made once it is back; a focus update
    /// requested meanwhile runs when the outermost hook returns.
    pub(crate) fn with_behavior<R>(
        &mut self,
        id: ElementId,
        f: impl FnOnce(&mut dyn Component, &mut Cx) -> R,
    ) -> Option<R> {
        let mut behavior = self
            .element_mut(id)
            .ok()?
            .component
            .as_mut()?
            .behavior
            .take()?;

        self.running += 1;
        let result = f(&mut *behavior, &mut Cx::new(self, id));
        self.running -= 1;

        // the element may have been removed by the hook
        if let Ok(element) = self.element_mut(id) {
            if let Some(slot) = element.component.as_mut() {
                slot.behavior = Some(behavior);
            }
        }

        self.run_deferred(id);
        if self.running == 0 {
            self.run_pending_focus_update();
        }
        Some(result)
    }

    /// Makes the calls queued for `id`, oldest first.
    fn run_deferred(&mut self, id: ElementId) {
        if self.deferred.is_empty() {
            return;
        }
        let (ready, rest): (Vec<_>, Vec<_>) = core::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|call| call.target() == id);
        self.deferred = rest;

        for call in ready {
            match call {
                Deferred::StateChanged { from, to, .. } => {
                    self.with_behavior(id, |c, cx| c.state_changed(cx, &from, &to));
                }
                Deferred::Handler { method, args, .. } => {
                    self.call_handler(id, &method, &args);
                }
            }
        }
    }
}

/// A call that could not be made because its component was busy.
#[derive(Debug)]
pub(crate) enum Deferred {
    StateChanged {
        id: ElementId,
        from: String,
        to: String,
    },
    Handler {
        id: ElementId,
        method: String,
        args: Vec<Value>,
    },
}

impl Deferred {
    fn target(&self) -> ElementId {
        match self {
            Deferred::StateChanged { id, .. } | Deferred::Handler { id, .. } => *id,
        }
    }
}
