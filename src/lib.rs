//! Declarative UI components.
//!
//! # Conceptual overview
//! Weft is the component layer of a retained scene tree: it turns static, declarative
//! descriptions of element subtrees into live elements, routes properties into them, drives the
//! component lifecycle and lets components talk to their ancestors.
//!
//! ## Elements and the stage
//! The [`Stage`] owns every [`Element`]. Elements have built-in properties (position, size,
//! alpha, visibility, colour, an optional text surface and an optional texture), an ordered child
//! list and an optional `ref` tag under which their ancestors find them. Components are elements
//! with behavior attached; they are *tag roots*, meaning tag lookups from above stop at them.
//!
//! ## Templates
//! A component class describes its subtree once with a [`Template`] (usually written with the
//! [`template!`] macro). Capitalized keys are child slots, `text` and `texture` describe surfaces,
//! anything else assigns a property. Registering a class compiles its template into a flat op
//! program (see [`compiler`]) that every instance then runs.
//!
//! ## Bindings
//! Template values written as [`bind`]`("this.title")` tie an instance property to a child
//! property: assigning `title` on the instance routes the value to the bound child. Dotted paths
//! (`this.item.title`) group bindings, so that assigning `item` a map fans its keys out to
//! several children. Bindings can also be scraped from template source text; see [`binding`].
//!
//! ## Lifecycle
//! Components go through setup, attach/detach, enable/disable and active/inactive phases. The
//! phases are entered from outside; the component layer guarantees that the one-time hooks of
//! each phase run only once per instance. See [`lifecycle`].
//!
//! ## Signals
//! Components emit signals to the nearest ancestor component that handles signals. Their signal
//! maps decide whether an event is dropped, handled, renamed or passed further up. See
//! [`signal`].
//!
//! ## Focus
//! If the stage has an [`Application`], focus runs along a path of components from its root
//! downward; state changes recompute it.

#[macro_use]
mod template;

pub mod application;
pub mod binding;
pub mod color;
pub mod compiler;
pub mod component;
pub mod element;
mod error;
pub mod lifecycle;
pub mod rect;
pub mod signal;
mod stage;
pub mod texture;
mod value;

pub use application::Application;
pub use binding::{Binding, Setter, SetterTable, DEFAULT_GROUP};
pub use compiler::{compile, CompiledTemplate};
pub use component::{ClassDef, Component, ComponentType, Cx, Handlers, Registry};
pub use element::{Element, ElementId};
pub use error::{BuildError, Error, Result};
pub use signal::{PassRoute, SignalRoute, ANCESTOR_MARKER};
pub use stage::Stage;
pub use template::{bind, Entry, Template};
pub use texture::{Texture, TextureType, STATIC_TEXTURE};
pub use value::{Value, ValueMap};
