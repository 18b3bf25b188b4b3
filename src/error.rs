//! Errors.

use crate::element::ElementId;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the component layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A signal map setter was given something other than a map.
    #[error("signals: {0}")]
    Config(String),

    /// `fire_ancestors` was called with a name lacking the ancestor marker.
    #[error("ancestor event name must be prefixed by `$`: {0:?}")]
    AncestorName(String),

    /// A compiled builder or a property assignment failed while it ran.
    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    /// A routed setter or a tag lookup found no element with that ref.
    #[error("no element tagged {0:?}")]
    NoSuchTag(String),

    #[error("no such element: {0:?}")]
    NoSuchElement(ElementId),

    #[error("element is not a component: {0:?}")]
    NotAComponent(ElementId),

    /// Adding the child would make an element its own ancestor.
    #[error("cannot add {child:?} to {parent:?}: cycle")]
    Cycle { parent: ElementId, child: ElementId },
}

/// Runtime failures of a template builder or an element property setter.
///
/// Templates are not validated ahead of time; a malformed one fails here when it executes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("unknown property {0:?}")]
    UnknownProperty(String),

    #[error("property {key:?} expects {expected}")]
    PropertyType { key: String, expected: &'static str },

    #[error("text surface is not enabled")]
    NoTextSurface,

    #[error("element has no texture to alias")]
    NoTexture,

    #[error("component class is not registered: {0}")]
    UnregisteredClass(&'static str),

    #[error("store slot {0} does not hold the expected value")]
    StoreSlot(usize),

    #[error("register {0} used before assignment")]
    Register(usize),

    #[error("patch expects a map")]
    PatchValue,
}
