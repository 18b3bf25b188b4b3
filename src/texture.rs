//! Textures.
//!
//! Textures are leaf data sources attached to elements. The component layer only creates them,
//! assigns their properties and attaches them; loading and uploading is the renderer's business.

use crate::value::{Value, ValueMap};
use core::fmt;

/// A texture class: a name plus the hooks that describe its source.
#[derive(Clone, Copy)]
pub struct TextureType {
    name: &'static str,
    is_valid: fn(&Texture) -> bool,
    source: fn(&Texture) -> Option<Value>,
}

impl TextureType {
    pub const fn new(
        name: &'static str,
        is_valid: fn(&Texture) -> bool,
        source: fn(&Texture) -> Option<Value>,
    ) -> TextureType {
        TextureType {
            name,
            is_valid,
            source,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Creates a fresh texture of this type with no properties.
    pub fn create(&self) -> Texture {
        Texture {
            ty: *self,
            props: ValueMap::new(),
            revision: 0,
        }
    }
}

impl fmt::Debug for TextureType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TextureType({})", self.name)
    }
}

impl PartialEq for TextureType {
    fn eq(&self, other: &TextureType) -> bool {
        self.name == other.name
    }
}

/// A texture instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    ty: TextureType,
    props: ValueMap,
    /// Bumped whenever a property actually changes.
    revision: u64,
}

impl Texture {
    pub fn ty(&self) -> TextureType {
        self.ty
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Sets a property. Setting an equal value is not a change; `Undefined` removes it.
    pub fn set(&mut self, key: &str, value: Value) {
        if value.is_undefined() {
            if self.props.shift_remove(key).is_some() {
                self.revision += 1;
            }
        } else if self.props.get(key) != Some(&value) {
            self.props.insert(key.to_owned(), value);
            self.revision += 1;
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_valid(&self) -> bool {
        (self.ty.is_valid)(self)
    }

    /// The data the renderer would load for this texture.
    pub fn source(&self) -> Option<Value> {
        (self.ty.source)(self)
    }
}

/// A texture whose source is a value handed over up front through its `options` property.
pub const STATIC_TEXTURE: TextureType =
    TextureType::new("StaticTexture", static_is_valid, static_source);

fn static_is_valid(texture: &Texture) -> bool {
    texture.get("options").map_or(false, Value::is_truthy)
}

fn static_source(texture: &Texture) -> Option<Value> {
    texture.get("options").cloned()
}
