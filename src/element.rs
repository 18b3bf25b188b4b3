//! Scene-tree elements.

use crate::color::Color;
use crate::component::ComponentSlot;
use crate::error::{BuildError, Result};
use crate::rect::Rect;
use crate::texture::Texture;
use crate::value::{Value, ValueMap};
use uuid::Uuid;

/// A unique identifier for an element.
///
/// (this is just a UUID)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(u32, u16, u16, [u8; 8]);

impl ElementId {
    pub(crate) fn new() -> ElementId {
        let uuid = Uuid::new_v4();
        let (a, b, c, d) = uuid.as_fields();
        ElementId(a, b, c, *d)
    }
}

/// A text rendering surface enabled on an element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextSurface {
    props: ValueMap,
}

impl TextSurface {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Sets a surface property; `Undefined` removes it.
    pub fn set(&mut self, key: &str, value: Value) {
        if value.is_undefined() {
            self.props.shift_remove(key);
        } else {
            self.props.insert(key.to_owned(), value);
        }
    }

    /// The rendered string, if one was set.
    pub fn text(&self) -> Option<&str> {
        self.get("text").and_then(Value::as_str)
    }
}

/// A node in the scene tree.
#[derive(Debug)]
pub struct Element {
    pub(crate) id: ElementId,
    /// The tag name under which ancestors find this element.
    pub(crate) ref_name: Option<String>,
    pub(crate) parent: Option<ElementId>,
    /// An ordered list of all children.
    pub(crate) children: Vec<ElementId>,
    pub(crate) rect: Rect,
    pub(crate) alpha: f64,
    pub(crate) visible: bool,
    pub(crate) z_index: f64,
    pub(crate) color: Color,
    pub(crate) text: Option<TextSurface>,
    pub(crate) texture: Option<Texture>,
    /// If true, tag lookups from above do not descend into this element's children.
    pub(crate) tag_root: bool,
    /// Present iff this element is a component.
    pub(crate) component: Option<ComponentSlot>,
}

impl Element {
    pub(crate) fn new(id: ElementId) -> Element {
        Element {
            id,
            ref_name: None,
            parent: None,
            children: Vec::new(),
            rect: Rect::zero(),
            alpha: 1.,
            visible: true,
            z_index: 0.,
            color: Color::WHITE,
            text: None,
            texture: None,
            tag_root: false,
            component: None,
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn ref_name(&self) -> Option<&str> {
        self.ref_name.as_deref()
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn text(&self) -> Option<&TextSurface> {
        self.text.as_ref()
    }

    pub fn texture(&self) -> Option<&Texture> {
        self.texture.as_ref()
    }

    pub fn is_component(&self) -> bool {
        self.component.is_some()
    }

    pub fn tag_root(&self) -> bool {
        self.tag_root
    }

    /// Enables the text surface, keeping an existing one.
    pub(crate) fn enable_text_texture(&mut self) -> &mut TextSurface {
        self.text.get_or_insert_with(TextSurface::default)
    }

    /// Reads a property: built-ins first, then a component's property bag.
    pub fn get(&self, key: &str) -> Value {
        match key {
            "x" => Value::Number(self.rect.origin.x),
            "y" => Value::Number(self.rect.origin.y),
            "w" => Value::Number(self.rect.size.x),
            "h" => Value::Number(self.rect.size.y),
            "alpha" => Value::Number(self.alpha),
            "visible" => Value::Bool(self.visible),
            "zIndex" => Value::Number(self.z_index),
            "color" => Value::Number(f64::from(self.color.to_argb())),
            "ref" => self.ref_name.clone().map_or(Value::Undefined, Value::Str),
            "text" => self
                .text
                .as_ref()
                .and_then(|text| text.get("text").cloned())
                .unwrap_or_default(),
            _ => self
                .component
                .as_ref()
                .and_then(|slot| slot.props.get(key).cloned())
                .unwrap_or_default(),
        }
    }
}

/// Assigns a built-in property.
pub(crate) type PropertySetter = fn(&mut Element, Value) -> Result<()>;

/// The built-in property table shared by every element.
///
/// Returns None for keys that are not built in; those are component properties or errors.
pub(crate) fn property_setter(key: &str) -> Option<PropertySetter> {
    let setter: PropertySetter = match key {
        "x" => |e, v| number("x", &v).map(|n| e.rect.origin.x = n),
        "y" => |e, v| number("y", &v).map(|n| e.rect.origin.y = n),
        "w" => |e, v| number("w", &v).map(|n| e.rect.size.x = n),
        "h" => |e, v| number("h", &v).map(|n| e.rect.size.y = n),
        "alpha" => |e, v| number("alpha", &v).map(|n| e.alpha = n.max(0.).min(1.)),
        "zIndex" => |e, v| number("zIndex", &v).map(|n| e.z_index = n),
        "visible" => set_visible,
        "color" => |e, v| number("color", &v).map(|n| e.color = Color::from_argb(n as u32)),
        "ref" => set_ref,
        "text" => set_text,
        "texture" => set_texture_props,
        _ => return None,
    };
    Some(setter)
}

fn number(key: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        BuildError::PropertyType {
            key: key.to_owned(),
            expected: "a number",
        }
        .into()
    })
}

fn set_visible(element: &mut Element, value: Value) -> Result<()> {
    element.visible = value.as_bool().ok_or_else(|| BuildError::PropertyType {
        key: "visible".to_owned(),
        expected: "a boolean",
    })?;
    Ok(())
}

fn set_ref(element: &mut Element, value: Value) -> Result<()> {
    element.ref_name = match value {
        Value::Str(name) => Some(name),
        Value::Undefined => None,
        _ => {
            return Err(BuildError::PropertyType {
                key: "ref".to_owned(),
                expected: "a string",
            }
            .into())
        }
    };
    Ok(())
}

/// `text` accepts a string (shorthand for the surface's `text`), a map of surface properties, or
/// `Undefined` to drop the surface.
fn set_text(element: &mut Element, value: Value) -> Result<()> {
    match value {
        Value::Undefined => element.text = None,
        Value::Map(props) => {
            let surface = element.enable_text_texture();
            for (key, value) in props {
                surface.set(&key, value);
            }
        }
        value if value.is_literal() => element.enable_text_texture().set("text", value),
        _ => {
            return Err(BuildError::PropertyType {
                key: "text".to_owned(),
                expected: "a literal or a map",
            }
            .into())
        }
    }
    Ok(())
}

/// `texture` with a map patches the current texture; `Undefined` detaches it.
fn set_texture_props(element: &mut Element, value: Value) -> Result<()> {
    match value {
        Value::Undefined => element.texture = None,
        Value::Map(props) => {
            let texture = element.texture.as_mut().ok_or(BuildError::NoTexture)?;
            for (key, value) in props {
                texture.set(&key, value);
            }
        }
        _ => {
            return Err(BuildError::PropertyType {
                key: "texture".to_owned(),
                expected: "a map",
            }
            .into())
        }
    }
    Ok(())
}
