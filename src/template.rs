use crate::component::ComponentType;
use crate::texture::TextureType;
use crate::value::{Value, ValueMap};

/// Builds a [`Template`] from a nested key-value description.
///
/// Braced values become nested declarative structures; anything else is converted with
/// [`Entry::from`].
///
/// ```text
/// template! {
///     Label: {
///         text: { text: "Hi", fontSize: 24 },
///         x: 10,
///     },
///     Button: { type: ComponentType::of::<Button>(), label: bind("this.label") },
/// }
/// ```
#[macro_export]
macro_rules! template {
    (@acc [$t:expr]) => { $t };
    (@acc [$t:expr] $key:ident : { $($inner:tt)* } $(, $($rest:tt)*)?) => {
        $crate::template!(
            @acc [$t.with(stringify!($key), $crate::Entry::Node($crate::template!($($inner)*)))]
            $($($rest)*)?
        )
    };
    (@acc [$t:expr] $key:ident : $value:expr $(, $($rest:tt)*)?) => {
        $crate::template!(
            @acc [$t.with(stringify!($key), $crate::Entry::from($value))]
            $($($rest)*)?
        )
    };
    ($($body:tt)*) => {
        $crate::template!(@acc [$crate::Template::new()] $($body)*)
    };
}

/// A static declarative description of an element subtree.
///
/// Keys keep their insertion order, which is the order the compiler walks them in.
///
/// - Keys starting with an uppercase letter name child slots; their tag is the key.
/// - `text` and `texture` describe the text surface and the texture.
/// - `type` inside a child slot selects the component class (or texture class) to instantiate.
/// - All other keys are property assignments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    entries: Vec<(String, Entry)>,
}

/// A value in a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(Value),
    /// A nested declarative structure.
    Node(Template),
    Type(ComponentType),
    TextureType(TextureType),
    /// Placeholder for a property that is bound to an instance property: never assigned at build
    /// time, routed by the class's setter table instead.
    Bind(String),
}

/// Declares a binding placeholder, e.g. `bind("this.title")` or `bind("this.item.label")`.
pub fn bind(expression: &str) -> Entry {
    Entry::Bind(expression.to_owned())
}

impl Template {
    pub fn new() -> Template {
        Template::default()
    }

    /// Appends an entry; a repeated key replaces the earlier entry in place.
    pub fn with(mut self, key: &str, entry: impl Into<Entry>) -> Template {
        let entry = entry.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((key.to_owned(), entry)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattens this template into a plain map value.
    ///
    /// Used when a declarative structure sits under a plain property key and is therefore
    /// assigned as a whole. Types collapse to their names and bindings to `Undefined`.
    pub fn to_value(&self) -> Value {
        let mut map = ValueMap::new();
        for (key, entry) in self.entries() {
            let value = match entry {
                Entry::Value(value) => value.clone(),
                Entry::Node(node) => node.to_value(),
                Entry::Type(ty) => Value::from(ty.name()),
                Entry::TextureType(ty) => Value::from(ty.name()),
                Entry::Bind(_) => Value::Undefined,
            };
            map.insert(key.to_owned(), value);
        }
        Value::Map(map)
    }

    /// Lifts a plain map into a template, one value entry per key.
    pub fn from_map(map: &ValueMap) -> Template {
        Template {
            entries: map
                .iter()
                .map(|(k, v)| (k.clone(), Entry::Value(v.clone())))
                .collect(),
        }
    }
}

/// Whether a template key names a child slot.
pub(crate) fn is_ref_key(key: &str) -> bool {
    key.chars().next().map_or(false, |c| c.is_ascii_uppercase())
}

impl From<Value> for Entry {
    fn from(value: Value) -> Entry {
        Entry::Value(value)
    }
}

impl From<Template> for Entry {
    fn from(node: Template) -> Entry {
        Entry::Node(node)
    }
}

impl From<ComponentType> for Entry {
    fn from(ty: ComponentType) -> Entry {
        Entry::Type(ty)
    }
}

impl From<TextureType> for Entry {
    fn from(ty: TextureType) -> Entry {
        Entry::TextureType(ty)
    }
}

macro_rules! entry_from_value {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Entry {
                fn from(v: $t) -> Entry {
                    Entry::Value(Value::from(v))
                }
            }
        )+
    }
}
entry_from_value!(bool, f64, i32, u32, &str, String, Vec<Value>, ValueMap);
