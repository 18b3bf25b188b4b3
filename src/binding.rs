//! Property bindings.
//!
//! A binding ties an instance property to a property of a tagged child: assigning the instance
//! property routes the value to the child. Bindings are declared in templates with
//! [`bind`](crate::template::bind) placeholders, or scraped from template source text written in
//! the `prop: this.path` form. Either way they are translated once per class into a
//! [`SetterTable`].

use crate::template::{is_ref_key, Entry, Template};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;

/// Group name for dotted bindings without a namespace segment.
pub const DEFAULT_GROUP: &str = "root";

/// One `property: this.path` association inside a tagged child slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// The enclosing child slot.
    pub tag: String,
    /// The child property being bound.
    pub property: String,
    /// The source expression, e.g. `this.title` or `this.item.label`.
    pub expression: String,
}

impl Binding {
    pub fn new(tag: &str, property: &str, expression: &str) -> Binding {
        Binding {
            tag: tag.to_owned(),
            property: property.to_owned(),
            expression: expression.to_owned(),
        }
    }
}

/// Collects the binding placeholders of a template in document order.
///
/// Each binding belongs to the nearest enclosing capitalized slot; placeholders outside any slot
/// have no target and are ignored.
pub fn extract_bindings(template: &Template) -> Vec<Binding> {
    fn walk(template: &Template, tag: Option<&str>, out: &mut Vec<Binding>) {
        for (key, entry) in template.entries() {
            match entry {
                Entry::Bind(expression) => {
                    if let Some(tag) = tag {
                        out.push(Binding::new(tag, key, expression));
                    }
                }
                Entry::Node(body) => {
                    let tag = if is_ref_key(key) { Some(key) } else { tag };
                    walk(body, tag, out);
                }
                _ => {}
            }
        }
    }

    let mut bindings = Vec::new();
    walk(template, None, &mut bindings);
    bindings
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static PATTERN: OnceLock<Regex> = OnceLock::new();
            PATTERN.get_or_init(|| Regex::new($re).expect("invalid built-in pattern"))
        }
    };
}

pattern!(has_bindings, r"(?i):this\.");
pattern!(binding_pattern, r"(?i)([a-z0-9@$_]+):(this\.[a-z0-9@$_.]+)");
pattern!(binding_path, r"this\.([a-zA-Z0-9@$_.]+)");
pattern!(group_name, r"([a-zA-Z0-9@$_]+)\.");
pattern!(group_arg, r"\.([a-zA-Z0-9@$_]+)");

/// Scrapes bindings from template source text.
///
/// Best effort: whitespace is stripped, then every `prop:this.path` occurrence is attributed to
/// the innermost `Tag:{...}` block that contains it with no nested block in between. Only
/// identifier characters `[A-Za-z0-9@$_]` are recognized.
pub fn scrape_bindings(source: &str) -> Vec<Binding> {
    let source: String = source.chars().filter(|c| !c.is_whitespace()).collect();
    if !has_bindings().is_match(&source) {
        return Vec::new();
    }

    let mut bindings = Vec::new();
    for captures in binding_pattern().captures_iter(&source) {
        let text = &captures[0];
        let locator = format!(
            r"([A-Z][A-Za-z0-9_@$]+):\{{([^{{]*?{}[^}}]*?)\}}",
            regex::escape(text)
        );
        let locator = match Regex::new(&locator) {
            Ok(locator) => locator,
            Err(_) => continue,
        };
        if let Some(block) = locator.captures(&source) {
            bindings.push(Binding::new(&block[1], &captures[1], &captures[2]));
        }
    }
    bindings
}

/// What assigning a bound instance property does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setter {
    /// Assigns the value to `property` of the child tagged `tag`.
    Route { tag: String, property: String },
    /// Patches the child tagged `tag` with the value (bindings of a `link` property).
    Patch { tag: String },
    /// Reads one key per target out of the assigned map and assigns it.
    Fanout(Vec<FanoutTarget>),
}

/// One destination of a grouped binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutTarget {
    pub tag: String,
    /// The child property assigned.
    pub property: String,
    /// The key read from the assigned map.
    pub arg: String,
}

/// Per-class table from instance property name to routed setter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetterTable {
    setters: IndexMap<String, Setter>,
}

impl SetterTable {
    pub fn get(&self, name: &str) -> Option<&Setter> {
        self.setters.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.setters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.setters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setters.is_empty()
    }
}

/// Translates bindings into a setter table.
///
/// - `this.x` routes assignments of `x` to the bound child property. When several bindings use
///   the same `x`, the first one in document order is kept.
/// - `this.group.x` joins the fan-out setter of `group`; assigning `group` a map assigns key `x`
///   of it to the bound child property. A group setter replaces a simple setter of the same name.
pub fn translate(bindings: &[Binding]) -> SetterTable {
    let mut setters = IndexMap::new();
    let mut groups: IndexMap<String, Vec<FanoutTarget>> = IndexMap::new();

    for binding in bindings {
        let path = match binding_path().captures(&binding.expression) {
            Some(captures) => captures[1].to_owned(),
            None => continue,
        };

        if path.contains('.') {
            let group = group_name()
                .captures(&path)
                .map_or_else(|| DEFAULT_GROUP.to_owned(), |c| c[1].to_owned());
            if let Some(arg) = group_arg().captures(&path) {
                groups.entry(group).or_default().push(FanoutTarget {
                    tag: binding.tag.clone(),
                    property: binding.property.clone(),
                    arg: arg[1].to_owned(),
                });
            }
        } else if !setters.contains_key(&path) {
            let setter = if binding.property == "link" {
                Setter::Patch {
                    tag: binding.tag.clone(),
                }
            } else {
                Setter::Route {
                    tag: binding.tag.clone(),
                    property: binding.property.clone(),
                }
            };
            setters.insert(path, setter);
        }
    }

    for (group, targets) in groups {
        setters.insert(group, Setter::Fanout(targets));
    }

    SetterTable { setters }
}
