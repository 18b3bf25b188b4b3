//! The template compiler.
//!
//! A template is compiled once per component class into a [`CompiledTemplate`]: a flat program
//! of [`Op`]s plus a *store* of captured non-literal values (component classes, texture classes,
//! lists and maps) that ops refer to by position. Executing the program against a root element
//! materializes the template's subtree under it.
//!
//! Elements created while building live in numbered registers; register 0 is the root. Register
//! names (`rLabel0`, `rItem1`, ...) only matter for [`CompiledTemplate::listing`].

use crate::component::ComponentType;
use crate::element::ElementId;
use crate::error::{BuildError, Result};
use crate::stage::Stage;
use crate::template::{is_ref_key, Entry, Template};
use crate::texture::{Texture, TextureType};
use crate::value::Value;
use core::fmt::Write;

/// An element register.
pub type Reg = usize;

/// Where a property assignment lands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// The element in a register.
    Element(Reg),
    /// The text surface of the element in a register.
    Text(Reg),
    /// The texture currently attached to the element in a register.
    Texture(Reg),
    /// A texture under construction, not yet attached.
    NewTexture(usize),
}

/// One step of a compiled builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Creates a plain element.
    CreateElement { reg: Reg },
    /// Instantiates the component class in a store slot.
    CreateComponent { reg: Reg, class: usize },
    /// Tags an element with its slot name.
    SetRef { reg: Reg, name: String },
    /// Appends a built child to its parent.
    AppendChild { parent: Reg, child: Reg },
    /// Appends a precomputed child held in the store.
    AppendStored { parent: Reg, slot: usize },
    EnableText { reg: Reg },
    /// Creates a texture of the class in a store slot.
    NewTexture { texture: usize, class: usize },
    /// Requires the element to already carry a texture, which later ops then modify.
    AliasTexture { reg: Reg },
    /// Attaches a constructed texture to an element.
    AssignTexture { reg: Reg, texture: usize },
    /// Assigns an inline literal.
    Set {
        target: Target,
        key: String,
        value: Value,
    },
    /// Assigns the value in a store slot.
    SetStored {
        target: Target,
        key: String,
        slot: usize,
    },
}

/// A captured non-literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    Class(ComponentType),
    Texture(TextureType),
    Value(Value),
}

/// A compiled builder.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    ops: Vec<Op>,
    store: Vec<Stored>,
    /// Register names; index 0 is the root.
    registers: Vec<String>,
    textures: usize,
}

/// Compiles a template. Holds no state beyond this one call.
pub fn compile(template: &Template) -> CompiledTemplate {
    let mut context = Context {
        ops: Vec::new(),
        store: Vec::new(),
        registers: vec!["element".to_owned()],
        textures: 0,
        rid: 0,
    };
    context.node(template, 0);

    CompiledTemplate {
        ops: context.ops,
        store: context.store,
        registers: context.registers,
        textures: context.textures,
    }
}

struct Context {
    ops: Vec<Op>,
    store: Vec<Stored>,
    registers: Vec<String>,
    textures: usize,
    /// Running id that keeps child register names unique.
    rid: usize,
}

impl Context {
    fn capture(&mut self, value: Stored) -> usize {
        self.store.push(value);
        self.store.len() - 1
    }

    /// Compiles the entries of a declarative structure with `cursor` as the current element.
    fn node(&mut self, template: &Template, cursor: Reg) {
        for (key, entry) in template.entries() {
            if is_ref_key(key) {
                self.child(key, entry, cursor);
                continue;
            }

            match (key, entry) {
                ("text", entry) => {
                    self.ops.push(Op::EnableText { reg: cursor });
                    match entry {
                        Entry::Node(props) => self.props(props, Target::Text(cursor)),
                        Entry::Value(Value::Map(map)) => {
                            self.props(&Template::from_map(map), Target::Text(cursor))
                        }
                        // `text: "Hi"` is shorthand for `text: { text: "Hi" }`
                        Entry::Value(value) if value.is_literal() => self.ops.push(Op::Set {
                            target: Target::Text(cursor),
                            key: "text".to_owned(),
                            value: value.clone(),
                        }),
                        _ => {}
                    }
                }
                ("texture", Entry::Node(props)) => match props.get("type") {
                    Some(Entry::TextureType(ty)) => {
                        let class = self.capture(Stored::Texture(*ty));
                        let texture = self.textures;
                        self.textures += 1;
                        self.ops.push(Op::NewTexture { texture, class });
                        self.props(props, Target::NewTexture(texture));
                        self.ops.push(Op::AssignTexture {
                            reg: cursor,
                            texture,
                        });
                    }
                    _ => {
                        self.ops.push(Op::AliasTexture { reg: cursor });
                        self.props(props, Target::Texture(cursor));
                    }
                },
                // the class of this element was handled when it was created
                (_, Entry::Type(_)) | (_, Entry::TextureType(_)) => {}
                // bound properties are assigned by the setter table, never at build time
                (_, Entry::Bind(_)) | (_, Entry::Value(Value::Undefined)) => {}
                (key, entry) => self.assign(key, entry, Target::Element(cursor)),
            }
        }
    }

    /// Compiles a capitalized key.
    fn child(&mut self, key: &str, entry: &Entry, cursor: Reg) {
        match entry {
            Entry::Node(body) => {
                let reg = self.registers.len();
                let ident: String = key.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
                self.registers.push(format!("r{}{}", ident, self.rid));

                match body.get("type") {
                    Some(Entry::Type(ty)) => {
                        let class = self.capture(Stored::Class(*ty));
                        self.ops.push(Op::CreateComponent { reg, class });
                    }
                    _ => self.ops.push(Op::CreateElement { reg }),
                }
                self.ops.push(Op::SetRef {
                    reg,
                    name: key.to_owned(),
                });
                self.rid += 1;

                self.node(body, reg);

                self.ops.push(Op::AppendChild {
                    parent: cursor,
                    child: reg,
                });
            }
            Entry::Value(value) if value.is_dynamic() => {
                let slot = self.capture(Stored::Value(value.clone()));
                self.ops.push(Op::AppendStored {
                    parent: cursor,
                    slot,
                });
            }
            _ => {}
        }
    }

    /// Compiles the properties of a text surface or texture.
    fn props(&mut self, template: &Template, target: Target) {
        for (key, entry) in template.entries() {
            if key == "type" {
                continue;
            }
            match entry {
                Entry::Bind(_) | Entry::Type(_) | Entry::TextureType(_) => {}
                entry => self.assign(key, entry, target),
            }
        }
    }

    fn assign(&mut self, key: &str, entry: &Entry, target: Target) {
        let value = match entry {
            Entry::Value(value) => value.clone(),
            // an object literal under a plain key is assigned as a whole
            Entry::Node(node) => node.to_value(),
            _ => return,
        };

        if value.is_dynamic() {
            let slot = self.capture(Stored::Value(value));
            self.ops.push(Op::SetStored {
                target,
                key: key.to_owned(),
                slot,
            });
        } else {
            self.ops.push(Op::Set {
                target,
                key: key.to_owned(),
                value,
            });
        }
    }
}

impl CompiledTemplate {
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn store(&self) -> &[Stored] {
        &self.store
    }

    /// Component classes instantiated by this builder, in store order.
    pub fn component_types(&self) -> impl Iterator<Item = ComponentType> + '_ {
        self.store.iter().filter_map(|stored| match stored {
            Stored::Class(ty) => Some(*ty),
            _ => None,
        })
    }

    /// Runs the builder against `root`.
    ///
    /// Only the subtree under `root` is touched. Inconsistencies (aliasing a texture the element
    /// does not have, instantiating an unregistered class, ...) fail here; elements created by a
    /// failed build that were not yet appended are removed again.
    pub fn build(&self, stage: &mut Stage, root: ElementId) -> Result<()> {
        let mut regs: Vec<Option<ElementId>> = vec![None; self.registers.len()];
        regs[0] = Some(root);

        let result = self.run(stage, &mut regs);
        if result.is_err() {
            for &id in regs.iter().skip(1).flatten() {
                if stage.element(id).map_or(false, |e| e.parent().is_none()) {
                    stage.remove(id)?;
                }
            }
        }
        result
    }

    fn run(&self, stage: &mut Stage, regs: &mut Vec<Option<ElementId>>) -> Result<()> {
        let mut textures: Vec<Option<Texture>> = vec![None; self.textures];

        let reg = |regs: &[Option<ElementId>], reg: Reg| {
            regs.get(reg)
                .copied()
                .flatten()
                .ok_or(BuildError::Register(reg))
        };

        for op in &self.ops {
            match op {
                Op::CreateElement { reg: r } => regs[*r] = Some(stage.create_element()),
                Op::CreateComponent { reg: r, class } => {
                    let ty = match self.store.get(*class) {
                        Some(Stored::Class(ty)) => *ty,
                        _ => return Err(BuildError::StoreSlot(*class).into()),
                    };
                    regs[*r] = Some(stage.instantiate(ty, None)?);
                }
                Op::SetRef { reg: r, name } => {
                    let id = reg(&regs, *r)?;
                    stage.set_property(id, "ref", Value::from(name.as_str()))?;
                }
                Op::AppendChild { parent, child } => {
                    let (parent, child) = (reg(&regs, *parent)?, reg(&regs, *child)?);
                    stage.add_child(parent, child)?;
                }
                Op::AppendStored { parent, slot } => {
                    let parent = reg(&regs, *parent)?;
                    match self.store.get(*slot) {
                        Some(Stored::Value(value)) => stage.add_child_value(parent, value)?,
                        _ => return Err(BuildError::StoreSlot(*slot).into()),
                    }
                }
                Op::EnableText { reg: r } => {
                    let id = reg(&regs, *r)?;
                    stage.enable_text_texture(id)?;
                }
                Op::NewTexture { texture, class } => match self.store.get(*class) {
                    Some(Stored::Texture(ty)) => textures[*texture] = Some(ty.create()),
                    _ => return Err(BuildError::StoreSlot(*class).into()),
                },
                Op::AliasTexture { reg: r } => {
                    let id = reg(&regs, *r)?;
                    if stage.element_ref(id)?.texture().is_none() {
                        return Err(BuildError::NoTexture.into());
                    }
                }
                Op::AssignTexture { reg: r, texture } => {
                    let id = reg(&regs, *r)?;
                    let texture = textures[*texture].take().ok_or(BuildError::NoTexture)?;
                    stage.set_texture(id, texture)?;
                }
                Op::Set { target, key, value } => {
                    self.assign(stage, &regs, &mut textures, *target, key, value.clone())?
                }
                Op::SetStored { target, key, slot } => {
                    let value = match self.store.get(*slot) {
                        Some(Stored::Value(value)) => value.clone(),
                        _ => return Err(BuildError::StoreSlot(*slot).into()),
                    };
                    self.assign(stage, &regs, &mut textures, *target, key, value)?
                }
            }
        }
        Ok(())
    }

    fn assign(
        &self,
        stage: &mut Stage,
        regs: &[Option<ElementId>],
        textures: &mut [Option<Texture>],
        target: Target,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let element = |r: Reg| regs.get(r).copied().flatten().ok_or(BuildError::Register(r));
        match target {
            Target::Element(r) => stage.set_property(element(r)?, key, value),
            Target::Text(r) => {
                let surface = stage
                    .element_mut(element(r)?)?
                    .text
                    .as_mut()
                    .ok_or(BuildError::NoTextSurface)?;
                surface.set(key, value);
                Ok(())
            }
            Target::Texture(r) => {
                let texture = stage
                    .element_mut(element(r)?)?
                    .texture
                    .as_mut()
                    .ok_or(BuildError::NoTexture)?;
                texture.set(key, value);
                Ok(())
            }
            Target::NewTexture(t) => {
                let texture = textures
                    .get_mut(t)
                    .and_then(Option::as_mut)
                    .ok_or(BuildError::NoTexture)?;
                texture.set(key, value);
                Ok(())
            }
        }
    }

    /// Renders the program one statement per line.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for op in &self.ops {
            // writing to a String cannot fail
            let _ = self.write_op(&mut out, op);
            out.push('\n');
        }
        out
    }

    fn write_op(&self, out: &mut String, op: &Op) -> core::fmt::Result {
        let name = |r: Reg| self.registers.get(r).map_or("?", String::as_str);
        let target = |t: Target| match t {
            Target::Element(r) => name(r).to_owned(),
            Target::Text(r) => format!("{}.text", name(r)),
            Target::Texture(r) => format!("{}.texture", name(r)),
            Target::NewTexture(t) => format!("texture{}", t),
        };
        match op {
            Op::CreateElement { reg } => write!(out, "{} = create_element()", name(*reg)),
            Op::CreateComponent { reg, class } => {
                write!(out, "{} = instantiate(store[{}])", name(*reg), class)
            }
            Op::SetRef { reg, name: tag } => write!(out, "{}.ref = {:?}", name(*reg), tag),
            Op::AppendChild { parent, child } => {
                write!(out, "{}.children.add({})", name(*parent), name(*child))
            }
            Op::AppendStored { parent, slot } => {
                write!(out, "{}.children.add(store[{}])", name(*parent), slot)
            }
            Op::EnableText { reg } => write!(out, "{}.enable_text()", name(*reg)),
            Op::NewTexture { texture, class } => {
                write!(out, "texture{} = create_texture(store[{}])", texture, class)
            }
            Op::AliasTexture { reg } => write!(out, "{}.texture", name(*reg)),
            Op::AssignTexture { reg, texture } => {
                write!(out, "{}.texture = texture{}", name(*reg), texture)
            }
            Op::Set { target: t, key, value } => write!(out, "{}[{:?}] = {}", target(*t), key, value),
            Op::SetStored { target: t, key, slot } => {
                write!(out, "{}[{:?}] = store[{}]", target(*t), key, slot)
            }
        }
    }
}
