//! Schema declaration: the static tree of typed fields a document is matched against.
//!
//! A schema is a root [`Group`] plus a table of named [`Usertype`]s (tagged unions). Each
//! group is an ordered list of `(name, Node)` transitions; the matcher looks keys up in that
//! order and the first match wins.
//!
//! Nodes are built with small constructors and chained setters:
//!
//! ```rust
//! use coyaml::{Group, Node, Schema};
//!
//! let root = Group::new()
//!     .field("port", Node::uint().min(1).max(65535).with_default(8080).command_line("-p --port"))
//!     .field("name", Node::string().with_default("demo").environ("DEMO_NAME"))
//!     .field("peers", Node::array(Node::string()));
//! let schema = Schema::new(root).unwrap();
//! assert_eq!(schema.root().len(), 3);
//! ```
//!
//! Setter misuse (a bound on a boolean, a default of the wrong kind, ...) is recorded on the
//! node and reported as an assertion error by [`SchemaBuilder::build`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::error::Error;
use crate::value::Value;

/// Bitmask flag: the lower bound applies.
pub const HAS_MIN: u8 = 1;
/// Bitmask flag: the upper bound applies.
pub const HAS_MAX: u8 = 2;

/// Inclusive numeric bounds. `mask` tells which of `min`/`max` apply.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds<T> {
    pub mask: u8,
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + fmt::Display + Copy> Bounds<T> {
    /// Check `v` against the active bounds.
    pub(crate) fn check(&self, v: T) -> Result<(), String> {
        if self.mask & HAS_MIN != 0 && v < self.min {
            return Err(format!("value {v} is below the minimum {}", self.min));
        }
        if self.mask & HAS_MAX != 0 && v > self.max {
            return Err(format!("value {v} is above the maximum {}", self.max));
        }
        Ok(())
    }

    fn inverted(&self) -> bool {
        self.mask & (HAS_MIN | HAS_MAX) == (HAS_MIN | HAS_MAX) && self.min > self.max
    }
}

/// Flavor of a string field. Files and directories are strings with a distinct kind so
/// callers and the emitter can tell them apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringKind {
    String,
    File,
    Dir,
}

/// How a list field (array or mapping) relates to inherited content.
///
/// Only whether the field counts as "filled" differs; the copy pass appends inherited
/// elements to unfilled lists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Inheritance {
    /// Always mark the list filled: an explicit list never inherits.
    #[default]
    None,
    /// Leave the list unfilled so inherited elements are appended, unless tagged `!Replace`.
    AppendToDefault,
    /// Mark the list filled unless tagged `!Append`.
    ReplaceDefault,
}

/// Kind-specific payload of a [`Node`].
#[derive(Clone, Debug)]
pub enum NodeKind {
    Group(Group),
    Int(Bounds<i64>),
    UInt(Bounds<u64>),
    Float(Bounds<f64>),
    Bool,
    String(StringKind),
    Array {
        element: Box<Node>,
        inheritance: Inheritance,
    },
    Mapping {
        key: Box<Node>,
        value: Box<Node>,
        inheritance: Inheritance,
    },
    /// Reference to a usertype declared on the schema, by name.
    Custom(String),
}

impl NodeKind {
    /// Name of the kind as written in schema descriptions.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Group(_) => "group",
            NodeKind::Int(_) => "int",
            NodeKind::UInt(_) => "uint",
            NodeKind::Float(_) => "float",
            NodeKind::Bool => "bool",
            NodeKind::String(StringKind::String) => "string",
            NodeKind::String(StringKind::File) => "file",
            NodeKind::String(StringKind::Dir) => "dir",
            NodeKind::Array { .. } => "array",
            NodeKind::Mapping { .. } => "mapping",
            NodeKind::Custom(_) => "struct",
        }
    }

    /// Whether this kind holds a single scalar value.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            NodeKind::Int(_) | NodeKind::UInt(_) | NodeKind::Float(_) | NodeKind::Bool | NodeKind::String(_)
        )
    }
}

/// Attributes shared by every node kind.
#[derive(Clone, Debug, Default)]
pub struct FieldMeta {
    /// Fill slot within the enclosing usertype; assigned by [`Usertype::new`].
    pub(crate) fill: Option<usize>,
    pub(crate) default: Option<Value>,
    pub(crate) description: Option<String>,
    pub(crate) command_line: Vec<String>,
    pub(crate) command_line_incr: Vec<String>,
    pub(crate) command_line_decr: Vec<String>,
    pub(crate) environ: Option<String>,
    defects: SmallVec<[String; 1]>,
}

impl FieldMeta {
    pub fn fill(&self) -> Option<usize> {
        self.fill
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    pub fn command_line_incr(&self) -> &[String] {
        &self.command_line_incr
    }

    pub fn command_line_decr(&self) -> &[String] {
        &self.command_line_decr
    }

    pub fn environ(&self) -> Option<&str> {
        self.environ.as_deref()
    }

    /// Whether any command-line or environment override is declared.
    pub fn has_overrides(&self) -> bool {
        !self.command_line.is_empty()
            || !self.command_line_incr.is_empty()
            || !self.command_line_decr.is_empty()
            || self.environ.is_some()
    }
}

/// One schema field.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) meta: FieldMeta,
}

fn split_flags(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(str::to_owned).collect()
}

impl Node {
    fn of(kind: NodeKind) -> Self {
        Self {
            kind,
            meta: FieldMeta::default(),
        }
    }

    pub fn int() -> Self {
        Self::of(NodeKind::Int(Bounds::default()))
    }

    pub fn uint() -> Self {
        Self::of(NodeKind::UInt(Bounds::default()))
    }

    pub fn float() -> Self {
        Self::of(NodeKind::Float(Bounds::default()))
    }

    pub fn boolean() -> Self {
        Self::of(NodeKind::Bool)
    }

    pub fn string() -> Self {
        Self::of(NodeKind::String(StringKind::String))
    }

    pub fn file() -> Self {
        Self::of(NodeKind::String(StringKind::File))
    }

    pub fn dir() -> Self {
        Self::of(NodeKind::String(StringKind::Dir))
    }

    pub fn group(group: Group) -> Self {
        Self::of(NodeKind::Group(group))
    }

    /// Homogeneous list of `element` nodes.
    pub fn array(element: impl Into<Node>) -> Self {
        Self::of(NodeKind::Array {
            element: Box::new(element.into()),
            inheritance: Inheritance::None,
        })
    }

    /// Homogeneous mapping; keys are matched against `key`, values against `value`.
    pub fn mapping(key: impl Into<Node>, value: impl Into<Node>) -> Self {
        Self::of(NodeKind::Mapping {
            key: Box::new(key.into()),
            value: Box::new(value.into()),
            inheritance: Inheritance::None,
        })
    }

    /// Field holding an instance of the usertype named `type_name`.
    pub fn custom(type_name: impl Into<String>) -> Self {
        Self::of(NodeKind::Custom(type_name.into()))
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn meta(&self) -> &FieldMeta {
        &self.meta
    }

    fn defect(mut self, msg: String) -> Self {
        self.meta.defects.push(msg);
        self
    }

    /// Inclusive lower bound for a numeric node.
    pub fn min(mut self, v: impl Into<Value>) -> Self {
        let v = v.into();
        let ok = match &mut self.kind {
            NodeKind::Int(b) => v.as_i64().map(|x| {
                b.min = x;
                b.mask |= HAS_MIN;
            }),
            NodeKind::UInt(b) => v.as_u64().map(|x| {
                b.min = x;
                b.mask |= HAS_MIN;
            }),
            NodeKind::Float(b) => v.as_f64().map(|x| {
                b.min = x;
                b.mask |= HAS_MIN;
            }),
            _ => None,
        };
        if ok.is_none() {
            let kind = self.kind.name();
            return self.defect(format!("minimum {v:?} does not fit a {kind} field"));
        }
        self
    }

    /// Inclusive upper bound for a numeric node.
    pub fn max(mut self, v: impl Into<Value>) -> Self {
        let v = v.into();
        let ok = match &mut self.kind {
            NodeKind::Int(b) => v.as_i64().map(|x| {
                b.max = x;
                b.mask |= HAS_MAX;
            }),
            NodeKind::UInt(b) => v.as_u64().map(|x| {
                b.max = x;
                b.mask |= HAS_MAX;
            }),
            NodeKind::Float(b) => v.as_f64().map(|x| {
                b.max = x;
                b.mask |= HAS_MAX;
            }),
            _ => None,
        };
        if ok.is_none() {
            let kind = self.kind.name();
            return self.defect(format!("maximum {v:?} does not fit a {kind} field"));
        }
        self
    }

    /// Value the field has when the document does not set it.
    pub fn with_default(mut self, v: impl Into<Value>) -> Self {
        let v = v.into();
        let converted = match &self.kind {
            NodeKind::Int(_) => v.as_i64().map(Value::Int),
            NodeKind::UInt(_) => v.as_u64().map(Value::UInt),
            NodeKind::Float(_) => v.as_f64().map(Value::Float),
            NodeKind::Bool => match &v {
                Value::Bool(b) => Some(Value::Bool(*b)),
                _ => None,
            },
            NodeKind::String(_) => match &v {
                Value::Str(_) | Value::Bytes(_) => Some(v.clone()),
                _ => None,
            },
            _ => None,
        };
        match converted {
            Some(value) => {
                self.meta.default = Some(value);
                self
            }
            None => {
                let kind = self.kind.name();
                self.defect(format!("default {v:?} does not fit a {kind} field"))
            }
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.meta.description = Some(text.into());
        self
    }

    /// Command-line flags that set this field, separated by whitespace (`"-p --port"`).
    pub fn command_line(mut self, flags: &str) -> Self {
        self.meta.command_line = split_flags(flags);
        if !self.kind.is_scalar() {
            let kind = self.kind.name();
            return self.defect(format!("a {kind} field cannot be set from the command line"));
        }
        self
    }

    /// Flags that increment an integer field by one.
    pub fn command_line_incr(mut self, flags: &str) -> Self {
        self.meta.command_line_incr = split_flags(flags);
        self.counter_check("increment")
    }

    /// Flags that decrement an integer field by one.
    pub fn command_line_decr(mut self, flags: &str) -> Self {
        self.meta.command_line_decr = split_flags(flags);
        self.counter_check("decrement")
    }

    fn counter_check(self, what: &str) -> Self {
        if matches!(self.kind, NodeKind::Int(_) | NodeKind::UInt(_)) {
            self
        } else {
            let kind = self.kind.name();
            self.defect(format!("cannot {what} a {kind} field"))
        }
    }

    /// Environment variable that overrides this field.
    pub fn environ(mut self, name: impl Into<String>) -> Self {
        self.meta.environ = Some(name.into());
        if !self.kind.is_scalar() {
            let kind = self.kind.name();
            return self.defect(format!("a {kind} field cannot be set from the environment"));
        }
        self
    }

    /// Inheritance mode of an array or mapping field.
    pub fn inheritance(mut self, mode: Inheritance) -> Self {
        match &mut self.kind {
            NodeKind::Array { inheritance, .. } | NodeKind::Mapping { inheritance, .. } => {
                *inheritance = mode;
                self
            }
            _ => {
                let kind = self.kind.name();
                self.defect(format!("a {kind} field has no inheritance mode"))
            }
        }
    }
}

impl From<Group> for Node {
    fn from(group: Group) -> Self {
        Node::group(group)
    }
}

/// Ordered transition table: `(key, child)` pairs.
#[derive(Clone, Debug, Default)]
pub struct Group {
    fields: Vec<(String, Node)>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. An earlier field of the same name shadows this one.
    pub fn field(mut self, name: impl Into<String>, node: impl Into<Node>) -> Self {
        self.fields.push((name.into(), node.into()));
        self
    }

    pub fn fields(&self) -> &[(String, Node)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Index of the first transition named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.position(name).map(|i| &self.fields[i].1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    fn assign_fill_slots(&mut self, next: &mut usize) {
        for (_, node) in &mut self.fields {
            match &mut node.kind {
                NodeKind::Group(inner) => inner.assign_fill_slots(next),
                _ => {
                    node.meta.fill = Some(*next);
                    *next += 1;
                }
            }
        }
    }
}

/// Hook converting a scalar into the fields of a usertype instance.
pub type ScalarHook = Arc<dyn Fn(&str, &mut FieldWriter<'_>) -> Result<(), String> + Send + Sync>;

/// Tagged-union type: a body group plus the tags selecting its variant.
#[derive(Clone)]
pub struct Usertype {
    name: String,
    body: Group,
    fill_count: usize,
    tags: Vec<(String, i64)>,
    default_tag: Option<i64>,
    scalar_hook: Option<ScalarHook>,
}

impl fmt::Debug for Usertype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Usertype")
            .field("name", &self.name)
            .field("body", &self.body)
            .field("fill_count", &self.fill_count)
            .field("tags", &self.tags)
            .field("default_tag", &self.default_tag)
            .field("scalar_hook", &self.scalar_hook.is_some())
            .finish()
    }
}

impl Usertype {
    /// Declare a usertype. Every leaf reachable from `body` through nested groups gets a fill
    /// slot; the count sizes the per-instance fill bitmap.
    pub fn new(name: impl Into<String>, mut body: Group) -> Self {
        let mut fill_count = 0;
        body.assign_fill_slots(&mut fill_count);
        Self {
            name: name.into(),
            body,
            fill_count,
            tags: Vec::new(),
            default_tag: None,
            scalar_hook: None,
        }
    }

    /// Map the YAML tag `name` (written with or without the leading `!`) to a discriminant.
    /// Several names may map to the same value.
    pub fn with_tag(mut self, name: impl Into<String>, value: i64) -> Self {
        let name = name.into();
        let name = name.strip_prefix('!').map(str::to_owned).unwrap_or(name);
        self.tags.push((name, value));
        self
    }

    /// Discriminant used when a node carries no tag.
    pub fn with_default_tag(mut self, value: i64) -> Self {
        self.default_tag = Some(value);
        self
    }

    /// Allow the usertype to be written as a plain scalar, converted by `hook`.
    pub fn with_scalar_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &mut FieldWriter<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.scalar_hook = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &Group {
        &self.body
    }

    pub fn fill_count(&self) -> usize {
        self.fill_count
    }

    pub fn tags(&self) -> &[(String, i64)] {
        &self.tags
    }

    pub fn default_tag(&self) -> Option<i64> {
        self.default_tag
    }

    pub(crate) fn scalar_hook(&self) -> Option<&ScalarHook> {
        self.scalar_hook.as_ref()
    }

    /// First tag name mapped to `value`.
    pub fn tag_name(&self, value: i64) -> Option<&str> {
        self.tags.iter().find(|(_, v)| *v == value).map(|(n, _)| n.as_str())
    }
}

/// Write access to the fields of a usertype instance, handed to scalar hooks.
pub struct FieldWriter<'a> {
    pub(crate) body: &'a Group,
    pub(crate) fields: &'a mut [Value],
    pub(crate) legacy_octal: bool,
}

impl FieldWriter<'_> {
    /// Convert `raw` as the field `name` would be converted from a document scalar
    /// (units, bounds, boolean literals) and store it.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<(), String> {
        let index = self.index(name)?;
        let node = &self.body.fields[index].1;
        let value = crate::eval::convert_leaf(node, raw, self.legacy_octal)?;
        self.fields[index] = value;
        Ok(())
    }

    /// Store an already typed value. The kind must match the field.
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<(), String> {
        let index = self.index(name)?;
        let node = &self.body.fields[index].1;
        let value = value.into();
        let fits = matches!(
            (&node.kind, &value),
            (NodeKind::Int(_), Value::Int(_))
                | (NodeKind::UInt(_), Value::UInt(_))
                | (NodeKind::Float(_), Value::Float(_))
                | (NodeKind::Bool, Value::Bool(_))
                | (NodeKind::String(_), Value::Str(_) | Value::Bytes(_))
        );
        if !fits {
            return Err(format!("{value:?} does not fit the {} field `{name}`", node.kind.name()));
        }
        self.fields[index] = value;
        Ok(())
    }

    fn index(&self, name: &str) -> Result<usize, String> {
        match self.body.position(name) {
            Some(i) if self.body.fields[i].1.kind.is_scalar() => Ok(i),
            Some(_) => Err(format!("field `{name}` is not a scalar")),
            None => Err(format!("no field `{name}`")),
        }
    }
}

/// Validated schema: root group, usertype table and program metadata.
#[derive(Clone, Debug)]
pub struct Schema {
    root: Group,
    types: Vec<Usertype>,
    by_name: AHashMap<String, usize>,
    program_name: Option<String>,
    description: Option<String>,
    default_config: Option<PathBuf>,
}

impl Schema {
    /// Schema with no usertypes.
    pub fn new(root: Group) -> Result<Self, Error> {
        Self::builder(root).build()
    }

    pub fn builder(root: Group) -> SchemaBuilder {
        SchemaBuilder {
            root,
            types: Vec::new(),
            program_name: None,
            description: None,
            default_config: None,
        }
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn usertypes(&self) -> &[Usertype] {
        &self.types
    }

    /// Index of the usertype named `name` in [`Schema::usertypes`].
    pub fn usertype_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn usertype(&self, index: usize) -> &Usertype {
        &self.types[index]
    }

    pub(crate) fn resolve_custom(&self, name: &str) -> Result<(usize, &Usertype), Error> {
        let index = self
            .usertype_index(name)
            .ok_or_else(|| Error::assertion(format!("unknown usertype `{name}`")))?;
        Ok((index, &self.types[index]))
    }

    pub fn program_name(&self) -> Option<&str> {
        self.program_name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn default_config(&self) -> Option<&std::path::Path> {
        self.default_config.as_deref()
    }
}

/// Collects the root group, usertypes and metadata of a [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    root: Group,
    types: Vec<Usertype>,
    program_name: Option<String>,
    description: Option<String>,
    default_config: Option<PathBuf>,
}

impl SchemaBuilder {
    pub fn usertype(mut self, usertype: Usertype) -> Self {
        self.types.push(usertype);
        self
    }

    pub fn program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = Some(name.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Configuration file loaded when no other file is named on the command line.
    pub fn default_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_config = Some(path.into());
        self
    }

    /// Validate and freeze the schema.
    ///
    /// Returns an assertion error for: setter misuse recorded on a node, inverted bounds, a
    /// reference to an undeclared usertype, two usertypes with one name, and a usertype that
    /// contains itself other than through an array or mapping.
    pub fn build(self) -> Result<Schema, Error> {
        let mut by_name = AHashMap::new();
        for (i, ut) in self.types.iter().enumerate() {
            if by_name.insert(ut.name.clone(), i).is_some() {
                return Err(Error::assertion(format!("usertype `{}` declared twice", ut.name)));
            }
        }
        let schema = Schema {
            root: self.root,
            types: self.types,
            by_name,
            program_name: self.program_name,
            description: self.description,
            default_config: self.default_config,
        };
        check_group(&schema, &schema.root, "")?;
        for ut in &schema.types {
            check_group(&schema, &ut.body, &ut.name)?;
            let mut stack = vec![ut.name.as_str()];
            check_inline_cycle(&schema, &ut.body, &mut stack)?;
        }
        Ok(schema)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

fn check_node(schema: &Schema, node: &Node, path: &str) -> Result<(), Error> {
    if let Some(defect) = node.meta.defects.first() {
        return Err(Error::assertion(format!("schema field `{path}`: {defect}")));
    }
    let inverted = match &node.kind {
        NodeKind::Int(b) => b.inverted(),
        NodeKind::UInt(b) => b.inverted(),
        NodeKind::Float(b) => b.inverted(),
        _ => false,
    };
    if inverted {
        return Err(Error::assertion(format!("schema field `{path}`: minimum is above maximum")));
    }
    match &node.kind {
        NodeKind::Group(group) => check_group(schema, group, path),
        NodeKind::Array { element, .. } => check_node(schema, element, &format!("{path}[]")),
        NodeKind::Mapping { key, value, .. } => {
            if !key.kind.is_scalar() {
                return Err(Error::assertion(format!(
                    "schema field `{path}`: mapping keys must be scalars, not {}",
                    key.kind.name()
                )));
            }
            check_node(schema, key, &format!("{path}{{key}}"))?;
            check_node(schema, value, &format!("{path}{{value}}"))
        }
        NodeKind::Custom(name) => schema.resolve_custom(name).map(|_| ()),
        _ => Ok(()),
    }
}

fn check_group(schema: &Schema, group: &Group, prefix: &str) -> Result<(), Error> {
    for (name, node) in &group.fields {
        check_node(schema, node, &join(prefix, name))?;
    }
    Ok(())
}

/// A usertype embedded directly (not through a list) in itself would need an infinite
/// default instance.
fn check_inline_cycle<'s>(schema: &'s Schema, group: &'s Group, stack: &mut Vec<&'s str>) -> Result<(), Error> {
    for (_, node) in &group.fields {
        match &node.kind {
            NodeKind::Group(inner) => check_inline_cycle(schema, inner, stack)?,
            NodeKind::Custom(name) => {
                if stack.contains(&name.as_str()) {
                    return Err(Error::assertion(format!(
                        "usertype `{name}` contains itself; use an array or mapping to nest it"
                    )));
                }
                let (_, ut) = schema.resolve_custom(name)?;
                stack.push(&ut.name);
                check_inline_cycle(schema, &ut.body, stack)?;
                stack.pop();
            }
            _ => {}
        }
    }
    Ok(())
}
