//! The loaded configuration and field addressing.

use std::fmt;

use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::eval::convert_leaf;
use crate::schema::{Group, Node, NodeKind, Schema};
use crate::value::{UserRef, UserValue, Value, default_fields};

/// Address of a field: transition indices through groups and usertype bodies.
///
/// A step into a usertype field continues in the body of the instance stored there.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    steps: Vec<usize>,
    name: String,
}

impl FieldPath {
    /// Resolve a dotted name (`server.limits.conn`) against `schema`.
    pub fn parse(schema: &Schema, dotted: &str) -> Result<Self, Error> {
        let mut group = schema.root();
        let mut steps = Vec::new();
        let mut segments = dotted.split('.').peekable();
        while let Some(segment) = segments.next() {
            let index = group
                .position(segment)
                .ok_or_else(|| Error::value(format!("no field `{dotted}` in the schema")))?;
            steps.push(index);
            if segments.peek().is_none() {
                break;
            }
            group = match &group.fields()[index].1.kind {
                NodeKind::Group(inner) => inner,
                NodeKind::Custom(name) => schema.resolve_custom(name)?.1.body(),
                _ => return Err(Error::value(format!("`{segment}` in `{dotted}` is not a group"))),
            };
        }
        Ok(Self {
            steps,
            name: dotted.to_owned(),
        })
    }

    pub(crate) fn from_steps(steps: Vec<usize>, name: String) -> Self {
        Self { steps, name }
    }

    /// Schema node the path leads to.
    pub fn node<'s>(&self, schema: &'s Schema) -> Option<&'s Node> {
        let mut group = schema.root();
        let (last, init) = self.steps.split_last()?;
        for &step in init {
            group = match &group.fields().get(step)?.1.kind {
                NodeKind::Group(inner) => inner,
                NodeKind::Custom(name) => schema.resolve_custom(name).ok()?.1.body(),
                _ => return None,
            };
        }
        group.fields().get(*last).map(|(_, node)| node)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Owner of a field region: the root record or an arena instance.
#[derive(Clone, Copy)]
enum Owner {
    Root,
    User(usize),
}

/// A loaded configuration: root fields plus the usertype instance arena.
///
/// Borrows the schema it was loaded with; field names and kinds come from there.
#[derive(Clone, Debug)]
pub struct Config<'s> {
    schema: &'s Schema,
    root: Vec<Value>,
    arena: Vec<UserValue>,
    legacy_octal: bool,
}

impl<'s> Config<'s> {
    /// A configuration holding only defaults.
    pub fn defaults(schema: &'s Schema) -> Self {
        let mut arena = Vec::new();
        let root = default_fields(schema, schema.root(), &mut arena);
        Self {
            schema,
            root,
            arena,
            legacy_octal: true,
        }
    }

    pub(crate) fn from_parts(schema: &'s Schema, root: Vec<Value>, arena: Vec<UserValue>, legacy_octal: bool) -> Self {
        Self {
            schema,
            root,
            arena,
            legacy_octal,
        }
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Root fields in schema order.
    pub fn root(&self) -> &[Value] {
        &self.root
    }

    pub fn user(&self, r: UserRef) -> &UserValue {
        &self.arena[r.0]
    }

    /// Usertype name and tag name of an instance.
    pub fn describe_user(&self, r: UserRef) -> (&'s str, Option<&'s str>) {
        let instance = &self.arena[r.0];
        let usertype = self.schema.usertype(instance.usertype);
        let tag = instance.tag.and_then(|t| usertype.tag_name(t));
        (usertype.name(), tag)
    }

    /// Look a value up by dotted path. Numeric segments index arrays; other segments name
    /// group fields, usertype body fields or mapping keys.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        self.lookup_in_group(self.schema.root(), &self.root, &segments)
    }

    fn lookup_in_group<'c>(&'c self, group: &'s Group, fields: &'c [Value], segs: &[&str]) -> Option<&'c Value> {
        let (first, rest) = segs.split_first()?;
        let index = group.position(first)?;
        self.lookup(&group.fields()[index].1, fields.get(index)?, rest)
    }

    fn lookup<'c>(&'c self, node: &'s Node, value: &'c Value, segs: &[&str]) -> Option<&'c Value> {
        let Some(first) = segs.first() else {
            return Some(value);
        };
        match (&node.kind, value) {
            (NodeKind::Group(group), Value::Group(fields)) => self.lookup_in_group(group, fields, segs),
            (NodeKind::Custom(_), Value::User(r)) => {
                let instance = self.arena.get(r.0)?;
                let body = self.schema.usertype(instance.usertype).body();
                self.lookup_in_group(body, &instance.fields, segs)
            }
            (NodeKind::Array { element, .. }, Value::Array(items)) => {
                let index: usize = first.parse().ok()?;
                self.lookup(element, items.get(index)?, &segs[1..])
            }
            (NodeKind::Mapping { value: vnode, .. }, Value::Mapping(pairs)) => {
                let (_, v) = pairs.iter().find(|(k, _)| k.to_string() == *first)?;
                self.lookup(vnode, v, &segs[1..])
            }
            _ => None,
        }
    }

    pub fn get_int(&self, path: &str) -> Option<i64> {
        self.get(path)?.as_i64()
    }

    pub fn get_uint(&self, path: &str) -> Option<u64> {
        self.get(path)?.as_u64()
    }

    pub fn get_float(&self, path: &str) -> Option<f64> {
        self.get(path)?.as_f64()
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path)?.as_bool()
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path)?.as_str()
    }

    /// Walk `path` to the region holding its last field.
    fn locate(&self, path: &FieldPath) -> Result<(Owner, Vec<usize>, &'s Node), Error> {
        let missing = || Error::assertion(format!("field path `{path}` does not match the schema"));
        let mut group = self.schema.root();
        let mut owner = Owner::Root;
        let mut trail = Vec::new();
        let (last, init) = path.steps.split_last().ok_or_else(missing)?;
        for &step in init {
            let node = &group.fields().get(step).ok_or_else(missing)?.1;
            trail.push(step);
            group = match &node.kind {
                NodeKind::Group(inner) => inner,
                NodeKind::Custom(_) => {
                    let Some(Value::User(r)) = self.slot(owner, &trail) else {
                        return Err(missing());
                    };
                    owner = Owner::User(r.0);
                    trail.clear();
                    self.schema.usertype(self.arena[r.0].usertype).body()
                }
                _ => return Err(missing()),
            };
        }
        let node = &group.fields().get(*last).ok_or_else(missing)?.1;
        trail.push(*last);
        Ok((owner, trail, node))
    }

    fn slot(&self, owner: Owner, trail: &[usize]) -> Option<&Value> {
        let mut fields: &[Value] = match owner {
            Owner::Root => &self.root,
            Owner::User(i) => &self.arena.get(i)?.fields,
        };
        let (last, init) = trail.split_last()?;
        for &step in init {
            fields = match fields.get(step)? {
                Value::Group(inner) => inner,
                _ => return None,
            };
        }
        fields.get(*last)
    }

    fn slot_mut(&mut self, owner: Owner, trail: &[usize]) -> Option<&mut Value> {
        let mut fields: &mut [Value] = match owner {
            Owner::Root => &mut self.root,
            Owner::User(i) => &mut self.arena.get_mut(i)?.fields,
        };
        let (last, init) = trail.split_last()?;
        for &step in init {
            fields = match fields.get_mut(step)? {
                Value::Group(inner) => inner,
                _ => return None,
            };
        }
        fields.get_mut(*last)
    }

    /// Set a scalar field from text, converted like a document scalar (units, bounds,
    /// boolean literals). No variable substitution happens.
    pub fn set_path(&mut self, path: &FieldPath, raw: &str) -> Result<(), Error> {
        let (owner, trail, node) = self.locate(path)?;
        let value = convert_leaf(node, raw, self.legacy_octal).map_err(|msg| Error::value(format!("{path}: {msg}")))?;
        let slot = self
            .slot_mut(owner, &trail)
            .ok_or_else(|| Error::assertion(format!("field `{path}` has no storage")))?;
        *slot = value;
        Ok(())
    }

    /// [`Config::set_path`] with a dotted name.
    pub fn set_from_str(&mut self, path: &str, raw: &str) -> Result<(), Error> {
        let path = FieldPath::parse(self.schema, path)?;
        self.set_path(&path, raw)
    }

    /// Add `delta` to an integer field, respecting its bounds.
    pub fn add_path(&mut self, path: &FieldPath, delta: i64) -> Result<(), Error> {
        let (owner, trail, node) = self.locate(path)?;
        let current = self
            .slot(owner, &trail)
            .cloned()
            .ok_or_else(|| Error::assertion(format!("field `{path}` has no storage")))?;
        let out_of_range = || Error::value(format!("{path}: counter out of range"));
        let value = match (&node.kind, current) {
            (NodeKind::Int(bounds), Value::Int(v)) => {
                let v = v.checked_add(delta).ok_or_else(out_of_range)?;
                bounds.check(v).map_err(|m| Error::value(format!("{path}: {m}")))?;
                Value::Int(v)
            }
            (NodeKind::UInt(bounds), Value::UInt(v)) => {
                let v = v.checked_add_signed(delta).ok_or_else(out_of_range)?;
                bounds.check(v).map_err(|m| Error::value(format!("{path}: {m}")))?;
                Value::UInt(v)
            }
            (kind, _) => {
                return Err(Error::value(format!("{path}: cannot count a {} field", kind.name())));
            }
        };
        if let Some(slot) = self.slot_mut(owner, &trail) {
            *slot = value;
        }
        Ok(())
    }

    pub fn increment(&mut self, path: &str) -> Result<(), Error> {
        let path = FieldPath::parse(self.schema, path)?;
        self.add_path(&path, 1)
    }

    pub fn decrement(&mut self, path: &str) -> Result<(), Error> {
        let path = FieldPath::parse(self.schema, path)?;
        self.add_path(&path, -1)
    }

    /// Extract the configuration into a serde type.
    ///
    /// Groups and usertype bodies deserialize as maps keyed by field name; a usertype with
    /// tags deserializes into an externally tagged enum named by its tag.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, Error> {
        T::deserialize(crate::de::GroupDeserializer::new(self, self.schema.root(), &self.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Usertype;

    fn schema() -> Schema {
        Schema::builder(
            Group::new()
                .field("port", Node::uint().max(65535).with_default(80))
                .field("verbose", Node::int().min(0).max(2))
                .field("net", Group::new().field("host", Node::string().with_default("localhost")))
                .field("main", Node::custom("section"))
                .field("tags", Node::array(Node::string())),
        )
        .usertype(Usertype::new("section", Group::new().field("workers", Node::int().with_default(4))))
        .build()
        .unwrap()
    }

    #[test]
    fn defaults_are_addressable() {
        let s = schema();
        let config = Config::defaults(&s);
        assert_eq!(config.get_uint("port"), Some(80));
        assert_eq!(config.get_str("net.host"), Some("localhost"));
        assert_eq!(config.get_int("main.workers"), Some(4));
        assert_eq!(config.get("tags").and_then(Value::as_array).map(<[Value]>::len), Some(0));
        assert!(config.get("net.nothing").is_none());
    }

    #[test]
    fn set_from_str_converts_and_checks() {
        let s = schema();
        let mut config = Config::defaults(&s);
        config.set_from_str("port", "0x50").unwrap();
        assert_eq!(config.get_uint("port"), Some(80));
        config.set_from_str("main.workers", "2k").unwrap();
        assert_eq!(config.get_int("main.workers"), Some(2000));
        let err = config.set_from_str("port", "70k").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Value);
        assert!(config.set_from_str("nothing", "1").is_err());
        assert!(config.set_from_str("net", "1").is_err());
    }

    #[test]
    fn counters_respect_bounds() {
        let s = schema();
        let mut config = Config::defaults(&s);
        config.increment("verbose").unwrap();
        config.increment("verbose").unwrap();
        assert_eq!(config.get_int("verbose"), Some(2));
        assert!(config.increment("verbose").is_err());
        config.decrement("verbose").unwrap();
        assert_eq!(config.get_int("verbose"), Some(1));
        assert!(config.increment("net.host").is_err());
    }

    #[test]
    fn field_path_resolves_nodes() {
        let s = schema();
        let path = FieldPath::parse(&s, "main.workers").unwrap();
        assert_eq!(path.node(&s).map(|n| n.kind().name()), Some("int"));
        assert_eq!(path.to_string(), "main.workers");
        assert!(FieldPath::parse(&s, "port.x").is_err());
    }
}
