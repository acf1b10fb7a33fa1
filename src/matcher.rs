//! Schema-driven recursive-descent matcher.
//!
//! One entry function per node kind. Each expects the cursor to sit on the first event of the
//! node's value and leaves it on the first event after the value. Values are written into
//! locally owned field vectors; usertype bodies are taken out of the arena while they are
//! matched and put back afterwards, so nested instances can be allocated meanwhile.
//!
//! Fill marks go to the innermost open [`MarksRecord`]. Only fields of a usertype body (and of
//! groups nested in it) carry a fill slot, so root-level fields are never marked.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{debug, trace};

use crate::cursor::Cursor;
use crate::dispatch::resolve_tag;
use crate::error::Error;
use crate::eval::{convert_leaf, substitute};
use crate::events::{Ev, Events};
use crate::location::Location;
use crate::options::Options;
use crate::schema::{FieldWriter, Group, Inheritance, Node, NodeKind, Schema};
use crate::sources::{SourceMap, read_bytes, resolve_relative};
use crate::tags::{TAG_APPEND, TAG_BINARY, TAG_FROM_FILE, TAG_RAW, TAG_REPLACE, is_core_tag};
use crate::value::{UserRef, UserValue, Value, default_fields, default_value, new_instance};
use crate::vars::Variables;

/// Per-instance bookkeeping of explicitly set fields.
#[derive(Clone, Debug)]
pub(crate) struct MarksRecord {
    /// Index of the usertype in the schema.
    pub(crate) usertype: usize,
    pub(crate) instance: UserRef,
    /// Record that was innermost when this one was opened.
    pub(crate) parent: Option<usize>,
    /// One entry per fill slot of the usertype.
    pub(crate) filled: Vec<bool>,
}

/// Everything a successful match produces.
#[derive(Debug)]
pub(crate) struct Matched {
    pub(crate) root: Vec<Value>,
    pub(crate) arena: Vec<UserValue>,
    pub(crate) marks: Vec<MarksRecord>,
    /// Indices into `marks`, in the order records were closed.
    pub(crate) finalized: Vec<usize>,
}

pub(crate) struct Matcher<'a> {
    schema: &'a Schema,
    options: &'a Options,
    vars: &'a Variables,
    cursor: Cursor,
    arena: Vec<UserValue>,
    marks: Vec<MarksRecord>,
    active: Vec<usize>,
    finalized: Vec<usize>,
}

impl<'a> Matcher<'a> {
    pub(crate) fn new(schema: &'a Schema, options: &'a Options, vars: &'a Variables, cursor: Cursor) -> Self {
        Self {
            schema,
            options,
            vars,
            cursor,
            arena: Vec::new(),
            marks: Vec::new(),
            active: Vec::new(),
            finalized: Vec::new(),
        }
    }

    /// Every file read so far, for error rendering.
    pub(crate) fn sources(&self) -> &SourceMap {
        self.cursor.sources()
    }

    pub(crate) fn last_location(&self) -> Location {
        self.cursor.last_location()
    }

    /// Match the whole document against the schema root.
    ///
    /// An empty document, or a root that is a null-like scalar, gives the defaults.
    pub(crate) fn run(&mut self) -> Result<Matched, Error> {
        let schema = self.schema;
        let mut root = default_fields(schema, schema.root(), &mut self.arena);
        let null_root = match self.cursor.peek()? {
            None => None,
            Some(ev) => Some(ev.is_null_like()),
        };
        match null_root {
            None => debug!("empty document, using defaults"),
            Some(true) => {
                self.cursor.next()?;
            }
            Some(false) => self.match_group(schema.root(), &mut root)?,
        }
        if let Some(ev) = self.cursor.next()? {
            return Err(Error::syntax(format!("unexpected {} after the root node", ev.describe()))
                .with_location(ev.location()));
        }
        Ok(Matched {
            root,
            arena: std::mem::take(&mut self.arena),
            marks: std::mem::take(&mut self.marks),
            finalized: std::mem::take(&mut self.finalized),
        })
    }

    fn next_event(&mut self) -> Result<Ev, Error> {
        match self.cursor.next()? {
            Some(ev) => Ok(ev),
            None => Err(Error::eof().with_location(self.cursor.last_location())),
        }
    }

    /// Consume a null-like scalar if one is next.
    fn skip_null(&mut self) -> Result<bool, Error> {
        if matches!(self.cursor.peek()?, Some(ev) if ev.is_null_like()) {
            self.cursor.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn mark(&mut self, node: &Node) {
        if let (Some(slot), Some(&record)) = (node.meta.fill, self.active.last()) {
            if let Some(flag) = self.marks[record].filled.get_mut(slot) {
                *flag = true;
            }
        }
    }

    /// Match one node into `slot`.
    ///
    /// Returns whether the field counts as explicitly set for inheritance.
    fn match_node(&mut self, node: &'a Node, slot: &mut Value) -> Result<bool, Error> {
        match &node.kind {
            NodeKind::Group(group) => {
                if self.skip_null()? {
                    return Ok(false);
                }
                let Value::Group(fields) = slot else {
                    return Err(Error::assertion("group field holds a non-group value")
                        .with_location(self.cursor.last_location()));
                };
                self.match_group(group, fields)?;
                Ok(false)
            }
            NodeKind::Int(_) | NodeKind::UInt(_) | NodeKind::Float(_) | NodeKind::Bool | NodeKind::String(_) => {
                self.match_scalar(node, slot)
            }
            NodeKind::Array { element, inheritance } => self.match_array(element, *inheritance, slot),
            NodeKind::Mapping { key, value, inheritance } => self.match_mapping(key, value, *inheritance, slot),
            NodeKind::Custom(name) => self.match_custom(name, slot),
        }
    }

    /// Match a mapping against the transitions of `group`.
    fn match_group(&mut self, group: &'a Group, fields: &mut [Value]) -> Result<(), Error> {
        let start = self.next_event()?;
        if !matches!(start, Ev::MapStart { .. }) {
            return Err(Error::unexpected("mapping").with_location(start.location()));
        }
        // `=` and `value` name the same field, so the key layer cannot see that duplicate.
        let mut seen = vec![false; group.len()];
        loop {
            let ev = self.next_event()?;
            let (key, location) = match ev {
                Ev::MapEnd { .. } => return Ok(()),
                Ev::Scalar { value, location, .. } => (value, location),
                other => {
                    return Err(Error::syntax(format!("mapping key must be a scalar, found {}", other.describe()))
                        .with_location(other.location()));
                }
            };
            let key = if key == "=" { "value".to_owned() } else { key };
            if key.starts_with('_') {
                trace!(key = %key, "skipping private key");
                self.cursor.skip_node()?;
                continue;
            }
            let Some(index) = group.position(&key) else {
                return Err(self.unknown_key(group, &key).with_location(location));
            };
            if std::mem::replace(&mut seen[index], true) {
                trace!(key = %key, line = location.line(), "dropping duplicate key");
                self.cursor.skip_node()?;
                continue;
            }
            trace!(key = %key, line = location.line(), "matched key");
            let node = &group.fields()[index].1;
            if self.match_node(node, &mut fields[index])? {
                self.mark(node);
            }
        }
    }

    fn unknown_key(&self, group: &Group, key: &str) -> Error {
        if self.options.debug {
            let expected = group.names().collect::<Vec<_>>().join(", ");
            debug!(key, expected = %expected, "unknown key");
            Error::syntax(format!("unknown key `{key}`, expected one of: {expected}"))
        } else {
            Error::syntax(format!("unknown key `{key}`"))
        }
    }

    fn match_scalar(&mut self, node: &'a Node, slot: &mut Value) -> Result<bool, Error> {
        let ev = self.next_event()?;
        let null_like = ev.is_null_like();
        let at = ev.location();
        let Ev::Scalar { value, tag, location, .. } = ev else {
            return Err(Error::unexpected("scalar").with_location(at));
        };
        let is_string = matches!(node.kind, NodeKind::String(_));
        // Plain null-likes unset the field; quoted ones are text.
        if is_string && null_like {
            *slot = Value::Null;
            return Ok(true);
        }
        let text = match tag.as_deref() {
            None => self.expand(&value, location)?,
            Some(t) if is_core_tag(Some(t)) => self.expand(&value, location)?,
            Some(TAG_RAW) => value,
            Some(TAG_FROM_FILE) if is_string => {
                let path = resolve_relative(self.cursor.dir_of(location.source()), &value);
                debug!(file = %path.display(), "reading field value from file");
                let bytes = read_bytes(&path, self.options.max_file_size).map_err(|e| e.or_location(location))?;
                *slot = bytes_value(bytes);
                return Ok(true);
            }
            Some(TAG_BINARY) if is_string => {
                let cleaned: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                let bytes = B64
                    .decode(cleaned.as_bytes())
                    .map_err(|e| Error::value(format!("invalid !!binary value: {e}")).with_location(location))?;
                *slot = bytes_value(bytes);
                return Ok(true);
            }
            Some(t) => {
                return Err(Error::syntax(format!("tag `{t}` is not allowed on a {} field", node.kind.name()))
                    .with_location(location));
            }
        };
        *slot = convert_leaf(node, &text, self.options.legacy_octal_numbers)
            .map_err(|msg| Error::value(msg).with_location(location))?;
        Ok(true)
    }

    /// Run variable substitution over scalar text.
    fn expand(&self, text: &str, location: Location) -> Result<String, Error> {
        if !self.options.expand_vars {
            return Ok(text.to_owned());
        }
        let vars = self.vars;
        let cursor = &self.cursor;
        let lookup = |name: &str| -> Result<Option<String>, Error> {
            if let Some(v) = vars.get_string(name) {
                return Ok(Some(v));
            }
            cursor.scalar_anchor(name)
        };
        substitute(text, &lookup).map_err(|e| e.or_location(location))
    }

    /// Inheritance tag of a list node: `Some(true)` for `!Replace`, `Some(false)` for `!Append`.
    fn list_tag(tag: Option<&str>, location: Location) -> Result<Option<bool>, Error> {
        match tag {
            None => Ok(None),
            Some(TAG_REPLACE) => Ok(Some(true)),
            Some(TAG_APPEND) => Ok(Some(false)),
            Some(t) if is_core_tag(Some(t)) => Ok(None),
            Some(t) => Err(Error::syntax(format!("tag `{t}` is not allowed on a list")).with_location(location)),
        }
    }

    fn list_filled(inheritance: Inheritance, replace: Option<bool>) -> bool {
        match inheritance {
            Inheritance::None => true,
            Inheritance::AppendToDefault => replace == Some(true),
            Inheritance::ReplaceDefault => replace != Some(false),
        }
    }

    fn match_array(&mut self, element: &'a Node, inheritance: Inheritance, slot: &mut Value) -> Result<bool, Error> {
        if self.skip_null()? {
            return Ok(false);
        }
        let start = self.next_event()?;
        let at = start.location();
        let Ev::SeqStart { tag, location } = start else {
            return Err(Error::unexpected("sequence").with_location(at));
        };
        let replace = Self::list_tag(tag.as_deref(), location)?;
        let Value::Array(items) = slot else {
            return Err(Error::assertion("array field holds a non-array value").with_location(location));
        };
        self.match_items(element, items)?;
        Ok(Self::list_filled(inheritance, replace))
    }

    fn match_mapping(
        &mut self,
        key: &'a Node,
        value: &'a Node,
        inheritance: Inheritance,
        slot: &mut Value,
    ) -> Result<bool, Error> {
        if self.skip_null()? {
            return Ok(false);
        }
        let start = self.next_event()?;
        let at = start.location();
        let Ev::MapStart { tag, location } = start else {
            return Err(Error::unexpected("mapping").with_location(at));
        };
        let replace = Self::list_tag(tag.as_deref(), location)?;
        let Value::Mapping(pairs) = slot else {
            return Err(Error::assertion("mapping field holds a non-mapping value").with_location(location));
        };
        loop {
            if let Some(Ev::MapEnd { .. }) = self.cursor.peek()? {
                self.cursor.next()?;
                break;
            }
            let mut k = default_value(self.schema, key, &mut self.arena);
            self.match_node(key, &mut k)?;
            let mut v = default_value(self.schema, value, &mut self.arena);
            self.match_node(value, &mut v)?;
            pairs.push((k, v));
        }
        Ok(Self::list_filled(inheritance, replace))
    }

    /// Instance behind `slot`, allocating one if the slot does not hold an instance yet.
    fn instance_for(&mut self, index: usize, slot: &mut Value) -> UserRef {
        match slot {
            Value::User(r) if self.arena[r.0].usertype == index => *r,
            _ => {
                let r = new_instance(self.schema, index, &mut self.arena);
                *slot = Value::User(r);
                r
            }
        }
    }

    fn match_custom(&mut self, name: &str, slot: &mut Value) -> Result<bool, Error> {
        let schema = self.schema;
        let location = self.cursor.last_location();
        let (index, usertype) = schema.resolve_custom(name).map_err(|e| e.or_location(location))?;
        let (tag, location, shape) = match self.cursor.peek()? {
            None => return Err(Error::eof().with_location(location)),
            Some(ev) => (ev.tag().map(str::to_owned), ev.location(), ev.clone()),
        };
        let null_like = shape.is_null_like();
        match shape {
            Ev::Scalar { value, .. } => {
                let Some(hook) = usertype.scalar_hook() else {
                    if null_like {
                        self.cursor.next()?;
                        return Ok(false);
                    }
                    return Err(Error::syntax(format!("`{}` cannot be written as a scalar", usertype.name()))
                        .with_location(location));
                };
                self.cursor.next()?;
                let discriminant = resolve_tag(usertype, tag.as_deref()).map_err(|e| e.with_location(location))?;
                let r = self.instance_for(index, slot);
                let mut fields = std::mem::take(&mut self.arena[r.0].fields);
                let mut writer = FieldWriter {
                    body: usertype.body(),
                    fields: &mut fields,
                    legacy_octal: self.options.legacy_octal_numbers,
                };
                let result = (hook.as_ref())(&value, &mut writer);
                self.arena[r.0].fields = fields;
                self.arena[r.0].tag = discriminant;
                result.map_err(|msg| Error::value(msg).with_location(location))?;
                Ok(true)
            }
            Ev::SeqStart { .. } => {
                let discriminant = resolve_tag(usertype, tag.as_deref()).map_err(|e| e.with_location(location))?;
                let position = usertype.body().position("value");
                let Some((i, element, inheritance)) = position.and_then(|i| match &usertype.body().fields()[i].1.kind {
                    NodeKind::Array { element, inheritance } => Some((i, element, *inheritance)),
                    _ => None,
                }) else {
                    return Err(Error::syntax(format!(
                        "`{}` cannot be written as a sequence: it has no `value` array",
                        usertype.name()
                    ))
                    .with_location(location));
                };
                let r = self.instance_for(index, slot);
                self.arena[r.0].tag = discriminant;
                // The sequence may carry the usertype's tag; the array matcher must not see it.
                let mut fields = std::mem::take(&mut self.arena[r.0].fields);
                let result = self.match_untagged_array(element, inheritance, &mut fields[i]);
                self.arena[r.0].fields = fields;
                result?;
                Ok(true)
            }
            Ev::MapStart { .. } => {
                let discriminant = resolve_tag(usertype, tag.as_deref()).map_err(|e| e.with_location(location))?;
                let r = self.instance_for(index, slot);
                self.arena[r.0].tag = discriminant;
                let record = self.marks.len();
                self.marks.push(MarksRecord {
                    usertype: index,
                    instance: r,
                    parent: self.active.last().copied(),
                    filled: vec![false; usertype.fill_count()],
                });
                self.active.push(record);
                let mut fields = std::mem::take(&mut self.arena[r.0].fields);
                let result = self.match_group(usertype.body(), &mut fields);
                self.arena[r.0].fields = fields;
                result?;
                self.active.pop();
                self.finalized.push(record);
                Ok(true)
            }
            other => Err(Error::unexpected("mapping, sequence or scalar").with_location(other.location())),
        }
    }

    /// Sequence form of a usertype: the tag selects the variant, the items fill `value`.
    fn match_untagged_array(&mut self, element: &'a Node, inheritance: Inheritance, slot: &mut Value) -> Result<bool, Error> {
        let start = self.next_event()?;
        if !matches!(start, Ev::SeqStart { .. }) {
            return Err(Error::unexpected("sequence").with_location(start.location()));
        }
        let Value::Array(items) = slot else {
            return Err(Error::assertion("array field holds a non-array value").with_location(start.location()));
        };
        self.match_items(element, items)?;
        Ok(Self::list_filled(inheritance, None))
    }

    /// Sequence items up to and including the closing event.
    fn match_items(&mut self, element: &'a Node, items: &mut Vec<Value>) -> Result<(), Error> {
        loop {
            if let Some(Ev::SeqEnd { .. }) = self.cursor.peek()? {
                self.cursor.next()?;
                return Ok(());
            }
            let mut item = default_value(self.schema, element, &mut self.arena);
            self.match_node(element, &mut item)?;
            items.push(item);
        }
    }
}

/// Text when the bytes are UTF-8, raw bytes otherwise.
fn bytes_value(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(text) => Value::Str(text),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::schema::Usertype;

    fn run(schema: &Schema, text: &str) -> Result<Matched, Error> {
        let options = Options::default();
        let vars = Variables::new();
        let cursor = Cursor::open(text.to_owned(), None, PathBuf::from("."), &options);
        Matcher::new(schema, &options, &vars, cursor).run()
    }

    fn server_schema() -> Schema {
        Schema::builder(
            Group::new()
                .field("name", Node::string())
                .field("servers", Node::array(Node::custom("server"))),
        )
        .usertype(Usertype::new(
            "server",
            Group::new()
                .field("host", Node::string())
                .field("port", Node::int())
                .field("limits", Group::new().field("conn", Node::int())),
        ))
        .build()
        .unwrap()
    }

    #[test]
    fn marks_record_explicit_fields() {
        let schema = server_schema();
        let m = run(&schema, "servers:\n  - host: a\n    limits: {conn: 3}\n").unwrap();
        assert_eq!(m.marks.len(), 1);
        assert_eq!(m.marks[0].filled, vec![true, false, true]);
        assert_eq!(m.marks[0].parent, None);
        assert_eq!(m.finalized, vec![0]);
    }

    #[test]
    fn private_keys_and_equals_key() {
        let schema = Schema::builder(Group::new().field("x", Node::custom("wrap")))
            .usertype(Usertype::new("wrap", Group::new().field("value", Node::int())))
            .build()
            .unwrap();
        let m = run(&schema, "_tmpl: &t {a: 1}\nx:\n  =: 5\n").unwrap();
        let Value::User(r) = m.root[0] else { panic!("expected instance") };
        assert_eq!(m.arena[r.0].fields, vec![Value::Int(5)]);
    }

    #[test]
    fn equals_and_value_keys_keep_the_first() {
        let schema = Schema::builder(Group::new().field("x", Node::custom("wrap")))
            .usertype(Usertype::new("wrap", Group::new().field("value", Node::int())))
            .build()
            .unwrap();
        let m = run(&schema, "x:\n  =: 5\n  value: 6\n").unwrap();
        let Value::User(r) = m.root[0] else { panic!("expected instance") };
        assert_eq!(m.arena[r.0].fields, vec![Value::Int(5)]);

        let m = run(&schema, "x:\n  value: 7\n  =: 8\n").unwrap();
        let Value::User(r) = m.root[0] else { panic!("expected instance") };
        assert_eq!(m.arena[r.0].fields, vec![Value::Int(7)]);
    }

    #[test]
    fn unknown_key_is_syntax_error() {
        let schema = server_schema();
        let err = run(&schema, "nmae: x\n").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Syntax);
        assert_eq!(err.location().map(|l| l.line()), Some(1));
    }

    #[test]
    fn scalar_where_mapping_expected() {
        let schema = server_schema();
        let err = run(&schema, "servers: [5]\n").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Syntax);
    }

    #[test]
    fn trailing_content_is_rejected_by_the_parser() {
        let schema = server_schema();
        assert!(run(&schema, "name: a\n---\nname: b\n").is_err());
    }

    #[test]
    fn null_group_keeps_defaults() {
        let schema = Schema::new(Group::new().field("g", Group::new().field("n", Node::int().with_default(4)))).unwrap();
        let m = run(&schema, "g:\n").unwrap();
        assert_eq!(m.root[0], Value::Group(vec![Value::Int(4)]));
    }
}
