//! Typed values stored in a loaded configuration.

use std::fmt;

use crate::schema::{Group, Node, NodeKind, Schema};

/// Index of a usertype instance in a [`crate::Config`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserRef(pub(crate) usize);

impl UserRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A field value.
///
/// Groups hold their fields in schema order; arrays and mappings hold their elements in
/// document order (inherited elements follow explicit ones).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Unset string.
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// String read with `!FromFile` that is not valid UTF-8.
    Bytes(Vec<u8>),
    Group(Vec<Value>),
    Array(Vec<Value>),
    Mapping(Vec<(Value, Value)>),
    User(UserRef),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view; unsigned values must fit.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Unsigned view; signed values must not be negative.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String view; bytes qualify when they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<UserRef> {
        match self {
            Value::User(r) => Some(*r),
            _ => None,
        }
    }

    /// Elements of an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Mapping(pairs) => Some(pairs),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Scalars print as their plain text; containers print a short summary.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("~"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => f.write_str(if *v { "yes" } else { "no" }),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Group(fields) => write!(f, "<group of {}>", fields.len()),
            Value::Array(items) => write!(f, "<array of {}>", items.len()),
            Value::Mapping(pairs) => write!(f, "<mapping of {}>", pairs.len()),
            Value::User(r) => write!(f, "<instance {}>", r.0),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident via $conv:expr),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant($conv(v))
                }
            }
        )*
    };
}

value_from! {
    i64 => Int via std::convert::identity,
    i32 => Int via i64::from,
    u64 => UInt via std::convert::identity,
    u32 => UInt via u64::from,
    f64 => Float via std::convert::identity,
    bool => Bool via std::convert::identity,
    String => Str via std::convert::identity,
    Vec<u8> => Bytes via std::convert::identity,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

/// One usertype instance: which usertype, its discriminant and its body fields.
#[derive(Clone, Debug, PartialEq)]
pub struct UserValue {
    pub(crate) usertype: usize,
    pub(crate) tag: Option<i64>,
    pub(crate) fields: Vec<Value>,
}

impl UserValue {
    /// Index into [`Schema::usertypes`].
    pub fn usertype(&self) -> usize {
        self.usertype
    }

    /// Discriminant selected by the node's tag (or the usertype's default tag).
    pub fn tag(&self) -> Option<i64> {
        self.tag
    }

    /// Body fields in schema order.
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }
}

/// Default value of `node`; usertype fields allocate a default instance in `arena`.
pub(crate) fn default_value(schema: &Schema, node: &Node, arena: &mut Vec<UserValue>) -> Value {
    if let Some(v) = node.meta.default.clone() {
        return v;
    }
    match &node.kind {
        NodeKind::Group(group) => Value::Group(default_fields(schema, group, arena)),
        NodeKind::Int(_) => Value::Int(0),
        NodeKind::UInt(_) => Value::UInt(0),
        NodeKind::Float(_) => Value::Float(0.0),
        NodeKind::Bool => Value::Bool(false),
        NodeKind::String(_) => Value::Null,
        NodeKind::Array { .. } => Value::Array(Vec::new()),
        NodeKind::Mapping { .. } => Value::Mapping(Vec::new()),
        NodeKind::Custom(name) => match schema.usertype_index(name) {
            Some(index) => Value::User(new_instance(schema, index, arena)),
            None => Value::Null,
        },
    }
}

/// Default values of every field of `group`, in order.
pub(crate) fn default_fields(schema: &Schema, group: &Group, arena: &mut Vec<UserValue>) -> Vec<Value> {
    group
        .fields()
        .iter()
        .map(|(_, node)| default_value(schema, node, arena))
        .collect()
}

/// Allocate a default-filled instance of usertype `index` carrying its default tag.
pub(crate) fn new_instance(schema: &Schema, index: usize, arena: &mut Vec<UserValue>) -> UserRef {
    let usertype = schema.usertype(index);
    let fields = default_fields(schema, usertype.body(), arena);
    let r = UserRef(arena.len());
    arena.push(UserValue {
        usertype: index,
        tag: usertype.default_tag(),
        fields,
    });
    r
}
