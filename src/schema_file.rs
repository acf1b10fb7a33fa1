//! Schema descriptions written in YAML.
//!
//! ```yaml
//! __meta__:
//!   program_name: server
//!   description: Example server
//!   default_config: /etc/server.yaml
//! __types__:
//!   listen:
//!     __tags__: {Tcp: 1, Unix: 2}
//!     __default_tag__: Tcp
//!     port: !UInt { default: 80, max: 65535 }
//! port: !UInt { default: 8080, command-line: -p --port, environ: SERVER_PORT }
//! log:
//!   level: !Int 1
//!   file: !File
//! listen: !Array { element: !Struct listen }
//! ```
//!
//! Untagged mappings are groups. A tagged scalar gives the default (or, for `!Struct`, the
//! usertype name); a tagged mapping lists attributes.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cursor::Cursor;
use crate::error::Error;
use crate::eval::convert_leaf;
use crate::events::{Ev, Events};
use crate::location::Location;
use crate::options::Options;
use crate::parse_scalars::{is_null_like, parse_float, parse_int, parse_uint};
use crate::schema::{Group, Inheritance, Node, NodeKind, Schema, Usertype};
use crate::sources::{parent_dir, read_text};
use crate::tags::is_core_tag;

/// Generic document tree read from a schema description.
enum Desc {
    Scalar {
        value: String,
        tag: Option<String>,
        location: Location,
    },
    Seq {
        location: Location,
    },
    Map {
        entries: Vec<(String, Location, Desc)>,
        tag: Option<String>,
        location: Location,
    },
}

impl Desc {
    fn location(&self) -> Location {
        match self {
            Desc::Scalar { location, .. } | Desc::Seq { location } | Desc::Map { location, .. } => *location,
        }
    }

    fn tag(&self) -> Option<&str> {
        match self {
            Desc::Scalar { tag, .. } | Desc::Map { tag, .. } => tag.as_deref().filter(|t| !is_core_tag(Some(t))),
            Desc::Seq { .. } => None,
        }
    }

    fn scalar(&self, what: &str) -> Result<&str, Error> {
        match self {
            Desc::Scalar { value, .. } => Ok(value),
            other => Err(Error::syntax(format!("{what} must be a scalar")).with_location(other.location())),
        }
    }

    fn entries(&self, what: &str) -> Result<&[(String, Location, Desc)], Error> {
        match self {
            Desc::Map { entries, .. } => Ok(entries),
            Desc::Scalar { value, .. } if is_null_like(value) => Ok(&[]),
            other => Err(Error::syntax(format!("{what} must be a mapping")).with_location(other.location())),
        }
    }
}

/// Build a [`Schema`] from description text. `!Include` names resolve against the current
/// directory.
pub fn load_schema(text: &str) -> Result<Schema, Error> {
    parse(text.to_owned(), None, PathBuf::from("."))
}

/// Read and build a schema description file.
pub fn load_schema_file(path: impl AsRef<Path>) -> Result<Schema, Error> {
    let path = path.as_ref();
    let text = read_text(path, None)?;
    parse(text, Some(path.to_path_buf()), parent_dir(path))
}

fn parse(text: String, path: Option<PathBuf>, dir: PathBuf) -> Result<Schema, Error> {
    let options = Options::default();
    let mut cursor = Cursor::open(text, path, dir, &options);
    let result = read_tree(&mut cursor).and_then(|tree| build(&tree));
    result.map_err(|e| {
        let last = cursor.last_location();
        e.or_location(last).with_sources(cursor.sources(), options.crop_radius)
    })
}

fn read_tree(cursor: &mut Cursor) -> Result<Desc, Error> {
    let Some(tree) = read_node(cursor)? else {
        return Err(Error::syntax("empty schema description"));
    };
    if let Some(ev) = cursor.next()? {
        return Err(Error::syntax(format!("unexpected {} after the schema", ev.describe())).with_location(ev.location()));
    }
    Ok(tree)
}

fn read_node(cursor: &mut Cursor) -> Result<Option<Desc>, Error> {
    if let Some(Ev::SeqStart { location, .. }) = cursor.peek()? {
        let location = *location;
        cursor.skip_node()?;
        return Ok(Some(Desc::Seq { location }));
    }
    let Some(ev) = cursor.next()? else {
        return Ok(None);
    };
    let node = match ev {
        Ev::Scalar { value, tag, location, .. } => Desc::Scalar { value, tag, location },
        Ev::MapStart { tag, location } => {
            let mut entries = Vec::new();
            loop {
                match cursor.next()? {
                    Some(Ev::MapEnd { .. }) => break,
                    Some(Ev::Scalar { value, location, .. }) => {
                        let child = read_node(cursor)?.ok_or_else(|| Error::eof().with_location(location))?;
                        entries.push((value, location, child));
                    }
                    Some(other) => {
                        return Err(Error::syntax("schema keys must be scalars").with_location(other.location()));
                    }
                    None => return Err(Error::eof().with_location(location)),
                }
            }
            Desc::Map { entries, tag, location }
        }
        other => {
            return Err(Error::syntax(format!("unexpected {}", other.describe())).with_location(other.location()));
        }
    };
    Ok(Some(node))
}

fn build(tree: &Desc) -> Result<Schema, Error> {
    let mut root = Group::new();
    let mut usertypes = Vec::new();
    let mut meta: Vec<(&str, String)> = Vec::new();
    for (key, location, desc) in tree.entries("the schema root")? {
        match key.as_str() {
            "__meta__" => {
                for (name, at, value) in desc.entries("__meta__")? {
                    match name.as_str() {
                        "program_name" | "description" | "default_config" => {
                            meta.push((name.as_str(), value.scalar(name)?.to_owned()));
                        }
                        other => {
                            return Err(Error::syntax(format!("unknown __meta__ key `{other}`")).with_location(*at));
                        }
                    }
                }
            }
            "__types__" => {
                for (name, _, body) in desc.entries("__types__")? {
                    usertypes.push(usertype(name, body)?);
                }
            }
            // Private keys hold anchors for merges.
            private if private.starts_with('_') => {}
            _ => root = root.field(key.as_str(), field(desc).map_err(|e| e.or_location(*location))?),
        }
    }
    let mut builder = Schema::builder(root);
    for ut in usertypes {
        builder = builder.usertype(ut);
    }
    for (name, value) in meta {
        builder = match name {
            "program_name" => builder.program_name(value),
            "description" => builder.description(value),
            _ => builder.default_config(value),
        };
    }
    debug!("schema description loaded");
    builder.build()
}

fn usertype(name: &str, desc: &Desc) -> Result<Usertype, Error> {
    let mut body = Group::new();
    let mut tags = Vec::new();
    let mut default_tag = None;
    for (key, at, value) in desc.entries("a usertype")? {
        match key.as_str() {
            "__tags__" => {
                for (tag, at, v) in value.entries("__tags__")? {
                    let n = parse_int(v.scalar("a tag value")?, false).map_err(|m| Error::value(m).with_location(*at))?;
                    tags.push((tag.clone(), n));
                }
            }
            "__default_tag__" => default_tag = Some((value.scalar("__default_tag__")?.to_owned(), *at)),
            _ => body = body.field(key.as_str(), field(value)?),
        }
    }
    let mut ut = Usertype::new(name, body);
    for (tag, n) in tags {
        ut = ut.with_tag(tag, n);
    }
    if let Some((written, at)) = default_tag {
        let bare = written.strip_prefix('!').unwrap_or(&written);
        let value = match ut.tags().iter().find(|(n, _)| n == bare) {
            Some((_, v)) => *v,
            None => parse_int(bare, false)
                .map_err(|_| Error::syntax(format!("`{written}` is not a tag of `{name}`")).with_location(at))?,
        };
        ut = ut.with_default_tag(value);
    }
    Ok(ut)
}

/// Node of a kind tag, before attributes.
fn blank(tag: &str, location: Location) -> Result<Node, Error> {
    Ok(match tag {
        "!Int" => Node::int(),
        "!UInt" => Node::uint(),
        "!Float" => Node::float(),
        "!Bool" => Node::boolean(),
        "!String" => Node::string(),
        "!File" => Node::file(),
        "!Dir" => Node::dir(),
        other => return Err(Error::syntax(format!("unknown field type `{other}`")).with_location(location)),
    })
}

fn field(desc: &Desc) -> Result<Node, Error> {
    let location = desc.location();
    let Some(tag) = desc.tag() else {
        let mut group = Group::new();
        for (key, _, child) in desc.entries("an untagged field (group)")? {
            group = group.field(key.as_str(), field(child)?);
        }
        return Ok(Node::group(group));
    };
    match desc {
        Desc::Scalar { value, .. } => match tag {
            "!Struct" => Ok(Node::custom(value.as_str())),
            "!Array" | "!Mapping" => {
                Err(Error::syntax(format!("`{tag}` needs the mapping form with its element types")).with_location(location))
            }
            _ => {
                let node = blank(tag, location)?;
                if is_null_like(value) {
                    Ok(node)
                } else {
                    with_default(node, value, location)
                }
            }
        },
        Desc::Map { entries, .. } => attributes(tag, entries, location),
        Desc::Seq { .. } => Err(Error::syntax("a field cannot be described by a sequence").with_location(location)),
    }
}

fn with_default(node: Node, raw: &str, location: Location) -> Result<Node, Error> {
    let value = convert_leaf(&node, raw, true).map_err(|m| Error::value(format!("default: {m}")).with_location(location))?;
    Ok(node.with_default(value))
}

/// Mapping form of a tagged field.
fn attributes(tag: &str, entries: &[(String, Location, Desc)], location: Location) -> Result<Node, Error> {
    let find = |name: &str| entries.iter().find(|(k, _, _)| k == name).map(|(_, _, d)| d);
    let mut node = match tag {
        "!Struct" => {
            let name = find("type").ok_or_else(|| Error::syntax("`!Struct` needs `type`").with_location(location))?;
            Node::custom(name.scalar("type")?)
        }
        "!Array" => {
            let element = find("element").ok_or_else(|| Error::syntax("`!Array` needs `element`").with_location(location))?;
            Node::array(field(element)?)
        }
        "!Mapping" => {
            let key = find("key").ok_or_else(|| Error::syntax("`!Mapping` needs `key`").with_location(location))?;
            let value = find("value").ok_or_else(|| Error::syntax("`!Mapping` needs `value`").with_location(location))?;
            Node::mapping(field(key)?, field(value)?)
        }
        _ => blank(tag, location)?,
    };
    let mut default = None;
    for (key, at, desc) in entries {
        node = match key.as_str() {
            "type" | "element" | "key" | "value" => node,
            "=" | "default" => {
                default = Some((desc.scalar("default")?, *at));
                node
            }
            "min" => {
                let v = bound(&node, desc.scalar("min")?, *at)?;
                node.min(v)
            }
            "max" => {
                let v = bound(&node, desc.scalar("max")?, *at)?;
                node.max(v)
            }
            "description" => node.description(desc.scalar("description")?),
            "command-line" => node.command_line(desc.scalar("command-line")?),
            "command-line-incr" => node.command_line_incr(desc.scalar("command-line-incr")?),
            "command-line-decr" => node.command_line_decr(desc.scalar("command-line-decr")?),
            "environ" => node.environ(desc.scalar("environ")?),
            "inheritance" => node.inheritance(match desc.scalar("inheritance")? {
                "none" => Inheritance::None,
                "append" => Inheritance::AppendToDefault,
                "replace" => Inheritance::ReplaceDefault,
                other => {
                    return Err(Error::syntax(format!("inheritance must be none, append or replace, not `{other}`"))
                        .with_location(*at));
                }
            }),
            other => {
                return Err(Error::syntax(format!("unknown field attribute `{other}`")).with_location(*at));
            }
        };
    }
    // Bounds first, so the default is checked against them.
    match default {
        Some((raw, at)) => with_default(node, raw, at),
        None => Ok(node),
    }
}

fn bound(node: &Node, raw: &str, at: Location) -> Result<crate::value::Value, Error> {
    let value = match node.kind() {
        NodeKind::Int(_) => parse_int(raw, true).map(Into::into),
        NodeKind::UInt(_) => parse_uint(raw, true).map(Into::into),
        NodeKind::Float(_) => parse_float(raw).map(Into::into),
        other => Err(format!("a {} field has no bounds", other.name())),
    };
    value.map_err(|m| Error::syntax(m).with_location(at))
}
