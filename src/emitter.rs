//! Effective-configuration writer.
//!
//! Output is block-style YAML that loads back into the same values with the same schema:
//! strings are escaped for substitution (`\` and `$` get a leading backslash), quoted when a
//! plain scalar would read differently, and non UTF-8 strings are written as `!!binary`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use crate::config::Config;
use crate::schema::{Group, Node, NodeKind};
use crate::value::Value;

/// Emitter settings. Build with [`crate::emit_options!`] to stay source compatible when
/// fields are added.
#[derive(Clone, Debug)]
pub struct EmitOptions {
    /// Write field descriptions as `#` comments above their keys. Default: false.
    pub comments: bool,
    /// Leave out fields whose value equals their default. Default: false.
    pub short: bool,
    /// Spaces per nesting level (2 by default). Values below 1 are treated as 1.
    pub indent_step: usize,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            comments: false,
            short: false,
            indent_step: 2,
        }
    }
}

/// Rendered value: either fits after `key: ` on one line, or is a block of lines
/// already indented for its position.
enum Fragment {
    Inline(String),
    Block { tag: Option<String>, body: String },
}

/// Write `config` as YAML.
///
/// ```rust
/// use coyaml::{Config, Group, Node, Schema, emit};
///
/// let schema = Schema::new(
///     Group::new()
///         .field("port", Node::uint().with_default(8080))
///         .field("debug", Node::boolean()),
/// )
/// .unwrap();
/// let config = Config::defaults(&schema);
/// assert_eq!(emit(&config, &Default::default()), "port: 8080\ndebug: no\n");
/// ```
pub fn emit(config: &Config<'_>, options: &EmitOptions) -> String {
    let emitter = Emitter {
        config,
        options,
        step: options.indent_step.max(1),
    };
    let body = emitter.group(config.schema().root(), config.root(), 0);
    if body.is_empty() { "{}\n".to_owned() } else { body }
}

struct Emitter<'c, 's> {
    config: &'c Config<'s>,
    options: &'c EmitOptions,
    step: usize,
}

impl Emitter<'_, '_> {
    /// Lines for the fields of `group`, each key at `indent`.
    fn group(&self, group: &Group, fields: &[Value], indent: usize) -> String {
        let pad = " ".repeat(indent);
        let mut out = String::new();
        for ((name, node), value) in group.fields().iter().zip(fields) {
            if self.options.short && self.is_default(node, value) {
                continue;
            }
            if self.options.comments {
                if let Some(text) = node.meta().description() {
                    for line in text.lines() {
                        out.push_str(&format!("{pad}# {line}\n"));
                    }
                }
            }
            out.push_str(&pad);
            out.push_str(&plain_or_quoted(name));
            out.push(':');
            let nested = match &node.kind {
                NodeKind::Array { .. } => indent,
                _ => indent + self.step,
            };
            self.after_key(self.fragment(node, value, nested), &mut out);
        }
        out
    }

    fn after_key(&self, fragment: Fragment, out: &mut String) {
        match fragment {
            Fragment::Inline(text) => {
                out.push(' ');
                out.push_str(&text);
                out.push('\n');
            }
            Fragment::Block { tag, body } => {
                if let Some(tag) = tag {
                    out.push(' ');
                    out.push_str(&tag);
                }
                out.push('\n');
                out.push_str(&body);
            }
        }
    }

    /// Render `value` for `node`; block bodies are indented by `indent`.
    fn fragment(&self, node: &Node, value: &Value, indent: usize) -> Fragment {
        match (&node.kind, value) {
            (NodeKind::Group(group), Value::Group(fields)) => self.block(None, self.group(group, fields, indent)),
            (NodeKind::Custom(_), Value::User(r)) => {
                let instance = self.config.user(*r);
                let usertype = self.config.schema().usertype(instance.usertype());
                let tag = match instance.tag() {
                    Some(t) if instance.tag() != usertype.default_tag() => usertype.tag_name(t).map(|n| format!("!{n}")),
                    _ => None,
                };
                self.block(tag, self.group(usertype.body(), instance.fields(), indent))
            }
            (NodeKind::Array { element, .. }, Value::Array(items)) => {
                if items.is_empty() {
                    return Fragment::Inline("[]".to_owned());
                }
                let mut body = String::new();
                for item in items {
                    self.item(element, item, indent, &mut body);
                }
                Fragment::Block { tag: None, body }
            }
            (NodeKind::Mapping { value: vnode, .. }, Value::Mapping(pairs)) => {
                if pairs.is_empty() {
                    return Fragment::Inline("{}".to_owned());
                }
                let pad = " ".repeat(indent);
                let mut body = String::new();
                for (k, v) in pairs {
                    body.push_str(&pad);
                    body.push_str(&self.scalar(k));
                    body.push(':');
                    let nested = match &vnode.kind {
                        NodeKind::Array { .. } => indent,
                        _ => indent + self.step,
                    };
                    self.after_key(self.fragment(vnode, v, nested), &mut body);
                }
                Fragment::Block { tag: None, body }
            }
            _ => Fragment::Inline(self.scalar(value)),
        }
    }

    fn block(&self, tag: Option<String>, body: String) -> Fragment {
        if body.is_empty() {
            return Fragment::Inline(match tag {
                Some(tag) => format!("{tag} {{}}"),
                None => "{}".to_owned(),
            });
        }
        Fragment::Block { tag, body }
    }

    /// One `- ` sequence entry at `indent`. Untagged blocks start on the dash line.
    fn item(&self, element: &Node, value: &Value, indent: usize, out: &mut String) {
        let pad = " ".repeat(indent);
        let inner = indent + 2;
        match self.fragment(element, value, inner) {
            Fragment::Inline(text) => out.push_str(&format!("{pad}- {text}\n")),
            Fragment::Block { tag: Some(tag), body } => {
                out.push_str(&format!("{pad}- {tag}\n"));
                out.push_str(&body);
            }
            Fragment::Block { tag: None, body } => {
                out.push_str(&pad);
                out.push_str("- ");
                out.push_str(&body[inner.min(body.len())..]);
            }
        }
    }

    fn scalar(&self, value: &Value) -> String {
        match value {
            Value::Null => "~".to_owned(),
            Value::Int(v) => v.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Float(v) => float_text(*v),
            Value::Bool(v) => String::from(if *v { "yes" } else { "no" }),
            Value::Str(s) => string_text(s),
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => string_text(s),
                Err(_) => format!("!!binary {}", B64.encode(b)),
            },
            // A container where the schema expects a scalar cannot come out of a load.
            other => format!("'{}'", other.to_string().replace('\'', "''")),
        }
    }

    fn is_default(&self, node: &Node, value: &Value) -> bool {
        if let Some(default) = node.meta().default_value() {
            return default == value;
        }
        match (&node.kind, value) {
            (NodeKind::Group(group), Value::Group(fields)) => group
                .fields()
                .iter()
                .zip(fields)
                .all(|((_, n), v)| self.is_default(n, v)),
            (NodeKind::Custom(_), Value::User(r)) => {
                let instance = self.config.user(*r);
                let usertype = self.config.schema().usertype(instance.usertype());
                instance.tag() == usertype.default_tag()
                    && usertype
                        .body()
                        .fields()
                        .iter()
                        .zip(instance.fields())
                        .all(|((_, n), v)| self.is_default(n, v))
            }
            (NodeKind::Array { .. }, Value::Array(items)) => items.is_empty(),
            (NodeKind::Mapping { .. }, Value::Mapping(pairs)) => pairs.is_empty(),
            (NodeKind::Int(_), Value::Int(0)) | (NodeKind::UInt(_), Value::UInt(0)) => true,
            (NodeKind::Float(_), Value::Float(v)) => *v == 0.0,
            (NodeKind::Bool, Value::Bool(false)) | (NodeKind::String(_), Value::Null) => true,
            _ => false,
        }
    }
}

/// Float text that parses back to the same value.
fn float_text(v: f64) -> String {
    if v.is_nan() {
        ".nan".to_owned()
    } else if v.is_infinite() {
        String::from(if v > 0.0 { ".inf" } else { "-.inf" })
    } else {
        format!("{v:?}")
    }
}

/// Escape for substitution, then pick a scalar style.
fn string_text(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || c == '$' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    if escaped.chars().any(char::is_control) {
        double_quoted(&escaped)
    } else if is_plain_safe(&escaped) {
        escaped
    } else {
        format!("'{}'", escaped.replace('\'', "''"))
    }
}

fn plain_or_quoted(key: &str) -> String {
    if key.chars().any(char::is_control) {
        double_quoted(key)
    } else if is_plain_safe(key) {
        key.to_owned()
    } else {
        format!("'{}'", key.replace('\'', "''"))
    }
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() && (c as u32) <= 0xFF => out.push_str(&format!("\\x{:02X}", c as u32)),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Whether `s` reads back as the same string when written plain.
fn is_plain_safe(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return false;
    };
    if crate::parse_scalars::is_null_like(s)
        || crate::parse_scalars::parse_yaml11_bool(s).is_ok()
        || crate::parse_scalars::parse_float(s).is_ok()
        || s == "<<"
    {
        return false;
    }
    if first.is_whitespace()
        || s.ends_with(char::is_whitespace)
        || matches!(
            first,
            '-' | '?' | ':' | '[' | ']' | '{' | '}' | '#' | '&' | '*' | '!' | '|' | '>' | '\'' | '"' | '%' | '@' | '`'
        )
    {
        return false;
    }
    !(s.contains(": ") || s.ends_with(':') || s.contains(" #") || s.contains([',', '[', ']', '{', '}']))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, Usertype};

    #[test]
    fn plain_safety() {
        assert!(is_plain_safe("hello world"));
        assert!(is_plain_safe("a:b"));
        for s in ["", "~", "null", "yes", "Off", "12", "1.5k", ".inf", "- x", "a: b", "x:", "a #b", "<<", " x", "x "] {
            assert!(!is_plain_safe(s), "{s:?}");
        }
    }

    #[test]
    fn strings_are_escaped_for_substitution() {
        assert_eq!(string_text("cost $5"), r"cost \$5");
        assert_eq!(string_text(r"C:\dir"), r"C:\\dir");
        assert_eq!(string_text("it's: here"), "'it''s: here'");
        assert_eq!(string_text("two\nlines"), "\"two\\nlines\"");
        assert_eq!(string_text("no"), "'no'");
    }

    #[test]
    fn floats_keep_a_fraction_or_exponent() {
        assert_eq!(float_text(1.0), "1.0");
        assert_eq!(float_text(-0.25), "-0.25");
        assert_eq!(float_text(f64::NEG_INFINITY), "-.inf");
        assert_eq!(float_text(f64::NAN), ".nan");
    }

    fn schema() -> Schema {
        Schema::builder(
            Group::new()
                .field("name", Node::string().description("Service name"))
                .field("limits", Group::new().field("conn", Node::int().with_default(10)))
                .field("hosts", Node::array(Node::string()))
                .field("listen", Node::array(Node::custom("listen")))
                .field("env", Node::mapping(Node::string(), Node::int())),
        )
        .usertype(
            Usertype::new("listen", Group::new().field("port", Node::uint()))
                .with_tag("Tcp", 1)
                .with_tag("Unix", 2)
                .with_default_tag(1),
        )
        .build()
        .unwrap()
    }

    #[test]
    fn defaults_render_every_field() {
        let s = schema();
        let config = Config::defaults(&s);
        assert_eq!(
            emit(&config, &EmitOptions::default()),
            "name: ~\nlimits:\n  conn: 10\nhosts: []\nlisten: []\nenv: {}\n"
        );
        let short = EmitOptions {
            short: true,
            ..EmitOptions::default()
        };
        assert_eq!(emit(&config, &short), "{}\n");
    }

    #[test]
    fn comments_precede_keys() {
        let s = schema();
        let mut config = Config::defaults(&s);
        config.set_from_str("name", "web").unwrap();
        let options = EmitOptions {
            comments: true,
            short: true,
            ..EmitOptions::default()
        };
        assert_eq!(emit(&config, &options), "# Service name\nname: web\n");
    }
}
