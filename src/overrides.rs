//! Command-line and environment overrides declared on schema fields.
//!
//! Overrides write through the same [`FieldPath`] addressing and leaf conversion the
//! document matcher uses, so a value coming from `--port 81` or `APP_PORT=81` is checked
//! exactly like `port: 81` in a file.

use tracing::debug;

use crate::config::{Config, FieldPath};
use crate::error::Error;
use crate::schema::{Group, NodeKind, Schema};

/// What a command-line flag does to its field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverrideAction {
    /// Take the flag argument as the new value.
    Set,
    Increment,
    Decrement,
}

/// One command-line flag group bound to a field.
#[derive(Clone, Debug)]
pub struct CliOverride {
    /// Flags as declared, e.g. `["-p", "--port"]`.
    pub flags: Vec<String>,
    pub action: OverrideAction,
    pub path: FieldPath,
    pub description: Option<String>,
    /// Kind of the field, for help texts.
    pub kind: &'static str,
}

impl CliOverride {
    /// First single-dash, single-character flag.
    pub fn short(&self) -> Option<char> {
        self.flags.iter().find_map(|f| {
            let rest = f.strip_prefix('-')?;
            let mut chars = rest.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c != '-' => Some(c),
                _ => None,
            }
        })
    }

    /// Every `--long` flag, without the dashes.
    pub fn longs(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().filter_map(|f| f.strip_prefix("--")).filter(|l| !l.is_empty())
    }
}

/// An environment variable bound to a field.
#[derive(Clone, Debug)]
pub struct EnvOverride {
    pub var: String,
    pub path: FieldPath,
}

/// Every override declared in a schema, in schema order.
#[derive(Clone, Debug, Default)]
pub struct OverrideTable {
    cli: Vec<CliOverride>,
    env: Vec<EnvOverride>,
}

impl OverrideTable {
    /// Collect overrides from the root group and, through usertype fields, from the bodies
    /// of the instances stored there. Arrays and mappings are not entered.
    pub fn from_schema(schema: &Schema) -> Self {
        let mut table = Self::default();
        table.walk(schema, schema.root(), &mut Vec::new(), "");
        table
    }

    fn walk(&mut self, schema: &Schema, group: &Group, steps: &mut Vec<usize>, prefix: &str) {
        for (index, (name, node)) in group.fields().iter().enumerate() {
            let dotted = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            steps.push(index);
            match &node.kind {
                NodeKind::Group(inner) => self.walk(schema, inner, steps, &dotted),
                NodeKind::Custom(type_name) => {
                    if let Some(index) = schema.usertype_index(type_name) {
                        self.walk(schema, schema.usertype(index).body(), steps, &dotted);
                    }
                }
                _ => {
                    let meta = node.meta();
                    let path = FieldPath::from_steps(steps.clone(), dotted);
                    let actions = [
                        (meta.command_line(), OverrideAction::Set),
                        (meta.command_line_incr(), OverrideAction::Increment),
                        (meta.command_line_decr(), OverrideAction::Decrement),
                    ];
                    for (flags, action) in actions {
                        if !flags.is_empty() {
                            self.cli.push(CliOverride {
                                flags: flags.to_vec(),
                                action,
                                path: path.clone(),
                                description: meta.description().map(str::to_owned),
                                kind: node.kind.name(),
                            });
                        }
                    }
                    if let Some(var) = meta.environ() {
                        self.env.push(EnvOverride {
                            var: var.to_owned(),
                            path,
                        });
                    }
                }
            }
            steps.pop();
        }
    }

    pub fn cli(&self) -> &[CliOverride] {
        &self.cli
    }

    pub fn env(&self) -> &[EnvOverride] {
        &self.env
    }

    pub fn is_empty(&self) -> bool {
        self.cli.is_empty() && self.env.is_empty()
    }
}

/// Apply environment overrides from `(name, value)` pairs.
///
/// Pass `std::env::vars()` in production. Variables the table does not name are ignored;
/// a value that does not convert is a value error naming the variable.
pub fn apply_env<I, K, V>(config: &mut Config<'_>, table: &OverrideTable, vars: I) -> Result<(), Error>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    for (name, value) in vars {
        let (name, value) = (name.as_ref(), value.as_ref());
        for entry in table.env.iter().filter(|e| e.var == name) {
            debug!(var = name, field = %entry.path, "environment override");
            config.set_path(&entry.path, value).map_err(|e| match e {
                Error::Value { msg, .. } => Error::value(format!("environment variable {name}: {msg}")),
                other => other,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Node, Usertype};

    fn schema() -> Schema {
        Schema::builder(
            Group::new()
                .field("port", Node::uint().max(65535).command_line("-p --port").environ("APP_PORT"))
                .field("verbose", Node::int().command_line_incr("-v").command_line_decr("-q"))
                .field("log", Group::new().field("file", Node::file().command_line("--log-file")))
                .field("main", Node::custom("section"))
                .field("peers", Node::array(Node::custom("section"))),
        )
        .usertype(Usertype::new(
            "section",
            Group::new().field("workers", Node::int().with_default(1).environ("APP_WORKERS")),
        ))
        .build()
        .unwrap()
    }

    #[test]
    fn table_lists_leaves_in_schema_order() {
        let s = schema();
        let table = OverrideTable::from_schema(&s);
        let names: Vec<_> = table.cli().iter().map(|o| o.path.name().to_owned()).collect();
        assert_eq!(names, ["port", "verbose", "verbose", "log.file"]);
        assert_eq!(table.cli()[1].action, OverrideAction::Increment);
        assert_eq!(table.cli()[2].action, OverrideAction::Decrement);
        let vars: Vec<_> = table.env().iter().map(|e| e.var.as_str()).collect();
        // Instances inside arrays are not reachable by a flag.
        assert_eq!(vars, ["APP_PORT", "APP_WORKERS"]);
    }

    #[test]
    fn short_and_long_flags() {
        let s = schema();
        let table = OverrideTable::from_schema(&s);
        let port = &table.cli()[0];
        assert_eq!(port.short(), Some('p'));
        assert_eq!(port.longs().collect::<Vec<_>>(), ["port"]);
        assert_eq!(table.cli()[3].short(), None);
    }

    #[test]
    fn env_overrides_convert_values() {
        let s = schema();
        let table = OverrideTable::from_schema(&s);
        let mut config = Config::defaults(&s);
        apply_env(
            &mut config,
            &table,
            [("HOME", "/root"), ("APP_PORT", "8k"), ("APP_WORKERS", "3")],
        )
        .unwrap();
        assert_eq!(config.get_uint("port"), Some(8000));
        assert_eq!(config.get_int("main.workers"), Some(3));

        let err = apply_env(&mut config, &table, [("APP_PORT", "99k")]).unwrap_err();
        assert!(err.to_string().contains("APP_PORT"), "{err}");
    }
}
