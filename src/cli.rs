//! Command line built from the schema's override table.
//!
//! Besides the flags declared on schema fields, every command line accepts:
//!
//! | flag | meaning |
//! |------|---------|
//! | `-c`, `--config FILE` | configuration file to load |
//! | `-D`, `--var NAME=VALUE` | set a substitution variable (repeatable) |
//! | `-P`, `--print-config` | print the effective configuration |
//! | `-C`, `--check-config` | only validate the configuration |
//! | `--debug-config` | log key matching and unresolved variables |
//! | `--print-comments` | include field descriptions when printing |
//! | `--print-short` | leave out fields equal to their defaults when printing |
//!
//! Schema flags that collide with these (or with each other) are dropped with a warning.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::warn;

use crate::config::Config;
use crate::emitter::EmitOptions;
use crate::error::Error;
use crate::overrides::{OverrideAction, OverrideTable};
use crate::schema::Schema;
use crate::vars::Variables;

const RESERVED_SHORTS: &[char] = &['c', 'D', 'P', 'C', 'h'];
const RESERVED_LONGS: &[&str] = &[
    "config",
    "var",
    "print-config",
    "check-config",
    "debug-config",
    "print-comments",
    "print-short",
    "help",
];

/// A `clap` command for one schema.
#[derive(Debug)]
pub struct CommandLine {
    command: Command,
    table: OverrideTable,
    /// Arg ids of the overrides that made it onto the command, by table index.
    ids: Vec<Option<String>>,
}

/// One override occurrence, in command-line order.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Step {
    entry: usize,
    /// Flag argument for `Set`, repeat count for counters.
    raw: Option<String>,
    repeat: u8,
}

/// Parsed command line.
#[derive(Clone, Debug, Default)]
pub struct Invocation {
    pub config_file: Option<PathBuf>,
    /// `NAME=VALUE` assignments in command-line order.
    pub vars: Vec<String>,
    pub print_config: bool,
    pub check_config: bool,
    pub debug_config: bool,
    pub print_comments: bool,
    pub print_short: bool,
    steps: Vec<Step>,
}

impl Invocation {
    /// Store every `--var` assignment in `vars`.
    pub fn apply_vars(&self, vars: &mut Variables) -> Result<(), Error> {
        for assignment in &self.vars {
            if !vars.set_assignment(assignment) {
                return Err(Error::value(format!("`--var {assignment}`: expected NAME=VALUE")));
            }
        }
        Ok(())
    }

    /// Emitter settings selected by `--print-comments` and `--print-short`.
    pub fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            comments: self.print_comments,
            short: self.print_short,
            ..EmitOptions::default()
        }
    }

    /// Number of schema overrides given.
    pub fn override_count(&self) -> usize {
        self.steps.len()
    }
}

impl CommandLine {
    pub fn new(schema: &Schema) -> Self {
        let table = OverrideTable::from_schema(schema);
        let name = schema.program_name().unwrap_or("coyaml").to_owned();
        let mut command = reserved_args(Command::new(name), schema);
        if let Some(about) = schema.description() {
            command = command.about(about.to_owned());
        }
        let mut shorts: BTreeSet<char> = RESERVED_SHORTS.iter().copied().collect();
        let mut longs: BTreeSet<String> = RESERVED_LONGS.iter().map(|l| (*l).to_owned()).collect();
        let mut ids = Vec::with_capacity(table.cli().len());
        for (index, entry) in table.cli().iter().enumerate() {
            let short = entry.short().filter(|c| {
                let free = shorts.insert(*c);
                if !free {
                    warn!(flag = %format!("-{c}"), field = %entry.path, "flag already taken, ignored");
                }
                free
            });
            let own_longs: Vec<String> = entry
                .longs()
                .filter(|l| {
                    let free = longs.insert((*l).to_owned());
                    if !free {
                        warn!(flag = %format!("--{l}"), field = %entry.path, "flag already taken, ignored");
                    }
                    free
                })
                .map(str::to_owned)
                .collect();
            if short.is_none() && own_longs.is_empty() {
                ids.push(None);
                continue;
            }
            let id = format!("override-{index}");
            let mut arg = Arg::new(id.clone());
            if let Some(c) = short {
                arg = arg.short(c);
            }
            if let Some((first, rest)) = own_longs.split_first() {
                arg = arg.long(first.clone());
                for alias in rest {
                    arg = arg.visible_alias(alias.clone());
                }
            }
            let help = entry.description.clone().unwrap_or_else(|| entry.path.to_string());
            arg = match entry.action {
                OverrideAction::Set => arg
                    .action(ArgAction::Append)
                    .value_name(entry.kind.to_ascii_uppercase())
                    .help(help),
                OverrideAction::Increment => arg.action(ArgAction::Count).help(format!("{help} (+1)")),
                OverrideAction::Decrement => arg.action(ArgAction::Count).help(format!("{help} (-1)")),
            };
            command = command.arg(arg);
            ids.push(Some(id));
        }
        Self { command, table, ids }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn table(&self) -> &OverrideTable {
        &self.table
    }

    /// Parse `args` (the first item is the program name).
    pub fn parse_from<I, T>(&self, args: I) -> Result<Invocation, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command.clone().try_get_matches_from(args)?;
        Ok(self.invocation(&matches))
    }

    fn invocation(&self, matches: &ArgMatches) -> Invocation {
        let mut indexed: Vec<(usize, Step)> = Vec::new();
        for (entry, id) in self.ids.iter().enumerate() {
            let Some(id) = id else { continue };
            match self.table.cli()[entry].action {
                OverrideAction::Set => {
                    let values = matches.get_many::<String>(id).into_iter().flatten();
                    let indices = matches.indices_of(id).into_iter().flatten();
                    for (value, index) in values.zip(indices) {
                        indexed.push((
                            index,
                            Step {
                                entry,
                                raw: Some(value.clone()),
                                repeat: 1,
                            },
                        ));
                    }
                }
                OverrideAction::Increment | OverrideAction::Decrement => {
                    let count = matches.get_count(id);
                    if count > 0 {
                        // Counter occurrences share one position: the last one.
                        let index = matches.indices_of(id).and_then(|i| i.last()).unwrap_or(usize::MAX);
                        indexed.push((
                            index,
                            Step {
                                entry,
                                raw: None,
                                repeat: count,
                            },
                        ));
                    }
                }
            }
        }
        indexed.sort_by_key(|(index, step)| (*index, step.entry));
        Invocation {
            config_file: matches.get_one::<PathBuf>("config").cloned(),
            vars: matches.get_many::<String>("var").into_iter().flatten().cloned().collect(),
            print_config: matches.get_flag("print-config"),
            check_config: matches.get_flag("check-config"),
            debug_config: matches.get_flag("debug-config"),
            print_comments: matches.get_flag("print-comments"),
            print_short: matches.get_flag("print-short"),
            steps: indexed.into_iter().map(|(_, step)| step).collect(),
        }
    }

    /// Apply the schema overrides of `invocation` to `config`, in command-line order.
    pub fn apply(&self, invocation: &Invocation, config: &mut Config<'_>) -> Result<(), Error> {
        for step in &invocation.steps {
            let entry = &self.table.cli()[step.entry];
            let flag = entry.flags.join("/");
            let in_flag = |e: Error| match e {
                Error::Value { msg, .. } => Error::value(format!("{flag}: {msg}")),
                other => other,
            };
            match (entry.action, &step.raw) {
                (OverrideAction::Set, Some(raw)) => config.set_path(&entry.path, raw).map_err(in_flag)?,
                (OverrideAction::Increment, _) => config.add_path(&entry.path, i64::from(step.repeat)).map_err(in_flag)?,
                (OverrideAction::Decrement, _) => config.add_path(&entry.path, -i64::from(step.repeat)).map_err(in_flag)?,
                (OverrideAction::Set, None) => {}
            }
        }
        Ok(())
    }
}

fn reserved_args(command: Command, schema: &Schema) -> Command {
    let config_help = match schema.default_config() {
        Some(path) => format!("Configuration file [default: {}]", path.display()),
        None => "Configuration file".to_owned(),
    };
    command
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help(config_help),
        )
        .arg(
            Arg::new("var")
                .short('D')
                .long("var")
                .value_name("NAME=VALUE")
                .action(ArgAction::Append)
                .help("Set a substitution variable"),
        )
        .arg(
            Arg::new("print-config")
                .short('P')
                .long("print-config")
                .action(ArgAction::SetTrue)
                .help("Print the effective configuration and exit"),
        )
        .arg(
            Arg::new("check-config")
                .short('C')
                .long("check-config")
                .action(ArgAction::SetTrue)
                .help("Check the configuration and exit"),
        )
        .arg(
            Arg::new("debug-config")
                .long("debug-config")
                .action(ArgAction::SetTrue)
                .help("Log how the configuration is read"),
        )
        .arg(
            Arg::new("print-comments")
                .long("print-comments")
                .action(ArgAction::SetTrue)
                .help("Print field descriptions with --print-config"),
        )
        .arg(
            Arg::new("print-short")
                .long("print-short")
                .action(ArgAction::SetTrue)
                .help("Omit fields equal to their defaults with --print-config"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Group, Node};

    fn schema() -> Schema {
        Schema::builder(
            Group::new()
                .field("port", Node::uint().max(65535).command_line("-p --port --listen-port"))
                .field("verbose", Node::int().command_line_incr("-v").command_line_decr("-q"))
                .field("name", Node::string().command_line("-c --name")),
        )
        .program_name("demo")
        .build()
        .unwrap()
    }

    #[test]
    fn reserved_flags_are_parsed() {
        let s = schema();
        let cli = CommandLine::new(&s);
        let inv = cli
            .parse_from(["demo", "-c", "a.yaml", "-D", "x=1", "--var", "y=two", "-P", "--print-short"])
            .unwrap();
        assert_eq!(inv.config_file, Some(PathBuf::from("a.yaml")));
        assert_eq!(inv.vars, ["x=1", "y=two"]);
        assert!(inv.print_config && inv.print_short);
        assert!(!inv.check_config && !inv.print_comments);
        let mut vars = Variables::new();
        inv.apply_vars(&mut vars).unwrap();
        assert_eq!(vars.get_string("x").as_deref(), Some("1"));
    }

    #[test]
    fn colliding_short_flag_is_dropped_but_long_stays() {
        let s = schema();
        let cli = CommandLine::new(&s);
        let inv = cli.parse_from(["demo", "--name", "web"]).unwrap();
        let mut config = Config::defaults(&s);
        cli.apply(&inv, &mut config).unwrap();
        assert_eq!(config.get_str("name"), Some("web"));
    }

    #[test]
    fn overrides_apply_in_order() {
        let s = schema();
        let cli = CommandLine::new(&s);
        let inv = cli
            .parse_from(["demo", "--port", "80", "-v", "--listen-port", "1k", "-v"])
            .unwrap();
        assert_eq!(inv.override_count(), 3);
        let mut config = Config::defaults(&s);
        cli.apply(&inv, &mut config).unwrap();
        assert_eq!(config.get_uint("port"), Some(1000));
        assert_eq!(config.get_int("verbose"), Some(2));
    }

    #[test]
    fn bad_values_name_the_flag() {
        let s = schema();
        let cli = CommandLine::new(&s);
        let inv = cli.parse_from(["demo", "-p", "70k"]).unwrap();
        let mut config = Config::defaults(&s);
        let err = cli.apply(&inv, &mut config).unwrap_err();
        assert!(err.to_string().contains("--port"), "{err}");
        assert!(cli.parse_from(["demo", "--bogus"]).is_err());
    }

    #[test]
    fn bad_var_assignment() {
        let s = schema();
        let cli = CommandLine::new(&s);
        let inv = cli.parse_from(["demo", "-D", "novalue"]).unwrap();
        assert!(inv.apply_vars(&mut Variables::new()).is_err());
    }
}
