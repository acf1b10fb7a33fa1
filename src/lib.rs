//! Schema-driven YAML configuration loading.
//!
//! A [`Schema`] describes the configuration tree: groups of named fields, typed leaves
//! with bounds and defaults, arrays, mappings and user-defined structure types. A
//! [`Loader`] matches a YAML document against that schema in a single pass over the
//! parser events and produces a [`Config`] that can be queried by dotted path, modified
//! through command-line and environment overrides, printed back as YAML, or extracted
//! into a `serde` type.
//!
//! ```rust
//! use coyaml::{Group, Loader, Node, Schema};
//!
//! let schema = Schema::new(
//!     Group::new()
//!         .field("port", Node::uint().max(65535).with_default(8080))
//!         .field("log", Group::new().field("level", Node::int().with_default(1))),
//! )
//! .unwrap();
//!
//! let config = Loader::new(&schema).load_str("port: 1k\nlog: {level: 3}\n").unwrap();
//! assert_eq!(config.get_uint("port"), Some(1000));
//! assert_eq!(config.get_int("log.level"), Some(3));
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

pub use config::{Config, FieldPath};
pub use emitter::{EmitOptions, emit};
pub use error::{Error, ErrorKind};
pub use location::{Location, SourceId};
pub use options::{AliasLimits, DuplicateKeyPolicy, Options};
pub use overrides::{CliOverride, EnvOverride, OverrideAction, OverrideTable, apply_env};
pub use schema::{
    Bounds, FieldMeta, FieldWriter, Group, Inheritance, Node, NodeKind, ScalarHook, Schema, SchemaBuilder, StringKind,
    Usertype,
};
pub use schema_file::{load_schema, load_schema_file};
pub use value::{UserRef, UserValue, Value};
pub use vars::{Variable, Variables};

#[cfg(feature = "cli")]
pub use cli::{CommandLine, Invocation};

#[cfg(feature = "cli")]
mod cli;
mod config;
mod copy;
mod cursor;
mod de;
mod dispatch;
mod emitter;
mod error;
mod eval;
mod events;
mod include;
mod live_events;
mod location;
mod macros;
mod matcher;
pub mod options;
mod overrides;
mod parse_scalars;
mod schema;
mod schema_file;
mod snippet;
mod sources;
mod tags;
mod value;
mod vars;

use crate::cursor::Cursor;
use crate::matcher::Matcher;

/// Loads configuration documents against one schema.
///
/// The variable table is kept between loads, so `$name` references in a later document
/// see assignments made for an earlier one (for example `-D` flags).
#[derive(Debug)]
pub struct Loader<'s> {
    schema: &'s Schema,
    options: Options,
    variables: Variables,
}

impl<'s> Loader<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self::with_options(schema, Options::default())
    }

    pub fn with_options(schema: &'s Schema, options: Options) -> Self {
        Self {
            schema,
            options,
            variables: Variables::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    /// Configuration made of schema defaults only.
    pub fn defaults(&self) -> Config<'s> {
        Config::defaults(self.schema)
    }

    /// Load the document stored in `path`.
    ///
    /// Relative `!Include` and `!FromFile` names are resolved against the directory of
    /// `path`. Errors carry the file name and, when [`Options::with_snippet`] is set, a
    /// rendered excerpt of the offending line.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Config<'s>, Error> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading configuration file");
        let text = sources::read_text(path, self.options.max_file_size)?;
        self.load(text, Some(path.to_path_buf()), sources::parent_dir(path))
    }

    /// Load a document held in memory. Relative names resolve against the current directory.
    pub fn load_str(&self, text: &str) -> Result<Config<'s>, Error> {
        self.load(text.to_owned(), None, PathBuf::from("."))
    }

    fn load(&self, text: String, path: Option<PathBuf>, dir: PathBuf) -> Result<Config<'s>, Error> {
        let cursor = Cursor::open(text, path, dir, &self.options);
        let mut matcher = Matcher::new(self.schema, &self.options, &self.variables, cursor);
        let mut matched = match matcher.run() {
            Ok(matched) => matched,
            Err(e) => {
                let crop = if self.options.with_snippet {
                    self.options.crop_radius
                } else {
                    0
                };
                return Err(e.or_location(matcher.last_location()).with_sources(matcher.sources(), crop));
            }
        };
        copy::copy_pass(self.schema, &mut matched);
        Ok(Config::from_parts(
            self.schema,
            matched.root,
            matched.arena,
            self.options.legacy_octal_numbers,
        ))
    }
}
