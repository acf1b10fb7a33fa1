//! Defines error and its location
use std::fmt;
use std::path::PathBuf;

use saphyr_parser::ScanError;
use serde::de;

use crate::location::{Location, SourceId};
use crate::sources::SourceMap;

/// Broad class of an [`Error`].
///
/// Syntax and value errors are caused by the configuration text; assertion errors
/// indicate an inconsistent schema or a bug in the loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The document does not have the shape the schema expects.
    Syntax,
    /// A scalar is outside of the domain of its field, or a referenced file cannot be read.
    Value,
    /// Internal invariant violation (for example a schema that links to nothing).
    Assertion,
}

/// Error type returned by every loading, override and extraction entry point.
#[derive(Debug)]
pub enum Error {
    /// Structural mismatch: unexpected event, unknown key, bad merge, unknown alias, nested anchor.
    Syntax {
        msg: String,
        location: Location,
    },
    /// Value outside of the declared domain of a field.
    Value {
        msg: String,
        location: Location,
    },
    /// Invariant violation that no configuration text can cause.
    Assertion {
        msg: String,
        location: Location,
    },
    /// Unexpected end of input.
    Eof {
        location: Location,
    },
    /// Something else than the expected event was seen.
    Unexpected {
        expected: &'static str,
        location: Location,
    },
    /// A file could not be opened or read (`!Include`, `!FromFile` or the root document).
    Io {
        path: PathBuf,
        cause: std::io::Error,
        location: Location,
    },
    /// Names the file the wrapped error points into.
    InFile {
        path: PathBuf,
        error: Box<Error>,
    },
    /// Wrap an error with a pre-rendered excerpt of the offending source lines.
    WithSnippet {
        /// Rendered snippet, including the message of `error`.
        text: String,
        error: Box<Error>,
    },
}

impl Error {
    /// Construct a `Syntax` error with no known location.
    ///
    /// Called by:
    /// - Every cursor layer and the matcher when the event shape is wrong.
    pub(crate) fn syntax<S: Into<String>>(s: S) -> Self {
        Error::Syntax {
            msg: s.into(),
            location: Location::UNKNOWN,
        }
    }

    /// Construct a `Value` error with no known location.
    ///
    /// Called by:
    /// - Scalar conversion (numbers, booleans, bounds) and `!FromFile`.
    pub(crate) fn value<S: Into<String>>(s: S) -> Self {
        Error::Value {
            msg: s.into(),
            location: Location::UNKNOWN,
        }
    }

    /// Construct an `Assertion` error with no known location.
    pub(crate) fn assertion<S: Into<String>>(s: S) -> Self {
        Error::Assertion {
            msg: s.into(),
            location: Location::UNKNOWN,
        }
    }

    /// Convenience for an `Unexpected` error pre-filled with a human phrase.
    ///
    /// Arguments:
    /// - `what`: short description like "mapping start".
    ///
    /// Called by:
    /// - Matcher functions that validate the next event kind.
    pub(crate) fn unexpected(what: &'static str) -> Self {
        Error::Unexpected {
            expected: what,
            location: Location::UNKNOWN,
        }
    }

    /// Construct an unexpected end-of-input error with unknown location.
    ///
    /// Used by:
    /// - Lookahead and pull methods when `None` appears prematurely.
    pub(crate) fn eof() -> Self {
        Error::Eof {
            location: Location::UNKNOWN,
        }
    }

    /// Construct an `Io` error for `path`.
    pub(crate) fn io(path: impl Into<PathBuf>, cause: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            cause,
            location: Location::UNKNOWN,
        }
    }

    /// Attach/override a concrete location to this error and return it.
    ///
    /// Arguments:
    /// - `set_location`: location to store in the error.
    ///
    /// Returns:
    /// - The same `Error` with location updated. Wrappers forward to the wrapped error.
    ///
    /// Called by:
    /// - Most error paths once the event position becomes known.
    pub(crate) fn with_location(mut self, set_location: Location) -> Self {
        match &mut self {
            Error::Syntax { location, .. }
            | Error::Value { location, .. }
            | Error::Assertion { location, .. }
            | Error::Eof { location }
            | Error::Unexpected { location, .. }
            | Error::Io { location, .. } => {
                *location = set_location;
            }
            Error::InFile { error, .. } | Error::WithSnippet { error, .. } => {
                let inner = std::mem::replace(error.as_mut(), Error::eof());
                **error = inner.with_location(set_location);
            }
        }
        self
    }

    /// Attach a location only if none is known yet.
    pub(crate) fn or_location(self, fallback: Location) -> Self {
        if self.location().is_some() {
            self
        } else {
            self.with_location(fallback)
        }
    }

    /// If the error has a known location, return it.
    ///
    /// Returns:
    /// - `Some(Location)` when coordinates are known; `None` otherwise.
    pub fn location(&self) -> Option<Location> {
        match self {
            Error::Syntax { location, .. }
            | Error::Value { location, .. }
            | Error::Assertion { location, .. }
            | Error::Eof { location }
            | Error::Unexpected { location, .. }
            | Error::Io { location, .. } => {
                if location.is_known() {
                    Some(*location)
                } else {
                    None
                }
            }
            Error::InFile { error, .. } | Error::WithSnippet { error, .. } => error.location(),
        }
    }

    /// Class of this error, looking through wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Syntax { .. } | Error::Eof { .. } | Error::Unexpected { .. } => {
                ErrorKind::Syntax
            }
            Error::Value { .. } | Error::Io { .. } => ErrorKind::Value,
            Error::Assertion { .. } => ErrorKind::Assertion,
            Error::InFile { error, .. } | Error::WithSnippet { error, .. } => error.kind(),
        }
    }

    /// The innermost error, without file or snippet wrappers.
    pub fn without_context(&self) -> &Error {
        match self {
            Error::InFile { error, .. } | Error::WithSnippet { error, .. } => {
                error.without_context()
            }
            other => other,
        }
    }

    /// Map a `saphyr_parser::ScanError` into our error type with location.
    ///
    /// Called by:
    /// - The include layer when the underlying parser fails.
    pub(crate) fn from_scan_error(err: ScanError, source: SourceId) -> Self {
        let mark = err.marker();
        let location = Location::new(mark.line(), mark.col() + 1, source);
        Error::Syntax {
            msg: err.info().to_owned(),
            location,
        }
    }

    /// Name the file the error belongs to and optionally render a source excerpt.
    ///
    /// Arguments:
    /// - `sources`: every file read during the parse.
    /// - `crop_radius`: column radius for the rendered excerpt; `0` disables the excerpt.
    ///
    /// Called by:
    /// - The loader once a parse has failed, before handing the error to the caller.
    pub(crate) fn with_sources(self, sources: &SourceMap, crop_radius: usize) -> Self {
        let Some(location) = self.location() else {
            return self;
        };
        let Some(source) = sources.get(location.source()) else {
            return self;
        };
        let error = if crop_radius > 0 {
            let name = source.display_name();
            let snippet = crate::snippet::Snippet::new(source.text(), &name, crop_radius);
            match snippet.render(&self.bare_message(), location) {
                Some(text) => Error::WithSnippet {
                    text,
                    error: Box::new(self),
                },
                None => self,
            }
        } else {
            self
        };
        match source.path() {
            Some(path) => Error::InFile {
                path: path.to_path_buf(),
                error: Box::new(error),
            },
            None => error,
        }
    }

    /// Message text without location suffix, used as the snippet label.
    pub(crate) fn bare_message(&self) -> String {
        match self {
            Error::Syntax { msg, .. } => format!("syntax error: {msg}"),
            Error::Value { msg, .. } => format!("invalid value: {msg}"),
            Error::Assertion { msg, .. } => format!("internal error: {msg}"),
            Error::Eof { .. } => "unexpected end of input".to_string(),
            Error::Unexpected { expected, .. } => format!("unexpected event: expected {expected}"),
            Error::Io { path, cause, .. } => format!("cannot read {}: {cause}", path.display()),
            Error::InFile { error, .. } | Error::WithSnippet { error, .. } => error.bare_message(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InFile { path, error } => match error.as_ref() {
                // The snippet already names the file in its header.
                Error::WithSnippet { .. } => write!(f, "{error}"),
                _ => write!(f, "{}: {error}", path.display()),
            },
            Error::WithSnippet { text, .. } => write!(f, "{text}"),
            other => fmt_with_location(f, &other.bare_message(), other.location()),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { cause, .. } => Some(cause),
            Error::InFile { error, .. } | Error::WithSnippet { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::value(msg.to_string())
    }
}

/// Print a message optionally suffixed with "at line X, column Y".
///
/// Arguments:
/// - `f`: destination formatter.
/// - `msg`: main text.
/// - `location`: position to attach if known.
fn fmt_with_location(f: &mut fmt::Formatter<'_>, msg: &str, location: Option<Location>) -> fmt::Result {
    match location {
        Some(location) => write!(
            f,
            "{msg} at line {}, column {}",
            location.line, location.column
        ),
        None => write!(f, "{msg}"),
    }
}
