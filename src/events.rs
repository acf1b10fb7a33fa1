//! Owned structural events and the pull interface every cursor layer implements.

#[cfg(test)]
use std::collections::VecDeque;

use saphyr_parser::ScalarStyle;

use crate::error::Error;
use crate::location::Location;

/// One normalized structural event.
///
/// Stream and document markers never appear here; the include layer consumes them.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Ev {
    Scalar {
        value: String,
        tag: Option<String>,
        style: ScalarStyle,
        location: Location,
    },
    SeqStart {
        tag: Option<String>,
        location: Location,
    },
    SeqEnd {
        location: Location,
    },
    MapStart {
        tag: Option<String>,
        location: Location,
    },
    MapEnd {
        location: Location,
    },
}

impl Ev {
    pub(crate) fn location(&self) -> Location {
        match self {
            Ev::Scalar { location, .. }
            | Ev::SeqStart { location, .. }
            | Ev::SeqEnd { location }
            | Ev::MapStart { location, .. }
            | Ev::MapEnd { location } => *location,
        }
    }

    /// Tag written on the node, if any.
    pub(crate) fn tag(&self) -> Option<&str> {
        match self {
            Ev::Scalar { tag, .. } | Ev::SeqStart { tag, .. } | Ev::MapStart { tag, .. } => {
                tag.as_deref()
            }
            Ev::SeqEnd { .. } | Ev::MapEnd { .. } => None,
        }
    }

    pub(crate) fn is_start(&self) -> bool {
        matches!(self, Ev::SeqStart { .. } | Ev::MapStart { .. })
    }

    pub(crate) fn is_end(&self) -> bool {
        matches!(self, Ev::SeqEnd { .. } | Ev::MapEnd { .. })
    }

    /// Short human name used in error messages.
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Ev::Scalar { .. } => "scalar",
            Ev::SeqStart { .. } => "sequence",
            Ev::SeqEnd { .. } => "end of sequence",
            Ev::MapStart { .. } => "mapping",
            Ev::MapEnd { .. } => "end of mapping",
        }
    }

    /// True if this is the YAML merge key (`<<`) as an untagged plain scalar.
    pub(crate) fn is_merge_key(&self) -> bool {
        matches!(
            self,
            Ev::Scalar {
                value,
                tag: None,
                style: ScalarStyle::Plain,
                ..
            } if value == "<<"
        )
    }

    /// True for an untagged plain scalar meaning "no value" (empty, `~`, `null`).
    pub(crate) fn is_null_like(&self) -> bool {
        matches!(
            self,
            Ev::Scalar {
                value,
                tag: None,
                style: ScalarStyle::Plain,
                ..
            } if crate::parse_scalars::is_null_like(value)
        )
    }
}

/// Source of events with lookahead.
pub(crate) trait Events {
    /// Pull the next event from the stream.
    ///
    /// Returns:
    /// - `Ok(Some(Ev))` for a real event,
    /// - `Ok(None)` at true end-of-stream,
    /// - `Err(Error)` on parser/structure failure.
    fn next(&mut self) -> Result<Option<Ev>, Error>;

    /// Peek at the next event without consuming it.
    fn peek(&mut self) -> Result<Option<&Ev>, Error>;

    /// Last location that `next` or `peek` has observed.
    ///
    /// Used by:
    /// - Error paths to attach a reasonable position when nothing else is available.
    fn last_location(&self) -> Location;
}

/// Event source that replays a pre-recorded buffer.
#[cfg(test)]
pub(crate) struct ReplayEvents {
    last_location: Location,
    buf: VecDeque<Ev>,
}

#[cfg(test)]
impl ReplayEvents {
    pub(crate) fn new(buf: Vec<Ev>) -> Self {
        Self {
            last_location: buf.first().map(Ev::location).unwrap_or(Location::UNKNOWN),
            buf: VecDeque::from(buf),
        }
    }
}

#[cfg(test)]
impl Events for ReplayEvents {
    fn next(&mut self) -> Result<Option<Ev>, Error> {
        let ev = self.buf.pop_front();
        if let Some(ev) = &ev {
            self.last_location = ev.location();
        }
        Ok(ev)
    }

    fn peek(&mut self) -> Result<Option<&Ev>, Error> {
        if let Some(ev) = self.buf.front() {
            self.last_location = ev.location();
        }
        Ok(self.buf.front())
    }

    fn last_location(&self) -> Location {
        self.last_location
    }
}

/// Consume one complete node (scalar, or container with everything inside).
///
/// Called by:
/// - The duplicate-key layer to drop a later duplicate's value.
/// - The matcher for `_`-prefixed private keys.
pub(crate) fn skip_one_node(ev: &mut dyn Events) -> Result<(), Error> {
    let mut depth = 0usize;
    loop {
        match ev.next()? {
            Some(e) if e.is_start() => depth += 1,
            Some(e) if e.is_end() => {
                if depth == 0 {
                    return Err(Error::syntax(format!("unexpected {}", e.describe()))
                        .with_location(e.location()));
                }
                depth -= 1;
            }
            Some(_) => {}
            None => return Err(Error::eof().with_location(ev.last_location())),
        }
        if depth == 0 {
            return Ok(());
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::location::SourceId;

    pub(crate) fn at(line: usize) -> Location {
        Location::new(line, 1, SourceId::ROOT)
    }

    pub(crate) fn scalar(value: &str, line: usize) -> Ev {
        Ev::Scalar {
            value: value.to_string(),
            tag: None,
            style: ScalarStyle::Plain,
            location: at(line),
        }
    }

    pub(crate) fn map_start(line: usize) -> Ev {
        Ev::MapStart {
            tag: None,
            location: at(line),
        }
    }

    pub(crate) fn map_end(line: usize) -> Ev {
        Ev::MapEnd { location: at(line) }
    }

    pub(crate) fn seq_start(line: usize) -> Ev {
        Ev::SeqStart {
            tag: None,
            location: at(line),
        }
    }

    pub(crate) fn seq_end(line: usize) -> Ev {
        Ev::SeqEnd { location: at(line) }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn skip_scalar_consumes_one_event() {
        let mut replay = ReplayEvents::new(vec![scalar("a", 1), scalar("b", 2)]);
        skip_one_node(&mut replay).unwrap();
        assert_eq!(replay.next().unwrap(), Some(scalar("b", 2)));
    }

    #[test]
    fn skip_container_consumes_to_matching_end() {
        let mut replay = ReplayEvents::new(vec![
            map_start(1),
            scalar("k", 1),
            seq_start(2),
            scalar("1", 2),
            seq_end(2),
            map_end(3),
            scalar("after", 4),
        ]);
        skip_one_node(&mut replay).unwrap();
        assert_eq!(replay.next().unwrap(), Some(scalar("after", 4)));
    }

    #[test]
    fn merge_key_must_be_plain() {
        assert!(scalar("<<", 1).is_merge_key());
        let quoted = Ev::Scalar {
            value: "<<".into(),
            tag: None,
            style: ScalarStyle::SingleQuoted,
            location: at(1),
        };
        assert!(!quoted.is_merge_key());
    }
}
