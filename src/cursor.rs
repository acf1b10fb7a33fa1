//! The event cursor handed to the schema matcher.
//!
//! Layers, outer to inner, each pulling from the next:
//!
//! 1. [`DedupEvents`]: per open mapping, a set of keys already seen; a later duplicate key
//!    and its whole value are dropped (first occurrence wins).
//! 2. [`MergeEvents`]: a `<<` entry is taken out of the stream, its value (a mapping or a
//!    sequence of mappings) is unwrapped into plain key/value events and spliced in front of
//!    the host mapping's end, so host keys precede merged keys and win over them.
//! 3. [`LiveEvents`]: anchor recording and alias replay.
//! 4. [`IncludeEvents`]: raw parsing and `!Include` splicing.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::Error;
use crate::events::{Ev, Events, skip_one_node};
use crate::include::{IncludeEvents, IncludeLimits};
use crate::live_events::LiveEvents;
use crate::location::{Location, SourceId};
use crate::options::{DuplicateKeyPolicy, Options};
use crate::sources::SourceMap;

/// Nesting level tracked by the merge and duplicate-key layers.
#[derive(Debug, Default)]
struct Level {
    is_map: bool,
    /// Inside a mapping: the next node is a key.
    expect_key: bool,
}

impl Level {
    fn map() -> Self {
        Self {
            is_map: true,
            expect_key: true,
        }
    }

    fn seq() -> Self {
        Self::default()
    }
}

/// Toggle key/value position of the enclosing mapping after a complete node.
fn after_node(levels: &mut [impl AsMut<Level>]) {
    if let Some(level) = levels.last_mut() {
        let level = level.as_mut();
        if level.is_map {
            level.expect_key = !level.expect_key;
        }
    }
}

/// Open mapping or sequence in the merge layer, with merge entries waiting for its end.
#[derive(Debug)]
struct MergeLevel {
    level: Level,
    deferred: Vec<Ev>,
}

impl AsMut<Level> for MergeLevel {
    fn as_mut(&mut self) -> &mut Level {
        &mut self.level
    }
}

/// Merge-key (`<<`) expansion layer.
pub(crate) struct MergeEvents {
    inner: LiveEvents,
    /// Spliced merge entries; served before the inner layer.
    replay: VecDeque<Ev>,
    levels: Vec<MergeLevel>,
    /// Lookahead, with the "came from a merge" flag.
    look: Option<(Ev, bool)>,
    last_location: Location,
}

impl MergeEvents {
    pub(crate) fn new(inner: LiveEvents) -> Self {
        Self {
            inner,
            replay: VecDeque::new(),
            levels: Vec::new(),
            look: None,
            last_location: Location::UNKNOWN,
        }
    }

    fn pull(&mut self) -> Result<Option<(Ev, bool)>, Error> {
        if let Some(ev) = self.replay.pop_front() {
            return Ok(Some((ev, true)));
        }
        Ok(self.inner.next()?.map(|ev| (ev, false)))
    }

    fn at_key(&self) -> bool {
        matches!(self.levels.last(), Some(l) if l.level.is_map && l.level.expect_key)
    }

    fn next_impl(&mut self) -> Result<Option<(Ev, bool)>, Error> {
        loop {
            let Some((ev, merged)) = self.pull()? else {
                return Ok(None);
            };
            if self.at_key() {
                if ev.is_merge_key() {
                    let location = ev.location();
                    let value = self.capture_value(location)?;
                    let entries = merge_entries(value, location)?;
                    debug!(line = location.line(), events = entries.len(), "merge key expanded");
                    if let Some(level) = self.levels.last_mut() {
                        level.deferred.extend(entries);
                    }
                    continue;
                }
                if let Ev::MapEnd { .. } = ev {
                    if let Some(level) = self.levels.last_mut() {
                        if !level.deferred.is_empty() {
                            // Replay the merged entries, then this end, through the same
                            // loop so merges nested in merged content expand too.
                            let deferred = std::mem::take(&mut level.deferred);
                            self.replay.push_front(ev);
                            for e in deferred.into_iter().rev() {
                                self.replay.push_front(e);
                            }
                            continue;
                        }
                    }
                }
            }
            self.track(&ev);
            return Ok(Some((ev, merged)));
        }
    }

    fn track(&mut self, ev: &Ev) {
        match ev {
            Ev::MapStart { .. } => self.levels.push(MergeLevel {
                level: Level::map(),
                deferred: Vec::new(),
            }),
            Ev::SeqStart { .. } => self.levels.push(MergeLevel {
                level: Level::seq(),
                deferred: Vec::new(),
            }),
            Ev::Scalar { .. } => after_node(&mut self.levels),
            Ev::MapEnd { .. } | Ev::SeqEnd { .. } => {
                self.levels.pop();
                after_node(&mut self.levels);
            }
        }
    }

    /// Take the complete value node of a `<<` entry.
    fn capture_value(&mut self, key_location: Location) -> Result<Vec<Ev>, Error> {
        let mut out = Vec::new();
        let mut depth = 0usize;
        loop {
            let Some((e, _)) = self.pull()? else {
                return Err(Error::eof().with_location(key_location));
            };
            if e.is_start() {
                depth += 1;
            } else if e.is_end() {
                if depth == 0 {
                    return Err(Error::syntax("merge key `<<` without a value").with_location(e.location()));
                }
                depth -= 1;
            }
            out.push(e);
            if depth == 0 {
                return Ok(out);
            }
        }
    }

    /// Next event together with whether it was spliced in by a merge.
    pub(crate) fn next_flagged(&mut self) -> Result<Option<(Ev, bool)>, Error> {
        let item = match self.look.take() {
            Some(item) => Some(item),
            None => self.next_impl()?,
        };
        if let Some((ev, _)) = &item {
            self.last_location = ev.location();
        }
        Ok(item)
    }

    pub(crate) fn live(&self) -> &LiveEvents {
        &self.inner
    }
}

impl Events for MergeEvents {
    fn next(&mut self) -> Result<Option<Ev>, Error> {
        Ok(self.next_flagged()?.map(|(ev, _)| ev))
    }

    fn peek(&mut self) -> Result<Option<&Ev>, Error> {
        if self.look.is_none() {
            self.look = self.next_impl()?;
        }
        Ok(self.look.as_ref().map(|(ev, _)| ev))
    }

    fn last_location(&self) -> Location {
        self.last_location
    }
}

/// Unwrap the value of a `<<` entry into the key/value events it contributes.
///
/// Arguments:
/// - `value`: the captured value node (mapping, or sequence of mappings).
/// - `location`: position of the `<<` key.
///
/// Returns:
/// - The entries in precedence order: for a sequence, earlier mappings come first.
fn merge_entries(value: Vec<Ev>, location: Location) -> Result<Vec<Ev>, Error> {
    let shape_error = |at: Location| {
        Error::syntax("merge value must be a mapping or a sequence of mappings").with_location(at)
    };
    match value.first() {
        Some(Ev::MapStart { .. }) => Ok(strip_container(value)),
        Some(Ev::SeqStart { .. }) => {
            let mut entries = Vec::new();
            let mut current: Vec<Ev> = Vec::new();
            let mut depth = 0usize;
            // Skip the sequence's own start and end.
            let inner = &value[1..value.len().saturating_sub(1)];
            for ev in inner {
                if depth == 0 && !matches!(ev, Ev::MapStart { .. }) {
                    return Err(shape_error(ev.location()));
                }
                if ev.is_start() {
                    depth += 1;
                } else if ev.is_end() {
                    depth = depth.saturating_sub(1);
                }
                current.push(ev.clone());
                if depth == 0 {
                    entries.extend(strip_container(std::mem::take(&mut current)));
                }
            }
            Ok(entries)
        }
        Some(ev) if ev.is_null_like() => Ok(Vec::new()),
        Some(ev) => Err(shape_error(ev.location())),
        None => Err(Error::eof().with_location(location)),
    }
}

fn strip_container(mut events: Vec<Ev>) -> Vec<Ev> {
    if events.len() >= 2 {
        events.pop();
        events.remove(0);
        events
    } else {
        Vec::new()
    }
}

/// Open level of the duplicate-key layer.
#[derive(Debug)]
struct KeyLevel {
    level: Level,
    keys: BTreeSet<String>,
}

impl AsMut<Level> for KeyLevel {
    fn as_mut(&mut self) -> &mut Level {
        &mut self.level
    }
}

/// Duplicate-key layer.
pub(crate) struct DedupEvents {
    inner: MergeEvents,
    levels: Vec<KeyLevel>,
    look: Option<Ev>,
    last_location: Location,
    policy: DuplicateKeyPolicy,
}

impl DedupEvents {
    pub(crate) fn new(inner: MergeEvents, policy: DuplicateKeyPolicy) -> Self {
        Self {
            inner,
            levels: Vec::new(),
            look: None,
            last_location: Location::UNKNOWN,
            policy,
        }
    }

    fn next_impl(&mut self) -> Result<Option<Ev>, Error> {
        loop {
            let Some((ev, merged)) = self.inner.next_flagged()? else {
                return Ok(None);
            };
            if let (Some(level), Ev::Scalar { value, .. }) = (self.levels.last_mut(), &ev) {
                if level.level.is_map && level.level.expect_key {
                    if level.keys.contains(value) {
                        if !merged && self.policy == DuplicateKeyPolicy::Error {
                            return Err(Error::syntax(format!("duplicate mapping key `{value}`"))
                                .with_location(ev.location()));
                        }
                        trace!(key = %value, line = ev.location().line(), "dropping duplicate key");
                        skip_one_node(&mut self.inner)?;
                        continue;
                    }
                    level.keys.insert(value.clone());
                }
            }
            self.track(&ev);
            return Ok(Some(ev));
        }
    }

    fn track(&mut self, ev: &Ev) {
        match ev {
            Ev::MapStart { .. } => self.levels.push(KeyLevel {
                level: Level::map(),
                keys: BTreeSet::new(),
            }),
            Ev::SeqStart { .. } => self.levels.push(KeyLevel {
                level: Level::seq(),
                keys: BTreeSet::new(),
            }),
            Ev::Scalar { .. } => after_node(&mut self.levels),
            Ev::MapEnd { .. } | Ev::SeqEnd { .. } => {
                self.levels.pop();
                after_node(&mut self.levels);
            }
        }
    }
}

impl Events for DedupEvents {
    fn next(&mut self) -> Result<Option<Ev>, Error> {
        let ev = match self.look.take() {
            Some(ev) => Some(ev),
            None => self.next_impl()?,
        };
        if let Some(ev) = &ev {
            self.last_location = ev.location();
        }
        Ok(ev)
    }

    fn peek(&mut self) -> Result<Option<&Ev>, Error> {
        if self.look.is_none() {
            self.look = self.next_impl()?;
        }
        Ok(self.look.as_ref())
    }

    fn last_location(&self) -> Location {
        self.last_location
    }
}

/// The composed cursor: duplicate-key ∘ merge-key ∘ anchor ∘ include ∘ raw.
pub(crate) struct Cursor {
    events: DedupEvents,
}

impl Cursor {
    /// Open a cursor over a root document.
    ///
    /// Arguments:
    /// - `text`: document text.
    /// - `path`: file the text came from, if any; used in errors and for cycle detection.
    /// - `dir`: directory relative `!Include` / `!FromFile` names are resolved against.
    /// - `options`: loader options (limits and duplicate-key policy).
    pub(crate) fn open(text: String, path: Option<PathBuf>, dir: PathBuf, options: &Options) -> Self {
        let include = IncludeEvents::new(
            text,
            path,
            dir,
            IncludeLimits {
                max_depth: options.max_include_depth,
                max_file_size: options.max_file_size,
            },
        );
        let live = LiveEvents::new(include, options.alias_limits);
        let merge = MergeEvents::new(live);
        Self {
            events: DedupEvents::new(merge, options.duplicate_keys),
        }
    }

    fn live(&self) -> &LiveEvents {
        self.events.inner.live()
    }

    /// Consume the next node entirely.
    pub(crate) fn skip_node(&mut self) -> Result<(), Error> {
        skip_one_node(&mut self.events)
    }

    /// Scalar anchor value for substitution; see [`LiveEvents::scalar_anchor`].
    pub(crate) fn scalar_anchor(&self, name: &str) -> Result<Option<String>, Error> {
        self.live().scalar_anchor(name)
    }

    /// Directory that names written in `source` are resolved against.
    pub(crate) fn dir_of(&self, source: SourceId) -> &Path {
        self.live().include_layer().dir_of(source)
    }

    pub(crate) fn sources(&self) -> &SourceMap {
        self.live().sources()
    }
}

impl Events for Cursor {
    fn next(&mut self) -> Result<Option<Ev>, Error> {
        self.events.next()
    }

    fn peek(&mut self) -> Result<Option<&Ev>, Error> {
        self.events.peek()
    }

    fn last_location(&self) -> Location {
        self.events.last_location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::*;

    fn cursor(text: &str) -> Cursor {
        Cursor::open(text.to_string(), None, PathBuf::from("."), &Options::default())
    }

    fn drain(c: &mut Cursor) -> Result<Vec<String>, Error> {
        let mut out = Vec::new();
        while let Some(ev) = c.next()? {
            out.push(match ev {
                Ev::Scalar { value, .. } => value,
                Ev::MapStart { .. } => "{".into(),
                Ev::MapEnd { .. } => "}".into(),
                Ev::SeqStart { .. } => "[".into(),
                Ev::SeqEnd { .. } => "]".into(),
            });
        }
        Ok(out)
    }

    #[test]
    fn duplicate_key_first_wins() {
        let mut c = cursor("name: a\nname: b\nother: 1\n");
        assert_eq!(drain(&mut c).unwrap(), vec!["{", "name", "a", "other", "1", "}"]);
    }

    #[test]
    fn duplicate_with_container_value_is_skipped_whole() {
        let mut c = cursor("a: 1\na:\n  x: [1, 2]\nb: 2\n");
        assert_eq!(drain(&mut c).unwrap(), vec!["{", "a", "1", "b", "2", "}"]);
    }

    #[test]
    fn duplicate_key_policy_error() {
        let options = crate::options! { duplicate_keys: DuplicateKeyPolicy::Error };
        let mut c = Cursor::open("a: 1\na: 2\n".into(), None, PathBuf::from("."), &options);
        let err = drain(&mut c).unwrap_err();
        assert!(err.to_string().contains("duplicate mapping key `a`"), "{err}");
    }

    #[test]
    fn keys_are_scoped_per_mapping() {
        let mut c = cursor("a:\n  x: 1\nb:\n  x: 2\n");
        assert_eq!(
            drain(&mut c).unwrap(),
            vec!["{", "a", "{", "x", "1", "}", "b", "{", "x", "2", "}", "}"]
        );
    }

    #[test]
    fn merge_host_keys_take_precedence() {
        let mut c = cursor("base: &b {x: 1, y: 1}\nderived:\n  <<: *b\n  y: 2\n");
        assert_eq!(
            drain(&mut c).unwrap(),
            vec![
                "{", "base", "{", "x", "1", "y", "1", "}", "derived", "{", "y", "2", "x", "1", "}",
                "}"
            ]
        );
    }

    #[test]
    fn merge_list_earlier_mapping_wins() {
        let mut c = cursor("a: &a {k: 1}\nb: &b {k: 2, j: 2}\nc:\n  <<: [*a, *b]\n");
        let out = drain(&mut c).unwrap();
        let tail: Vec<&str> = out.iter().map(String::as_str).skip(13).collect();
        assert_eq!(tail, vec!["c", "{", "k", "1", "j", "2", "}", "}"]);
    }

    #[test]
    fn nested_merge_inside_merged_mapping() {
        let text = "a: &a {x: 1}\nb: &b {<<: *a, y: 2}\nc: {<<: *b}\n";
        let mut c = cursor(text);
        let out = drain(&mut c).unwrap();
        let tail: Vec<&str> = out.iter().map(String::as_str).skip_while(|s| *s != "c").collect();
        assert_eq!(tail, vec!["c", "{", "y", "2", "x", "1", "}", "}"]);
    }

    #[test]
    fn merge_with_scalar_is_syntax_error() {
        let mut c = cursor("a: &a 1\nb:\n  <<: *a\n");
        let err = drain(&mut c).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Syntax);
        assert!(err.to_string().contains("merge value"), "{err}");
    }

    #[test]
    fn merge_list_with_scalar_element_is_syntax_error() {
        let entries = merge_entries(
            vec![seq_start(1), scalar("x", 1), seq_end(1)],
            at(1),
        );
        assert!(entries.is_err());
    }

    #[test]
    fn skip_node_and_peek() {
        let mut c = cursor("a: [1, 2]\nb: 3\n");
        assert!(matches!(c.next().unwrap(), Some(Ev::MapStart { .. })));
        assert!(matches!(c.next().unwrap(), Some(Ev::Scalar { .. })));
        c.skip_node().unwrap();
        assert!(matches!(c.peek().unwrap(), Some(Ev::Scalar { value, .. }) if value == "b"));
    }
}
