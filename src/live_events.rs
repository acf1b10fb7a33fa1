//!
//! Live events: the anchor layer over the include-splicing event source.
//!
//! Responsibilities
//! - Record anchored nodes and replay them on alias.
//! - Enforce alias-replay limits.
//! - Maintain one-item lookahead and the last seen location.
//! - Serve scalar anchors by name for `$name` substitution.
//!
//! Anchors and aliases
//! - Anchored scalar: store a single `Ev::Scalar` under its key.
//! - Anchored sequence/mapping: open the recording frame, record until the matching end,
//!   then store the buffer. A second anchor inside an open recording is a syntax error.
//! - Alias: push the recorded buffer on the replay stack (`inject`) and serve its events.
//!   Replayed events never start a new recording, but they are recorded into an open one,
//!   so an anchored node that contains an alias stores the expanded content. Enforce:
//!   - `max_total_replayed_events` (document-wide),
//!   - `max_alias_expansions_per_anchor` (per anchor),
//!   - `max_replay_stack_depth` (nested replays).

use ahash::AHashMap;
use tracing::debug;

use crate::error::Error;
use crate::events::{Ev, Events};
use crate::include::{AnchorKey, IncludeEvents, RawEv};
use crate::location::Location;
use crate::options::AliasLimits;
use crate::sources::SourceMap;

/// The frame that records events for an anchored container until its end.
#[derive(Clone, Debug)]
struct RecFrame {
    key: AnchorKey,
    name: Option<String>,
    depth: usize, // counts nested container starts/ends
    buf: Vec<Ev>,
}

/// Anchor-resolving event source.
pub(crate) struct LiveEvents {
    /// Include-splicing source of raw events.
    inner: IncludeEvents,
    /// Single-item lookahead buffer (peeked event not yet consumed).
    look: Option<Ev>,
    /// For alias replay: a stack of injected buffers; we always read from the top first.
    inject: Vec<(Vec<Ev>, usize)>,
    /// Recorded buffers for anchors.
    anchors: AHashMap<AnchorKey, Vec<Ev>>,
    /// Latest anchor registered under each name.
    names: AHashMap<String, AnchorKey>,
    /// Recording frame for the currently open anchored container.
    rec: Option<RecFrame>,

    /// Location of the last yielded event (for better error reporting).
    last_location: Location,

    /// Hard limit configuration for alias replaying.
    alias_limits: AliasLimits,
    /// Total number of replayed events across the whole stream (enforced by `alias_limits`).
    total_replayed_events: usize,
    /// Per-anchor replay expansion counters.
    per_anchor_expansions: AHashMap<AnchorKey, usize>,
}

impl LiveEvents {
    pub(crate) fn new(inner: IncludeEvents, alias_limits: AliasLimits) -> Self {
        Self {
            inner,
            look: None,
            inject: Vec::new(),
            anchors: AHashMap::new(),
            names: AHashMap::new(),
            rec: None,
            last_location: Location::UNKNOWN,
            alias_limits,
            total_replayed_events: 0,
            per_anchor_expansions: AHashMap::new(),
        }
    }

    pub(crate) fn sources(&self) -> &SourceMap {
        self.inner.sources()
    }

    pub(crate) fn include_layer(&self) -> &IncludeEvents {
        &self.inner
    }

    /// Value of the scalar anchor `name`, for substitution.
    ///
    /// Returns:
    /// - `Ok(None)` when no completed anchor has that name.
    /// - A syntax error when the anchor names a mapping or a sequence.
    pub(crate) fn scalar_anchor(&self, name: &str) -> Result<Option<String>, Error> {
        let Some(key) = self.names.get(name) else {
            return Ok(None);
        };
        match self.anchors.get(key).map(Vec::as_slice) {
            Some([Ev::Scalar { value, .. }]) => Ok(Some(value.clone())),
            Some(_) => Err(Error::syntax(format!(
                "anchor `{name}` is not a scalar: only scalar anchors can be substituted, \
                 use `*{name}` to dereference complex anchors"
            ))),
            None => Ok(None),
        }
    }

    /// Core event pump: pulls the next logical event.
    ///
    /// Order of precedence:
    /// - If there is an injected replay buffer (from an alias), serve from it first.
    /// - Otherwise, pull from the include layer.
    fn next_impl(&mut self) -> Result<Option<Ev>, Error> {
        loop {
            // 1) Serve from injected buffers first (alias replay)
            if let Some((buf, idx)) = self.inject.last_mut() {
                if *idx < buf.len() {
                    let ev = buf[*idx].clone();
                    *idx += 1;
                    if *idx == buf.len() {
                        self.inject.pop();
                    }
                    // Count replayed events for alias-bomb hardening.
                    self.total_replayed_events = self.total_replayed_events.saturating_add(1);
                    if self.total_replayed_events > self.alias_limits.max_total_replayed_events {
                        return Err(Error::syntax(format!(
                            "alias replay limit exceeded: total_replayed_events={} > {}",
                            self.total_replayed_events, self.alias_limits.max_total_replayed_events
                        ))
                        .with_location(ev.location()));
                    }
                    self.record(&ev).map_err(|err| err.with_location(ev.location()))?;
                    self.last_location = ev.location();
                    return Ok(Some(ev));
                }
                self.inject.pop();
                continue;
            }

            // 2) Pull from the include layer
            let Some(raw) = self.inner.next_raw()? else {
                return Ok(None);
            };
            match raw {
                RawEv::Node { ev, anchor } => {
                    let location = ev.location();
                    if let Some(anchor) = anchor {
                        if self.rec.is_some() {
                            return Err(Error::syntax(
                                "nested anchors are not supported: an anchored node may not contain another anchor",
                            )
                            .with_location(location));
                        }
                        if ev.is_start() {
                            self.rec = Some(RecFrame {
                                key: anchor.key,
                                name: anchor.name,
                                depth: 1,
                                buf: vec![ev.clone()],
                            });
                        } else {
                            self.finish_anchor(anchor.key, anchor.name, vec![ev.clone()]);
                        }
                    } else {
                        self.record(&ev).map_err(|err| err.with_location(location))?;
                    }
                    self.last_location = location;
                    return Ok(Some(ev));
                }
                RawEv::Alias { key, location } => {
                    // Alias replay hardening.
                    let buf = self
                        .anchors
                        .get(&key)
                        .ok_or_else(|| {
                            Error::syntax("alias refers to an anchor that is not complete yet")
                                .with_location(location)
                        })?
                        .clone();

                    let count = self
                        .per_anchor_expansions
                        .entry(key)
                        .and_modify(|c| *c += 1)
                        .or_insert(1);
                    if *count > self.alias_limits.max_alias_expansions_per_anchor {
                        return Err(Error::syntax(format!(
                            "alias expansion limit exceeded for anchor: {} > {}",
                            count, self.alias_limits.max_alias_expansions_per_anchor
                        ))
                        .with_location(location));
                    }

                    // Push for replay; enforce stack depth limit.
                    let next_depth = self.inject.len() + 1;
                    if next_depth > self.alias_limits.max_replay_stack_depth {
                        return Err(Error::syntax(format!(
                            "alias replay stack depth exceeded: depth={} > {}",
                            next_depth, self.alias_limits.max_replay_stack_depth
                        ))
                        .with_location(location));
                    }
                    self.inject.push((buf, 0));
                }
            }
        }
    }

    /// Record an event into the open recording frame and close it at its matching end.
    fn record(&mut self, ev: &Ev) -> Result<(), Error> {
        let Some(frame) = self.rec.as_mut() else {
            return Ok(());
        };
        frame.buf.push(ev.clone());
        if ev.is_start() {
            frame.depth += 1;
        } else if ev.is_end() {
            if frame.depth == 0 {
                return Err(Error::assertion("anchor recording depth underflow"));
            }
            frame.depth -= 1;
            if frame.depth == 0 {
                if let Some(done) = self.rec.take() {
                    self.finish_anchor(done.key, done.name, done.buf);
                }
            }
        }
        Ok(())
    }

    fn finish_anchor(&mut self, key: AnchorKey, name: Option<String>, buf: Vec<Ev>) {
        debug!(anchor = name.as_deref().unwrap_or("?"), events = buf.len(), "anchor recorded");
        if let Some(name) = name {
            self.names.insert(name, key);
        }
        self.anchors.insert(key, buf);
    }
}

impl Events for LiveEvents {
    /// Get the next event, using the lookahead buffer if present.
    fn next(&mut self) -> Result<Option<Ev>, Error> {
        if let Some(ev) = self.look.take() {
            self.last_location = ev.location();
            return Ok(Some(ev));
        }
        self.next_impl()
    }

    /// Peek at the next event without consuming it, filling the lookahead buffer if empty.
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

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::include::IncludeLimits;

    fn live(text: &str) -> LiveEvents {
        let inner = IncludeEvents::new(
            text.to_string(),
            None,
            PathBuf::from("."),
            IncludeLimits {
                max_depth: 8,
                max_file_size: None,
            },
        );
        LiveEvents::new(inner, AliasLimits::default())
    }

    fn drain(events: &mut LiveEvents) -> Result<Vec<Ev>, Error> {
        let mut out = Vec::new();
        while let Some(ev) = events.next()? {
            out.push(ev);
        }
        Ok(out)
    }

    fn values(events: &[Ev]) -> Vec<&str> {
        events
            .iter()
            .map(|e| match e {
                Ev::Scalar { value, .. } => value.as_str(),
                Ev::MapStart { .. } => "{",
                Ev::MapEnd { .. } => "}",
                Ev::SeqStart { .. } => "[",
                Ev::SeqEnd { .. } => "]",
            })
            .collect()
    }

    #[test]
    fn scalar_alias_is_replayed() {
        let mut events = live("a: &x hello\nb: *x\n");
        let out = drain(&mut events).unwrap();
        assert_eq!(values(&out), vec!["{", "a", "hello", "b", "hello", "}"]);
        assert_eq!(events.scalar_anchor("x").unwrap(), Some("hello".to_string()));
    }

    #[test]
    fn mapping_alias_is_replayed_with_origin_locations() {
        let mut events = live("base: &b\n  k: 1\nother: *b\n");
        let out = drain(&mut events).unwrap();
        assert_eq!(
            values(&out),
            vec!["{", "base", "{", "k", "1", "}", "other", "{", "k", "1", "}", "}"]
        );
        // The replayed `k` keeps the line it was written on.
        let replayed_k = &out[8];
        assert_eq!(replayed_k.location().line(), 2);
    }

    #[test]
    fn complex_anchor_cannot_be_substituted() {
        let mut events = live("base: &b\n  k: 1\n");
        drain(&mut events).unwrap();
        assert!(events.scalar_anchor("b").is_err());
        assert_eq!(events.scalar_anchor("missing").unwrap(), None);
    }

    #[test]
    fn nested_anchor_is_rejected() {
        let mut events = live("base: &b\n  k: &k 1\n");
        let err = drain(&mut events).unwrap_err();
        assert!(err.to_string().contains("nested anchors"), "{err}");
    }

    #[test]
    fn recorded_anchor_contains_expanded_alias() {
        let mut events = live("a: &a 1\nb: &b [*a, 2]\nc: *b\n");
        let out = drain(&mut events).unwrap();
        assert_eq!(
            values(&out),
            vec!["{", "a", "1", "b", "[", "1", "2", "]", "c", "[", "1", "2", "]", "}"]
        );
    }

    #[test]
    fn expansion_limit_per_anchor() {
        let inner = IncludeEvents::new(
            "a: &a 1\nb: *a\nc: *a\n".to_string(),
            None,
            PathBuf::from("."),
            IncludeLimits {
                max_depth: 8,
                max_file_size: None,
            },
        );
        let limits = AliasLimits {
            max_alias_expansions_per_anchor: 1,
            ..AliasLimits::default()
        };
        let mut events = LiveEvents::new(inner, limits);
        assert!(drain(&mut events).is_err());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut events = live("[1, 2]\n");
        assert!(matches!(events.peek().unwrap(), Some(Ev::SeqStart { .. })));
        assert!(matches!(events.next().unwrap(), Some(Ev::SeqStart { .. })));
    }
}
