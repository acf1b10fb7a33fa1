//! Raw parsing and `!Include` splicing.
//!
//! The bottom of the cursor stack. It owns one `saphyr_parser::Parser` per open file, hides
//! stream and document markers, and replaces every `!Include`-tagged scalar with the root
//! node of the named file. Files are resolved against the directory of the file that
//! contains the `!Include`. Circular includes are rejected.
//!
//! Anchors and aliases are passed up untouched (as parser ids qualified by the file they
//! come from); the anchor layer above records and replays them.

use std::fs;
use std::path::{Path, PathBuf};

use saphyr_parser::{BufferedInput, Event, Parser};
use tracing::debug;

use crate::error::Error;
use crate::events::Ev;
use crate::location::{Location, SourceId, location_from_span};
use crate::sources::{SourceMap, parent_dir, read_text, resolve_relative};
use crate::tags::{TAG_INCLUDE, tag_to_string};

/// Parser anchor id qualified by the file it was declared in.
pub(crate) type AnchorKey = (SourceId, usize);

/// Anchor declared on a node.
#[derive(Clone, Debug)]
pub(crate) struct Anchor {
    pub(crate) key: AnchorKey,
    /// Name as written after `&`, recovered from the source text.
    pub(crate) name: Option<String>,
}

/// Event produced by the include layer.
#[derive(Debug)]
pub(crate) enum RawEv {
    Node { ev: Ev, anchor: Option<Anchor> },
    Alias { key: AnchorKey, location: Location },
}

type CharParser = Parser<'static, BufferedInput<std::vec::IntoIter<char>>>;

/// One open file on the include stack.
struct FileFrame {
    parser: CharParser,
    source: SourceId,
    /// Canonical path, used for cycle detection. `None` for in-memory input.
    canonical: Option<PathBuf>,
    /// Source text as characters; parser markers index into it.
    chars: Vec<char>,
    documents: usize,
    /// Whether the root node of this file has been seen.
    produced: bool,
    /// Anchor written on the `!Include` scalar; handed to the included root node.
    inherited_anchor: Option<Anchor>,
    /// Position of the `!Include` scalar that opened this frame.
    opened_at: Location,
}

impl FileFrame {
    fn new(text: &str, source: SourceId, canonical: Option<PathBuf>, opened_at: Location) -> Self {
        let chars: Vec<char> = text.chars().collect();
        Self {
            parser: Parser::new_from_iter(chars.clone().into_iter()),
            source,
            canonical,
            chars,
            documents: 0,
            produced: false,
            inherited_anchor: None,
            opened_at,
        }
    }
}

/// Limits applied while splicing includes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct IncludeLimits {
    pub(crate) max_depth: usize,
    pub(crate) max_file_size: Option<u64>,
}

/// Include-splicing event source.
pub(crate) struct IncludeEvents {
    frames: Vec<FileFrame>,
    sources: SourceMap,
    /// Directory relative names are resolved against, per source.
    dirs: Vec<PathBuf>,
    limits: IncludeLimits,
}

impl IncludeEvents {
    /// Start parsing a root document.
    ///
    /// Arguments:
    /// - `text`: document text.
    /// - `path`: file the text was read from, if any.
    /// - `dir`: directory for resolving relative `!Include` / `!FromFile` names.
    pub(crate) fn new(text: String, path: Option<PathBuf>, dir: PathBuf, limits: IncludeLimits) -> Self {
        let canonical = path.as_ref().and_then(|p| fs::canonicalize(p).ok());
        let mut sources = SourceMap::default();
        let frame_text = text.clone();
        let source = sources.add(path, text);
        Self {
            frames: vec![FileFrame::new(&frame_text, source, canonical, Location::UNKNOWN)],
            sources,
            dirs: vec![dir],
            limits,
        }
    }

    pub(crate) fn sources(&self) -> &SourceMap {
        &self.sources
    }

    /// Directory against which names found in `source` are resolved.
    pub(crate) fn dir_of(&self, source: SourceId) -> &Path {
        self.dirs
            .get(source.index())
            .or_else(|| self.dirs.first())
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new("."))
    }

    /// Pull the next event, descending into included files as needed.
    ///
    /// Returns `Ok(None)` once the root file is exhausted.
    pub(crate) fn next_raw(&mut self) -> Result<Option<RawEv>, Error> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(None);
            };
            let source = frame.source;
            let (event, span) = match frame.parser.next() {
                Some(item) => item.map_err(|e| Error::from_scan_error(e, source))?,
                None => {
                    self.pop_frame()?;
                    continue;
                }
            };
            let location = location_from_span(&span, source);
            let index = span.start.index();

            match event {
                Event::StreamStart | Event::DocumentEnd | Event::Nothing => continue,
                Event::StreamEnd => {
                    self.pop_frame()?;
                    continue;
                }
                Event::DocumentStart(_) => {
                    frame.documents += 1;
                    if frame.documents > 1 {
                        return Err(Error::syntax("multiple documents in one file are not supported")
                            .with_location(location));
                    }
                    continue;
                }
                Event::Alias(id) => {
                    frame.produced = true;
                    return Ok(Some(RawEv::Alias {
                        key: (source, id),
                        location,
                    }));
                }
                Event::Scalar(value, style, anchor_id, tag) => {
                    let tag = tag_to_string(tag);
                    let anchor = Self::anchor_of(frame, anchor_id, index);
                    if tag.as_deref() == Some(TAG_INCLUDE) {
                        self.open_include(&value, anchor, location)?;
                        continue;
                    }
                    let ev = Ev::Scalar {
                        value: value.into_owned(),
                        tag,
                        style,
                        location,
                    };
                    return Ok(Some(RawEv::Node { ev, anchor }));
                }
                Event::SequenceStart(anchor_id, tag) => {
                    let anchor = Self::anchor_of(frame, anchor_id, index);
                    let ev = Ev::SeqStart {
                        tag: tag_to_string(tag),
                        location,
                    };
                    return Ok(Some(RawEv::Node { ev, anchor }));
                }
                Event::MappingStart(anchor_id, tag) => {
                    let anchor = Self::anchor_of(frame, anchor_id, index);
                    let ev = Ev::MapStart {
                        tag: tag_to_string(tag),
                        location,
                    };
                    return Ok(Some(RawEv::Node { ev, anchor }));
                }
                Event::SequenceEnd => {
                    return Ok(Some(RawEv::Node {
                        ev: Ev::SeqEnd { location },
                        anchor: None,
                    }));
                }
                Event::MappingEnd => {
                    return Ok(Some(RawEv::Node {
                        ev: Ev::MapEnd { location },
                        anchor: None,
                    }));
                }
            }
        }
    }

    /// Anchor for a node event; the root node of an included file also receives the anchor
    /// written on its `!Include` scalar.
    fn anchor_of(frame: &mut FileFrame, anchor_id: usize, index: usize) -> Option<Anchor> {
        let first = !frame.produced;
        frame.produced = true;
        let own = (anchor_id != 0).then(|| Anchor {
            key: (frame.source, anchor_id),
            name: anchor_name_before(&frame.chars, index),
        });
        if first {
            own.or_else(|| frame.inherited_anchor.take())
        } else {
            own
        }
    }

    /// Open `name` and push it on the include stack.
    fn open_include(&mut self, name: &str, anchor: Option<Anchor>, location: Location) -> Result<(), Error> {
        if self.frames.len() > self.limits.max_depth {
            return Err(Error::syntax(format!(
                "include depth limit exceeded: {} > {}",
                self.frames.len(),
                self.limits.max_depth
            ))
            .with_location(location));
        }
        let path = resolve_relative(self.dir_of(location.source()), name);
        let canonical = fs::canonicalize(&path).map_err(|e| Error::io(&path, e).with_location(location))?;
        if self
            .frames
            .iter()
            .any(|f| f.canonical.as_deref() == Some(canonical.as_path()))
        {
            return Err(Error::syntax(format!("circular include of `{}`", path.display()))
                .with_location(location));
        }
        let text = read_text(&path, self.limits.max_file_size).map_err(|e| e.with_location(location))?;
        debug!(file = %path.display(), depth = self.frames.len(), "including file");

        let source = self.sources.add(Some(path.clone()), text.clone());
        self.dirs.push(parent_dir(&path));
        let mut frame = FileFrame::new(&text, source, Some(canonical), location);
        frame.inherited_anchor = anchor;
        self.frames.push(frame);
        Ok(())
    }

    /// Close the top file. An included file must have produced a node.
    fn pop_frame(&mut self) -> Result<(), Error> {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        if self.frames.is_empty() {
            return Ok(());
        }
        if !frame.produced {
            let name = self
                .sources
                .get(frame.source)
                .map(|s| s.display_name())
                .unwrap_or_default();
            return Err(Error::syntax(format!("included file `{name}` contains no document"))
                .with_location(frame.opened_at));
        }
        debug!(source = frame.source.index(), "include finished");
        Ok(())
    }
}

/// Recover the anchor name written before the node at char `index`.
///
/// The parser reports anchors as numeric ids only; the name is needed for `$name`
/// substitution. Looks back over whitespace, comments and tags for a `&name` token.
fn anchor_name_before(chars: &[char], index: usize) -> Option<String> {
    let mut end = index.min(chars.len());
    for _ in 0..16 {
        while end > 0 && chars[end - 1].is_whitespace() {
            end -= 1;
        }
        if end == 0 {
            return None;
        }
        let line_start = chars[..end]
            .iter()
            .rposition(|c| *c == '\n')
            .map(|p| p + 1)
            .unwrap_or(0);
        if let Some(p) = comment_start(&chars[line_start..end]).map(|p| line_start + p) {
            end = p;
            continue;
        }
        let mut start = end;
        while start > line_start && !is_token_separator(chars[start - 1]) {
            start -= 1;
        }
        let token: String = chars[start..end].iter().collect();
        if let Some(name) = token.strip_prefix('&') {
            return (!name.is_empty()).then(|| name.to_string());
        }
        if token.starts_with('!') {
            end = start;
            continue;
        }
        return None;
    }
    None
}

/// Position of a `#` comment in `line`, skipping `#` inside quoted scalars.
fn comment_start(line: &[char]) -> Option<usize> {
    let mut quote = None;
    let mut p = 0;
    while p < line.len() {
        let c = line[p];
        let after_separator = p == 0 || is_token_separator(line[p - 1]) || line[p - 1] == ':';
        match (quote, c) {
            (Some('"'), '\\') => p += 1,
            (Some('\''), '\'') if line.get(p + 1) == Some(&'\'') => p += 1,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if after_separator => quote = Some(c),
            (None, '#') if p == 0 || line[p - 1].is_whitespace() => return Some(p),
            (None, _) => {}
        }
        p += 1;
    }
    None
}

fn is_token_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '[' | '{' | ',')
}
