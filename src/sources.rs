//! Files read during one load: their names, their text and how to read them.
//!
//! Every file gets a [`SourceId`]; locations carry that id so that an error raised while
//! matching an included file (or content replayed from it) names the right file.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::error::Error;
use crate::location::SourceId;

/// One loaded file.
#[derive(Debug, Clone)]
pub(crate) struct SourceEntry {
    path: Option<PathBuf>,
    text: String,
}

impl SourceEntry {
    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    /// Name shown in snippet headers.
    pub(crate) fn display_name(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "<input>".to_string(),
        }
    }
}

/// Registry of every file read during one load.
#[derive(Debug, Default, Clone)]
pub(crate) struct SourceMap {
    entries: Vec<SourceEntry>,
}

impl SourceMap {
    /// Register a text and return its id. The first registered text is [`SourceId::ROOT`].
    pub(crate) fn add(&mut self, path: Option<PathBuf>, text: String) -> SourceId {
        let id = SourceId(self.entries.len() as u32);
        self.entries.push(SourceEntry { path, text });
        id
    }

    pub(crate) fn get(&self, id: SourceId) -> Option<&SourceEntry> {
        self.entries.get(id.index())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Resolve `name` against `dir` unless it is absolute.
///
/// Called by:
/// - The include layer for `!Include` and the matcher for `!FromFile`.
pub(crate) fn resolve_relative(dir: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

/// Directory a file's relative references are resolved against.
pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Read a text file, sniffing a BOM to decode UTF-16 input.
///
/// Arguments:
/// - `path`: file to read.
/// - `max_size`: optional byte cap on the decoded text.
///
/// Returns:
/// - The decoded text, or an `Io` error naming `path`.
pub(crate) fn read_text(path: &Path, max_size: Option<u64>) -> Result<String, Error> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    // Auto-detect encoding (BOM or guess), decode to UTF-8 on the fly.
    let decoder = DecodeReaderBytesBuilder::new().encoding(None).build(file);
    let mut text = String::new();
    match max_size {
        Some(limit) => {
            decoder
                .take(limit.saturating_add(1))
                .read_to_string(&mut text)
                .map_err(|e| Error::io(path, e))?;
            if text.len() as u64 > limit {
                return Err(Error::io(path, too_large(limit)));
            }
        }
        None => {
            let mut decoder = decoder;
            decoder
                .read_to_string(&mut text)
                .map_err(|e| Error::io(path, e))?;
        }
    }
    Ok(text)
}

/// Read a file as raw bytes, without any decoding (`!FromFile`).
pub(crate) fn read_bytes(path: &Path, max_size: Option<u64>) -> Result<Vec<u8>, Error> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut data = Vec::new();
    match max_size {
        Some(limit) => {
            file.take(limit.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|e| Error::io(path, e))?;
            if data.len() as u64 > limit {
                return Err(Error::io(path, too_large(limit)));
            }
        }
        None => {
            let mut file = file;
            file.read_to_end(&mut data).map_err(|e| Error::io(path, e))?;
        }
    }
    Ok(data)
}

fn too_large(limit: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("file is larger than the configured limit of {limit} bytes"),
    )
}
