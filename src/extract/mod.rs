//! Bounded-memory extraction of one top-level string field from a JSON
//! document, streamed straight to a destination file.
//!
//! The document is read in fixed-size chunks with an incremental UTF-8
//! decoder (multi-byte sequences may span chunk boundaries), fed through the
//! scanner in `machine`, and the decoded field content is buffered and
//! flushed to disk at a fixed threshold, so memory stays bounded no matter
//! how large the field is. The destination file is created only once value
//! content actually starts flowing; on any failure no destination file is
//! left behind.

mod machine;

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use machine::{FieldScanner, Step, ValueSink};

const READ_CHUNK: usize = 64 * 1024;
const FLUSH_THRESHOLD: usize = 16 * 1024;

/// Why an extraction failed. Each variant names the contract that was
/// violated so callers can decide whether a whole-document parse fallback is
/// worth attempting.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The field never appeared at depth 1. This also covers a target value
    /// still open at end of input: observably the two are indistinguishable,
    /// which is documented behavior (and a possible latent defect) rather
    /// than something this implementation second-guesses.
    #[error("field `{0}` not found")]
    FieldNotFound(String),
    #[error("field `{0}` is not a JSON string")]
    NotAString(String),
    #[error("invalid escape in string")]
    MalformedEscape,
    #[error("invalid unicode escape in string")]
    InvalidUnicodeEscape,
    #[error("malformed JSON: {0}")]
    MalformedDocument(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Streams the decoded content of top-level string field `field` from the
/// JSON document at `source` into `dest`, appending a trailing newline unless
/// the content already ends in one.
pub fn extract_field_to_file(
    source: &Path,
    field: &str,
    dest: &Path,
) -> Result<(), ExtractError> {
    extract_with_chunk_size(source, field, dest, READ_CHUNK)
}

/// Same as [`extract_field_to_file`] with an explicit read-chunk size. The
/// result is independent of the chunk size; tests exercise sizes down to one
/// byte.
pub fn extract_with_chunk_size(
    source: &Path,
    field: &str,
    dest: &Path,
    chunk_size: usize,
) -> Result<(), ExtractError> {
    let mut input = File::open(source)?;
    let mut sink = FileSink::new(dest);
    let result = stream_field(&mut input, field, &mut sink, chunk_size.max(1));
    if result.is_err() {
        sink.discard();
    }
    result
}

fn stream_field(
    input: &mut File,
    field: &str,
    sink: &mut FileSink,
    chunk_size: usize,
) -> Result<(), ExtractError> {
    let mut scanner = FieldScanner::new(field);
    let mut buf = vec![0u8; chunk_size];
    // Undecoded tail carried between chunks: at most one incomplete UTF-8
    // sequence (3 bytes).
    let mut carry: Vec<u8> = Vec::new();

    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        carry.extend_from_slice(&buf[..n]);

        let mut offset = 0;
        let finished = loop {
            if offset == carry.len() {
                break false;
            }
            match std::str::from_utf8(&carry[offset..]) {
                Ok(text) => {
                    let done = feed(&mut scanner, text, sink)?;
                    offset = carry.len();
                    break done;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if valid > 0 {
                        let text = decoded_prefix(&carry[offset..offset + valid]);
                        if feed(&mut scanner, text, sink)? {
                            break true;
                        }
                        offset += valid;
                    }
                    match err.error_len() {
                        Some(len) => {
                            // Invalid sequence: a lossy incremental decoder
                            // yields one replacement character for it.
                            offset += len;
                            if scanner.step(char::REPLACEMENT_CHARACTER, sink)? == Step::Finished
                            {
                                break true;
                            }
                        }
                        // Incomplete sequence at the chunk boundary; wait for
                        // the next chunk.
                        None => break false,
                    }
                }
            }
        };
        carry.drain(..offset);
        if finished {
            return Ok(());
        }
    }

    // Trailing incomplete bytes at end of input decode to one replacement
    // character, matching a lossy incremental decoder's flush.
    if !carry.is_empty() && scanner.step(char::REPLACEMENT_CHARACTER, sink)? == Step::Finished {
        return Ok(());
    }

    Err(ExtractError::FieldNotFound(field.to_string()))
}

fn feed(
    scanner: &mut FieldScanner<'_>,
    text: &str,
    sink: &mut FileSink,
) -> Result<bool, ExtractError> {
    for ch in text.chars() {
        if scanner.step(ch, sink)? == Step::Finished {
            return Ok(true);
        }
    }
    Ok(false)
}

/// The slice was verified valid by `from_utf8` above; an empty fallback keeps
/// this total without unreachable panics.
fn decoded_prefix(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).unwrap_or("")
}

/// Buffered file sink for the target value. The destination is opened lazily
/// on the first flush carrying actual content, so a failure before the value
/// starts streaming leaves no artifact; `discard` removes a partially written
/// file after later failures.
struct FileSink {
    path: PathBuf,
    file: Option<File>,
    buf: Vec<u8>,
    ended_with_newline: bool,
}

impl FileSink {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
            buf: Vec::with_capacity(FLUSH_THRESHOLD),
            ended_with_newline: false,
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), ExtractError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.buf.extend_from_slice(bytes);
        self.ended_with_newline = bytes.last() == Some(&b'\n');
        if self.buf.len() >= FLUSH_THRESHOLD {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ExtractError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        if self.file.is_none() {
            self.file = Some(File::create(&self.path)?);
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(&self.buf)?;
        }
        self.buf.clear();
        Ok(())
    }

    fn discard(&mut self) {
        let created = self.file.take().is_some();
        self.buf.clear();
        if created {
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl ValueSink for FileSink {
    fn push_char(&mut self, ch: char) -> Result<(), ExtractError> {
        let mut encoded = [0u8; 4];
        let text = ch.encode_utf8(&mut encoded);
        self.push_bytes(text.as_bytes())
    }

    fn push_surrogate(&mut self, unit: u16) -> Result<(), ExtractError> {
        // WTF-8: the generalized three-byte form that admits lone surrogates.
        self.push_bytes(&[
            0xE0 | (unit >> 12) as u8,
            0x80 | ((unit >> 6) & 0x3F) as u8,
            0x80 | (unit & 0x3F) as u8,
        ])
    }

    fn finish(&mut self) -> Result<(), ExtractError> {
        if !self.ended_with_newline {
            self.buf.push(b'\n');
        }
        self.flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        self.file = None;
        Ok(())
    }
}
