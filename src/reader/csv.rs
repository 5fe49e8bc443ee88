//! Delimited-text reader
//!
//! The encoding is chosen from the byte-order mark (UTF-8, UTF-16LE,
//! UTF-16BE). Files without a BOM are decoded as EUC-KR.
//!
//! The csv parser skips blank lines on its own. A blank line after the first
//! content line is still a row here (counted as empty, or written as one when
//! `skipEmptyRows` is off), so [`BlankLineMarker`] rewrites it as `""` before
//! parsing.

use super::{RowEmitter, RowHandler};
use crate::error::{ConvertError, ConvertResult};
use crate::types::OutputOptions;
use encoding_rs::{Encoding, EUC_KR};
use encoding_rs_io::DecodeReaderBytesBuilder;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Code page assumed when a file carries no byte-order mark
pub const FALLBACK_ENCODING: &Encoding = EUC_KR;

pub fn read(path: &Path, options: &OutputOptions, handler: &mut dyn RowHandler) -> ConvertResult<u64> {
    let file = File::open(path)
        .map_err(|e| ConvertError::Read(format!("Failed to open {}: {}", path.display(), e)))?;

    let decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(FALLBACK_ENCODING))
        .bom_override(true)
        .strip_bom(true)
        .build(BufReader::new(file));

    let delimiter = options.delimiter_byte()?;
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(BlankLineMarker::new(decoder, delimiter));

    let mut emitter = RowEmitter::new(options, handler);
    let mut header_seen = false;

    for record in reader.records() {
        let record = record.map_err(|e| {
            ConvertError::Read(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        let cells: Vec<String> = record.iter().map(str::to_string).collect();

        if !header_seen {
            header_seen = true;
            emitter.header(cells)?;
            if emitter.stopped() {
                break;
            }
        } else {
            emitter.row(cells)?;
        }
    }

    Ok(emitter.emitted())
}

/// Rewrites blank lines outside quoted fields as a lone `""` field.
///
/// Blank lines before the first content line are left alone so the header is
/// still the first non-blank line. `\r\n`, `\n` and `\r` all end a line.
struct BlankLineMarker<R> {
    inner: R,
    delimiter: u8,
    chunk: Vec<u8>,
    pending: Vec<u8>,
    pos: usize,
    prev: Option<u8>,
    in_quotes: bool,
    seen_content: bool,
}

impl<R: Read> BlankLineMarker<R> {
    fn new(inner: R, delimiter: u8) -> Self {
        Self {
            inner,
            delimiter,
            chunk: vec![0; 8192],
            pending: Vec::new(),
            pos: 0,
            prev: None,
            in_quotes: false,
            seen_content: false,
        }
    }

    fn mark(&mut self, read: usize) {
        self.pending.clear();
        self.pos = 0;
        for i in 0..read {
            let b = self.chunk[i];
            let newline = b == b'\n' || b == b'\r';

            if self.in_quotes {
                if b == b'"' {
                    self.in_quotes = false;
                }
            } else if newline {
                let at_line_start = matches!(self.prev, Some(b'\n') | Some(b'\r'));
                let crlf_tail = b == b'\n' && self.prev == Some(b'\r');
                if at_line_start && !crlf_tail && self.seen_content {
                    self.pending.extend_from_slice(b"\"\"");
                }
            } else if b == b'"' {
                let field_start = match self.prev {
                    None => true,
                    Some(p) => p == self.delimiter || p == b'\n' || p == b'\r' || p == b'"',
                };
                self.in_quotes = field_start;
            }

            if !newline {
                self.seen_content = true;
            }
            self.pending.push(b);
            self.prev = Some(b);
        }
    }
}

impl<R: Read> Read for BlankLineMarker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.pending.len() {
            let read = self.inner.read(&mut self.chunk)?;
            if read == 0 {
                return Ok(0);
            }
            self.mark(read);
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
