//! Delimited-text writer
//!
//! `UTF-8-BOM` writes a byte-order mark first, `UTF-8` writes plain UTF-8, and
//! any other label is looked up as a legacy code page and transcoded while
//! streaming. Characters the code page cannot represent become `?`.

use crate::error::{ConvertError, ConvertResult};
use crate::types::OutputOptions;
use ::csv::{QuoteStyle, Terminator, Writer, WriterBuilder};
use encoding_rs::{Encoder, EncoderResult, Encoding, UTF_16BE, UTF_16LE, UTF_8};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Output text encoding resolved from a profile label
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextEncoding {
    Utf8 { bom: bool },
    Legacy(&'static Encoding),
}

impl TextEncoding {
    pub fn from_label(label: &str) -> ConvertResult<Self> {
        let label = label.trim();
        if label.is_empty()
            || label.eq_ignore_ascii_case("UTF-8-BOM")
            || label.eq_ignore_ascii_case("UTF8-BOM")
        {
            return Ok(TextEncoding::Utf8 { bom: true });
        }

        match Encoding::for_label(label.as_bytes()) {
            Some(enc) if enc == UTF_8 => Ok(TextEncoding::Utf8 { bom: false }),
            Some(enc) if enc == UTF_16LE || enc == UTF_16BE => Err(ConvertError::Write(format!(
                "Output encoding {} is not supported",
                label
            ))),
            Some(enc) => Ok(TextEncoding::Legacy(enc)),
            None => Err(ConvertError::Write(format!(
                "Unknown output encoding: {}",
                label
            ))),
        }
    }
}

/// Byte stream under the CSV writer
enum Target {
    Plain(BufWriter<File>),
    Transcoded(TranscodingWriter<BufWriter<File>>),
}

impl Write for Target {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Target::Plain(w) => w.write(buf),
            Target::Transcoded(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Target::Plain(w) => w.flush(),
            Target::Transcoded(w) => w.flush(),
        }
    }
}

impl Target {
    fn finish(self) -> io::Result<()> {
        match self {
            Target::Plain(mut w) => w.flush(),
            Target::Transcoded(w) => w.finish()?.flush(),
        }
    }
}

pub struct CsvSink {
    writer: Writer<Target>,
}

impl CsvSink {
    pub fn open(path: &Path, options: &OutputOptions) -> ConvertResult<Self> {
        let encoding = TextEncoding::from_label(&options.output_encoding)?;
        let delimiter = options.delimiter_byte()?;

        let file = File::create(path).map_err(|e| {
            ConvertError::Write(format!("Failed to create {}: {}", path.display(), e))
        })?;
        let mut out = BufWriter::new(file);

        let target = match encoding {
            TextEncoding::Utf8 { bom } => {
                if bom {
                    out.write_all(UTF8_BOM).map_err(write_error)?;
                }
                Target::Plain(out)
            }
            TextEncoding::Legacy(enc) => Target::Transcoded(TranscodingWriter::new(out, enc)),
        };

        let writer = WriterBuilder::new()
            .delimiter(delimiter)
            .quote_style(if options.quote_all {
                QuoteStyle::Always
            } else {
                QuoteStyle::Necessary
            })
            .terminator(Terminator::Any(b'\n'))
            .flexible(true)
            .from_writer(target);

        Ok(Self { writer })
    }

    pub fn write_header(&mut self, columns: &[String]) -> ConvertResult<()> {
        self.write_row(columns)
    }

    pub fn write_row(&mut self, values: &[String]) -> ConvertResult<()> {
        self.writer
            .write_record(values)
            .map_err(|e| ConvertError::Write(format!("Failed to write CSV record: {}", e)))
    }

    pub fn close(self) -> ConvertResult<()> {
        let target = self
            .writer
            .into_inner()
            .map_err(|e| ConvertError::Write(format!("Failed to flush CSV output: {}", e.error())))?;
        target.finish().map_err(write_error)
    }
}

fn write_error(e: io::Error) -> ConvertError {
    ConvertError::Write(format!("Failed to write CSV output: {}", e))
}

/// Accepts UTF-8 bytes and writes them re-encoded in a legacy code page.
///
/// Input may be split anywhere, including inside a multi-byte sequence.
pub struct TranscodingWriter<W: Write> {
    inner: W,
    encoder: Encoder,
    pending: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    pub fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoder: encoding.new_encoder(),
            pending: Vec::new(),
        }
    }

    fn encode(&mut self, mut text: &str, last: bool) -> io::Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            let (result, read, written) =
                self.encoder
                    .encode_from_utf8_without_replacement(text, &mut buf, last);
            self.inner.write_all(&buf[..written])?;
            text = &text[read..];
            match result {
                EncoderResult::InputEmpty => return Ok(()),
                EncoderResult::OutputFull => {}
                EncoderResult::Unmappable(_) => self.inner.write_all(b"?")?,
            }
        }
    }

    /// Flush the encoder state and return the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        if !self.pending.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "incomplete UTF-8 sequence at end of output",
            ));
        }
        self.encode("", true)?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        };

        let chunk: Vec<u8> = self.pending.drain(..valid).collect();
        let text = std::str::from_utf8(&chunk)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.encode(text, false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::EUC_KR;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn write_file(options: &OutputOptions, rows: &[Vec<String>]) -> Vec<u8> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path, options).unwrap();
        sink.write_header(&rows[0]).unwrap();
        for row in &rows[1..] {
            sink.write_row(row).unwrap();
        }
        sink.close().unwrap();
        fs::read(&path).unwrap()
    }

    #[test]
    fn test_encoding_labels() {
        assert_eq!(
            TextEncoding::from_label("UTF-8-BOM").unwrap(),
            TextEncoding::Utf8 { bom: true }
        );
        assert_eq!(
            TextEncoding::from_label("utf-8").unwrap(),
            TextEncoding::Utf8 { bom: false }
        );
        assert_eq!(
            TextEncoding::from_label("EUC-KR").unwrap(),
            TextEncoding::Legacy(EUC_KR)
        );
        assert!(TextEncoding::from_label("klingon").is_err());
        assert!(TextEncoding::from_label("UTF-16LE").is_err());
    }

    #[test]
    fn test_bom_and_minimal_quoting() {
        let bytes = write_file(
            &OutputOptions::default(),
            &[strings(&["id", "name"]), strings(&["1", "Kim, Minsu"])],
        );
        assert_eq!(&bytes[..3], UTF8_BOM);
        assert_eq!(
            String::from_utf8(bytes[3..].to_vec()).unwrap(),
            "id,name\n1,\"Kim, Minsu\"\n"
        );
    }

    #[test]
    fn test_plain_utf8_quote_all_and_delimiter() {
        let options = OutputOptions {
            output_encoding: "UTF-8".to_string(),
            quote_all: true,
            delimiter: "\t".to_string(),
            ..OutputOptions::default()
        };
        let bytes = write_file(&options, &[strings(&["a", "b"]), strings(&["1", ""])]);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "\"a\"\t\"b\"\n\"1\"\t\"\"\n"
        );
    }

    #[test]
    fn test_euc_kr_output() {
        let options = OutputOptions {
            output_encoding: "EUC-KR".to_string(),
            ..OutputOptions::default()
        };
        let bytes = write_file(&options, &[strings(&["이름"]), strings(&["서울"])]);
        let (decoded, _, had_errors) = EUC_KR.decode(&bytes);
        assert!(!had_errors);
        assert_eq!(decoded, "이름\n서울\n");
    }

    #[test]
    fn test_transcoder_handles_split_sequences_and_unmappable() {
        let mut writer = TranscodingWriter::new(Vec::new(), EUC_KR);
        let bytes = "가😀".as_bytes();
        writer.write_all(&bytes[..2]).unwrap();
        writer.write_all(&bytes[2..]).unwrap();
        let out = writer.finish().unwrap();
        let (decoded, _, _) = EUC_KR.decode(&out);
        assert_eq!(decoded, "가?");
    }

    #[test]
    fn test_unknown_encoding_fails_at_open() {
        let dir = TempDir::new().unwrap();
        let options = OutputOptions {
            output_encoding: "no-such-charset".to_string(),
            ..OutputOptions::default()
        };
        let err = CsvSink::open(&dir.path().join("x.csv"), &options).err().unwrap();
        assert!(err.is_write_failure());
    }
}
