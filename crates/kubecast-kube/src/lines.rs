//! Newline framing for watch bodies
//!
//! Unlike `LinesCodec`, an over-long line is reported as [`Line::Oversized`]
//! and skipped, so the frames after it still decode.

use bytes::BytesMut;
use std::io;
use tokio_util::codec::Decoder;

/// One framed watch line
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Line {
    /// Line content without the terminator
    Frame(String),
    /// A line longer than the limit; its bytes were discarded
    Oversized,
}

#[derive(Debug)]
pub(crate) struct WatchLines {
    max_length: usize,
    /// Bytes already scanned for a newline
    next_index: usize,
    /// Inside an oversized line, dropping input until its newline
    discarding: bool,
}

impl WatchLines {
    pub(crate) fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Decoder for WatchLines {
    type Item = Line;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, io::Error> {
        let newline = buf[self.next_index..].iter().position(|b| *b == b'\n');

        match newline {
            Some(offset) => {
                let end = self.next_index + offset;
                let line = buf.split_to(end + 1);
                self.next_index = 0;
                if std::mem::take(&mut self.discarding) || end > self.max_length {
                    return Ok(Some(Line::Oversized));
                }
                Ok(Some(Line::Frame(text(&line[..end]))))
            }
            None if self.discarding || buf.len() > self.max_length => {
                buf.clear();
                self.next_index = 0;
                self.discarding = true;
                Ok(None)
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if std::mem::take(&mut self.discarding) {
            buf.clear();
            return Ok(Some(Line::Oversized));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split();
        Ok(Some(Line::Frame(text(&rest))))
    }
}

fn text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
