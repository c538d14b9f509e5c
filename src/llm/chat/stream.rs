//! Incremental decoding of the provider's `data:` event stream.
//!
//! Network chunks do not respect line boundaries, so bytes are buffered in a
//! [`LineDecoder`] until a full line is available. Each line is then classified
//! by [`parse_event_line`].

use serde::Deserialize;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";
/// Longest line kept while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Done,
    Skip,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    max_line: usize,
    // Set after an oversized line was dropped; bytes are skipped up to the next newline.
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self { buffer: Vec::new(), max_line, discarding: false }
    }

    /// Appends `chunk` and drains every line it completed.
    ///
    /// A line growing past the limit is dropped whole, with a warning.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut chunk = chunk;
        if self.discarding {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    chunk = &chunk[pos + 1..];
                }
                None => {
                    return Vec::new();
                }
            }
        }

        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            if raw.len() - 1 > self.max_line {
                log::warn!("Dropping stream line of {} bytes (limit {})", raw.len() - 1, self.max_line);
                continue;
            }
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }

        if self.buffer.len() > self.max_line {
            log::warn!("Dropping unterminated stream line longer than {} bytes", self.max_line);
            self.buffer.clear();
            self.discarding = true;
        }
        lines
    }

    /// Returns the unterminated tail, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

pub fn parse_event_line(line: &str) -> StreamEvent {
    let data = match line.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => return StreamEvent::Skip,
    };

    if data.trim() == DONE_SENTINEL {
        return StreamEvent::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) =>
            chunk.choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)
                .filter(|content| !content.is_empty())
                .map(StreamEvent::Delta)
                .unwrap_or(StreamEvent::Skip),
        Err(e) => {
            log::debug!("Skipping undecodable stream line ({}): {}", e, data);
            StreamEvent::Skip
        }
    }
}
