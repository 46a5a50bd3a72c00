//! Sentence buffer (C3, §4.3).
//!
//! A pure delimiter splitter with no language awareness: feed it chunks as
//! they stream in, and it hands back whole sentences the instant a terminator
//! is seen. Everything after the last terminator stays buffered until the
//! next `add` or an explicit `flush`.

const TERMINATORS: &[char] = &['。', '？', '！', '.', '?', '!', '\n'];

/// Stream-fed sentence splitter (§4.3).
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    buffer: String,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` to the internal accumulator and returns every complete
    /// sentence found, terminator included. The remainder stays buffered.
    pub fn add(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let mut sentences = Vec::new();
        let mut scan_from = 0usize;

        loop {
            let Some(rel_idx) = self.buffer[scan_from..].find(TERMINATORS) else {
                break;
            };
            let idx = scan_from + rel_idx;
            let term_len = self.buffer[idx..].chars().next().unwrap().len_utf8();
            let end = idx + term_len;
            sentences.push(self.buffer[..end].to_string());
            scan_from = end;
        }

        if scan_from > 0 {
            self.buffer = self.buffer[scan_from..].to_string();
        }

        sentences
    }

    /// Returns and clears everything still buffered.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn peek(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn length(&self) -> usize {
        self.buffer.len()
    }
}
