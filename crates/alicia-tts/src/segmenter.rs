//! Sentence boundary detection over a streaming text delta: a terminator
//! scan (`.`, `!`, `?`, newline, boundary check) extended with a minimal
//! abbreviation exception list so `"Dr. Smith arrived."` isn't split
//! after `"Dr."`.

const TERMINATORS: [char; 4] = ['.', '!', '?', '\n'];

const ABBREVIATIONS: [&str; 6] = ["mr.", "mrs.", "dr.", "vs.", "e.g.", "i.e."];

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedSentence {
    pub sequence: i32,
    pub text: String,
}

/// Incrementally accumulates a streamed assistant response and yields
/// complete sentences as soon as a terminator (followed by whitespace or
/// end-of-stream) is observed.
pub struct SentenceSegmenter {
    buffer: String,
    sequence: i32,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            sequence: 0,
        }
    }

    /// Feed the next text delta, returning every sentence that completed
    /// as a result (normally zero or one, but a delta may contain several
    /// terminators).
    pub fn push(&mut self, text_delta: &str) -> Vec<SegmentedSentence> {
        self.buffer.push_str(text_delta);
        let mut out = Vec::new();

        loop {
            let Some(boundary) = self.find_boundary() else {
                break;
            };
            let sentence: String = self.buffer.drain(..boundary).collect();
            let trimmed = sentence.trim().to_string();
            // Consume the whitespace that confirmed the boundary, if any.
            while self.buffer.starts_with(char::is_whitespace) {
                self.buffer.remove(0);
            }
            if trimmed.is_empty() {
                continue;
            }
            self.sequence += 1;
            out.push(SegmentedSentence {
                sequence: self.sequence,
                text: trimmed,
            });
        }
        out
    }

    /// Flush whatever remains in the buffer as a final sentence (end of
    /// stream), if non-empty.
    pub fn flush_final(&mut self) -> Option<SegmentedSentence> {
        let trimmed = self.buffer.trim().to_string();
        self.buffer.clear();
        if trimmed.is_empty() {
            return None;
        }
        self.sequence += 1;
        Some(SegmentedSentence {
            sequence: self.sequence,
            text: trimmed,
        })
    }

    /// Find a byte index to split at: the position right after a
    /// terminator that is (a) not part of a known abbreviation and (b) is
    /// either at the buffer's end-minus-lookahead or followed by
    /// whitespace, i.e. we can only be sure of a boundary once we've seen
    /// the following whitespace (or another terminator run).
    fn find_boundary(&self) -> Option<usize> {
        let chars: Vec<(usize, char)> = self.buffer.char_indices().collect();
        for i in 0..chars.len() {
            let (byte_idx, ch) = chars[i];
            if !TERMINATORS.contains(&ch) {
                continue;
            }
            // Need to see at least one char after the terminator to
            // confirm it's followed by whitespace — otherwise wait for
            // more input.
            let Some(&(next_byte, next_ch)) = chars.get(i + 1) else {
                continue;
            };
            if !next_ch.is_whitespace() {
                continue;
            }
            let end = next_byte;
            let candidate = &self.buffer[..end];
            if ends_with_abbreviation(candidate) {
                continue;
            }
            return Some(end);
        }
        None
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

fn ends_with_abbreviation(text: &str) -> bool {
    let lower = text.to_lowercase();
    ABBREVIATIONS
        .iter()
        .any(|abbr| lower.ends_with(abbr) && word_boundary_before(&lower, abbr))
}

fn word_boundary_before(lower: &str, abbr: &str) -> bool {
    let start = lower.len() - abbr.len();
    match lower[..start].chars().last() {
        None => true,
        Some(c) => !c.is_alphanumeric(),
    }
}
