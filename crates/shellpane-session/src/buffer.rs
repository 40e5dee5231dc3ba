use std::collections::VecDeque;

use chrono::Utc;
use shellpane_types::{OutputLine, OutputSource};

/// Bounded, append-only log of session output lines.
///
/// Old lines are evicted FIFO once `max_lines` is exceeded; `total_received`
/// keeps counting regardless, so a reader can tell how many lines existed
/// before the window it can currently see.
pub struct OutputBuffer {
    lines: VecDeque<OutputLine>,
    max_lines: usize,
    total_received: u64,
}

impl OutputBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines,
            total_received: 0,
        }
    }

    /// Split `text` on line breaks and append one line per segment.
    ///
    /// A single trailing newline terminates the last line rather than
    /// producing an empty one; embedded blank lines are preserved. All lines
    /// from one append share a capture timestamp.
    pub fn append(&mut self, text: &str, source: OutputSource) {
        let timestamp = Utc::now();

        let mut segments: Vec<&str> = text.split('\n').collect();
        if segments.last() == Some(&"") {
            segments.pop();
        }

        for segment in segments {
            let content = segment.strip_suffix('\r').unwrap_or(segment);
            self.lines.push_back(OutputLine {
                content: content.to_string(),
                timestamp,
                source,
            });
            self.total_received += 1;
        }

        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// Return `count` lines from the end (most recent) or the start, in
    /// original order. With no count, returns the whole window.
    pub fn get_lines(&self, count: Option<usize>, from_end: bool) -> Vec<OutputLine> {
        match count {
            None => self.get_all(),
            Some(n) => {
                let n = n.min(self.lines.len());
                if from_end {
                    self.lines.iter().skip(self.lines.len() - n).cloned().collect()
                } else {
                    self.lines.iter().take(n).cloned().collect()
                }
            }
        }
    }

    pub fn get_all(&self) -> Vec<OutputLine> {
        self.lines.iter().cloned().collect()
    }

    /// Clear the visible window. The total-received counter is untouched.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_received(&self) -> u64 {
        self.total_received
    }
}
