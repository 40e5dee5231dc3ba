use regex::Regex;
use shellpane_types::OutputSource;
use uuid::Uuid;

/// Marker family prefix. Any output line containing this substring is
/// withheld from forwarded output, whether it belongs to the armed command,
/// a stale one, or a partially arrived marker.
pub const MARKER_PREFIX: &str = "__SHELLPANE";

/// Detection buffer cap; completed non-marker lines are dropped from the
/// scan window once it grows past this.
const MAX_SCAN_BYTES: usize = 64 * 1024;

/// Sentinel markers for one submitted command.
///
/// Each command gets its own marker pair (sequence number plus random
/// nonce), so a marker echoed late by an interrupted command can never
/// satisfy the detector for a later one.
#[derive(Debug, Clone)]
pub struct CommandMarkers {
    pub exit_marker: String,
    pub done_marker: String,
}

impl CommandMarkers {
    /// The line actually written to the shell's stdin.
    pub fn wrap(&self, command: &str) -> String {
        format!(
            "{}; echo \"{}:$?\"; echo \"{}\"",
            command, self.exit_marker, self.done_marker
        )
    }
}

struct ArmedCommand {
    exit_re: Regex,
    done_marker: String,
}

/// Result of feeding one raw chunk through the detector.
#[derive(Debug, Default)]
pub struct FeedResult {
    /// Complete output lines released for display, marker lines stripped.
    /// Empty until a line break arrives for the chunk's stream.
    pub forwarded: String,
    /// Exit code of the armed command, present exactly once per command.
    pub exit_code: Option<i32>,
}

/// Stateful parser that finds command boundaries inside the raw byte
/// stream of an interactive shell.
///
/// Both stdout and stderr feed the same detector: forwarding is assembled
/// per stream (so interleaving cannot tear lines apart), while completion
/// scanning runs over the combined stream.
pub struct CompletionDetector {
    stdout_tail: String,
    stderr_tail: String,
    scan: String,
    armed: Option<ArmedCommand>,
    seq: u64,
}

impl CompletionDetector {
    pub fn new() -> Self {
        Self {
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            scan: String::new(),
            armed: None,
            seq: 0,
        }
    }

    /// Arm the detector for the next command and hand back its markers.
    pub fn arm(&mut self) -> CommandMarkers {
        self.seq += 1;
        let nonce = Uuid::new_v4().simple().to_string();
        let markers = CommandMarkers {
            exit_marker: format!("{}_EXIT_{}_{}__", MARKER_PREFIX, self.seq, &nonce[..8]),
            done_marker: format!("{}_DONE_{}_{}__", MARKER_PREFIX, self.seq, &nonce[..8]),
        };

        // exit status is echoed as "<marker>:<code>"
        let exit_re = Regex::new(&format!("{}:(-?\\d+)", regex::escape(&markers.exit_marker)))
            .expect("marker regex");

        self.scan.clear();
        self.armed = Some(ArmedCommand {
            exit_re,
            done_marker: markers.done_marker.clone(),
        });
        markers
    }

    /// Drop the armed command. A marker it echoes later is stale: it will
    /// be stripped from output by the prefix filter and can no longer
    /// produce a completion.
    pub fn disarm(&mut self) {
        self.armed = None;
        self.scan.clear();
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Consume one raw chunk from the shell.
    pub fn feed(&mut self, source: OutputSource, chunk: &str) -> FeedResult {
        let tail = match source {
            OutputSource::Stderr => &mut self.stderr_tail,
            _ => &mut self.stdout_tail,
        };
        tail.push_str(chunk);
        let forwarded = release_complete_lines(tail);

        let mut exit_code = None;
        if self.armed.is_some() {
            self.scan.push_str(chunk);
            exit_code = self.try_match();
            if exit_code.is_some() {
                self.scan.clear();
                self.armed = None;
            } else {
                self.compact_scan();
            }
        }

        FeedResult {
            forwarded,
            exit_code,
        }
    }

    /// Flush a stream's unterminated tail (used at EOF).
    pub fn flush(&mut self, source: OutputSource) -> String {
        let tail = match source {
            OutputSource::Stderr => &mut self.stderr_tail,
            _ => &mut self.stdout_tail,
        };
        let rest = std::mem::take(tail);
        if rest.is_empty() || rest.contains(MARKER_PREFIX) {
            String::new()
        } else {
            rest
        }
    }

    fn try_match(&self) -> Option<i32> {
        let armed = self.armed.as_ref()?;
        let caps = armed.exit_re.captures(&self.scan)?;
        let end = caps.get(0).expect("whole match").end();
        self.scan[end..].find(&armed.done_marker)?;
        Some(caps[1].parse().unwrap_or(-1))
    }

    fn compact_scan(&mut self) {
        if self.scan.len() <= MAX_SCAN_BYTES {
            return;
        }
        // Keep an exit marker that is still waiting for its done marker;
        // otherwise keep the most recent half-window, cut at a line start.
        let keep_from = match self
            .armed
            .as_ref()
            .and_then(|a| a.exit_re.find(&self.scan))
        {
            Some(m) => line_start(&self.scan, m.start()),
            None => {
                let cut = self.scan.len() - MAX_SCAN_BYTES / 2;
                line_start(&self.scan, cut)
            }
        };
        self.scan.drain(..keep_from);
    }
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn line_start(text: &str, at: usize) -> usize {
    text[..at].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// Drain complete lines from `tail`, dropping any that contain a marker.
fn release_complete_lines(tail: &mut String) -> String {
    let Some(cut) = tail.rfind('\n') else {
        return String::new();
    };
    let rest = tail.split_off(cut + 1);
    let complete = std::mem::replace(tail, rest);

    complete
        .split_inclusive('\n')
        .filter(|line| !line.contains(MARKER_PREFIX))
        .collect()
}
