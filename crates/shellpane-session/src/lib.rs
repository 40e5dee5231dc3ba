// Shell session engine
//
// This crate owns one interactive shell subprocess per session, frames
// command completion inside its unstructured output stream via sentinel
// markers, and retains session history in a bounded line buffer.

mod buffer;
mod detector;
mod logger;
mod session;

// Re-export public API
pub use buffer::OutputBuffer;
pub use detector::{CommandMarkers, CompletionDetector, FeedResult, MARKER_PREFIX};
pub use logger::SessionLogger;
pub use session::{
    CommandCompletion, OutputUpdate, RawOutput, SessionConfig, SessionState, ShellSession,
};

// Constants
pub const READ_CHUNK_BYTES: usize = 4096;
