// Pane lifecycle management
//
// Sessions run inside panes of an external multiplexer (tmux), which is
// driven purely through its command-line interface. The registry is the
// only durable record of which session lives in which pane; liveness is
// verified lazily on access, never pushed.

mod registry;
mod spawn;
mod tmux;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::{FileStore, MemoryStore, PaneRecord, PaneRegistry, RegistryData, RegistryStore};
pub use spawn::{acquire_pane, AcquiredPane, PaneRequest, REUSE_GRACE};
pub use tmux::{PaneHost, Tmux};

// Constants
pub const KIND_TERMINAL: &str = "terminal";
