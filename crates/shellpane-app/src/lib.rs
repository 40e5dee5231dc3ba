// shellpane application: session host process and pane management CLI.

pub mod config;
pub mod host;

pub use config::Config;
pub use host::{run_host, HostOptions};
