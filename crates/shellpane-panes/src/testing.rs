//! Scripted pane host for tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::tmux::PaneHost;

/// In-memory [`PaneHost`] that records every call and can be told to fail
/// specific operations.
pub struct MockPaneHost {
    panes: Mutex<HashSet<String>>,
    killed: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, String)>>,
    interrupts: Mutex<Vec<String>>,
    titles: Mutex<Vec<(String, String)>>,
    created: Mutex<Vec<String>>,
    fail_kill: AtomicBool,
    fail_reuse: AtomicBool,
    next_pane: AtomicUsize,
}

impl MockPaneHost {
    pub fn new() -> Self {
        Self {
            panes: Mutex::new(HashSet::new()),
            killed: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            interrupts: Mutex::new(Vec::new()),
            titles: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            fail_kill: AtomicBool::new(false),
            fail_reuse: AtomicBool::new(false),
            next_pane: AtomicUsize::new(100),
        }
    }

    pub fn add_pane(&self, handle: &str) {
        self.panes.lock().unwrap().insert(handle.to_string());
    }

    pub fn remove_pane(&self, handle: &str) {
        self.panes.lock().unwrap().remove(handle);
    }

    /// Make kill_pane report failure (the pane stays live).
    pub fn fail_kills(&self) {
        self.fail_kill.store(true, Ordering::Relaxed);
    }

    /// Make send_interrupt/send_text fail, simulating a pane that cannot
    /// be reused.
    pub fn fail_reuse(&self) {
        self.fail_reuse.store(true, Ordering::Relaxed);
    }

    pub fn killed(&self) -> Vec<String> {
        self.killed.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn interrupts(&self) -> Vec<String> {
        self.interrupts.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<(String, String)> {
        self.titles.lock().unwrap().clone()
    }

    pub fn created_commands(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaneHost for MockPaneHost {
    async fn split_pane(&self, command: &str, _cwd: Option<&Path>) -> Result<String> {
        let n = self.next_pane.fetch_add(1, Ordering::Relaxed);
        let handle = format!("%{}", n);
        self.panes.lock().unwrap().insert(handle.clone());
        self.created.lock().unwrap().push(command.to_string());
        Ok(handle)
    }

    async fn verify_pane(&self, handle: &str) -> bool {
        self.panes.lock().unwrap().contains(handle)
    }

    async fn pane_index(&self, handle: &str) -> Result<usize> {
        handle
            .trim_start_matches('%')
            .parse()
            .map_err(|_| anyhow::anyhow!("bad handle: {}", handle))
    }

    async fn set_title(&self, handle: &str, title: &str) -> Result<()> {
        self.titles
            .lock()
            .unwrap()
            .push((handle.to_string(), title.to_string()));
        Ok(())
    }

    async fn send_text(&self, handle: &str, text: &str) -> Result<()> {
        if self.fail_reuse.load(Ordering::Relaxed) {
            bail!("pane refused input");
        }
        self.sent
            .lock()
            .unwrap()
            .push((handle.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_interrupt(&self, handle: &str) -> Result<()> {
        if self.fail_reuse.load(Ordering::Relaxed) {
            bail!("pane refused interrupt");
        }
        self.interrupts.lock().unwrap().push(handle.to_string());
        Ok(())
    }

    async fn capture_pane(&self, _handle: &str) -> Result<String> {
        Ok(String::new())
    }

    async fn kill_pane(&self, handle: &str) -> Result<()> {
        self.killed.lock().unwrap().push(handle.to_string());
        if self.fail_kill.load(Ordering::Relaxed) {
            bail!("kill refused");
        }
        self.panes.lock().unwrap().remove(handle);
        Ok(())
    }

    fn host_name(&self) -> &str {
        "mock"
    }
}
