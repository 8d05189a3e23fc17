//! Interactive display-name collection

use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::ui::PageSurface;

/// Message shown when an empty name is submitted
pub const NAME_REQUIRED_MESSAGE: &str = "Please enter your name.";

/// Modal overlay asking the visitor for a display name.
///
/// The overlay has no dismiss action and no timeout.
#[async_trait]
pub trait NamePrompt: Send + Sync {
    /// Show the overlay and take input focus
    fn open(&self);

    /// Wait for the next submitted value
    async fn next_submission(&self) -> String;

    /// Show a validation message inside the overlay
    fn show_validation(&self, message: &str);

    /// Remove the overlay
    fn close(&self);
}

/// Block until the visitor submits a non-empty name and return it trimmed.
///
/// Protected content is hidden while the overlay is open.
pub async fn collect_display_name(prompt: &dyn NamePrompt, surface: &dyn PageSurface) -> String {
    surface.hide_content();
    prompt.open();

    loop {
        let submitted = prompt.next_submission().await;
        let name = submitted.trim();
        if !name.is_empty() {
            prompt.close();
            return name.to_string();
        }
        debug!("Rejected empty display name");
        prompt.show_validation(NAME_REQUIRED_MESSAGE);
    }
}

/// Prompt fed from a channel; each message is one submission
pub struct ChannelPrompt {
    submissions: AsyncMutex<mpsc::UnboundedReceiver<String>>,
    open: AtomicBool,
    opened: AtomicUsize,
    messages: Mutex<Vec<String>>,
}

impl ChannelPrompt {
    /// Create the prompt and the sender that submits values to it
    pub fn channel() -> (Self, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let prompt = Self {
            submissions: AsyncMutex::new(rx),
            open: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
            messages: Mutex::new(Vec::new()),
        };
        (prompt, tx)
    }

    /// Whether the overlay is currently shown
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// How many times the overlay was shown
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Validation messages shown so far
    pub fn validation_messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NamePrompt for ChannelPrompt {
    fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    async fn next_submission(&self) -> String {
        let mut rx = self.submissions.lock().await;
        match rx.recv().await {
            Some(value) => value,
            // Nobody can submit any more; the overlay stays up.
            None => std::future::pending().await,
        }
    }

    fn show_validation(&self, message: &str) {
        let mut guard = match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(message.to_string());
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
