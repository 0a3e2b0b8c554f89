use tracing::{info, warn};

/// Accumulates user-visible diagnostics about what an import skipped and
/// why. Messages are mirrored to `tracing` as they arrive and appended to
/// the final import summary, so a degraded result is never a silent one.
#[derive(Debug, Default)]
pub struct ImportLog {
    messages: Vec<String>,
}

impl ImportLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an informational message (alignment results, loaded files).
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.messages.push(message);
    }

    /// Records a skipped entity or degraded stage.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}
