use std::collections::BTreeSet;

use thiserror::Error;

/// Fatal problems that abort a run before processing begins. Data-quality
/// problems never take this path; they go to [`ErrorsOnExit`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Table(#[from] aidflow_core::TableError),
    #[error(transparent)]
    Currency(#[from] crate::currency::CurrencyError),
    #[error("unknown theme: {0}")]
    UnknownTheme(String),
}

/// Collector for non-fatal data-quality errors. Messages are kept in first
/// insertion order, de-duplicated, and reported once at the end of the run
/// rather than interactively per item.
#[derive(Debug, Default)]
pub struct ErrorsOnExit {
    messages: Vec<String>,
    seen: BTreeSet<String>,
}

impl ErrorsOnExit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.seen.insert(message.clone()) {
            self.messages.push(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Emit the collected summary via the log.
    pub fn log_all(&self) {
        for message in &self.messages {
            tracing::warn!("{message}");
        }
    }
}
