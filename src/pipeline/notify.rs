//! Alert delivery.
//!
//! The scheduler calls a [`Notifier`] after a run that produced new results
//! for a saved search with an owner contact. Delivery mechanics live behind
//! the trait; [`LogNotifier`] writes the rendered alert to the log.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{SavedSearch, SeenResult};

/// Rendered alert message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Alert {
    /// Build the alert for `results`, or None when the search has no contact.
    pub fn render(search: &SavedSearch, results: &[SeenResult]) -> Option<Self> {
        let recipient = search.owner_contact.clone()?;
        let subject = format!("New papers found for '{}'", search.name);

        let mut body = format!(
            "{} new result(s) for saved search '{}':\n",
            results.len(),
            search.name
        );
        for result in results {
            body.push_str(&format!(
                "- [{}] {}\n",
                result.backend(),
                result.record.summary_line()
            ));
        }

        Some(Self {
            recipient,
            subject,
            body,
        })
    }
}

/// Sink for new-result alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, search: &SavedSearch, new_results: &[SeenResult]) -> Result<()>;
}

/// Notifier that writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, search: &SavedSearch, new_results: &[SeenResult]) -> Result<()> {
        if let Some(alert) = Alert::render(search, new_results) {
            log::info!(
                "Alert to {}: {}\n{}",
                alert.recipient,
                alert.subject,
                alert.body.trim_end()
            );
        }
        Ok(())
    }
}
