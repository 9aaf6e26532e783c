use std::sync::Arc;

use chrono::Utc;

use crate::config::{StorageBackend, StorageConfig};
use crate::models::confirmation::Confirmation;
use crate::models::link::Link;
use crate::models::webhook::{WebhookLog, WebhookLogEntry, WebhookSettings};

pub mod file;
pub mod memory;

/// Unified data-access trait. Every record operation goes through here.
/// Implementations: `FileStore` (one JSON document per resource) and
/// `MemoryStore` (process-local, also the link generator's fallback).
///
/// Reads never fail: a missing or unreadable resource comes back as its
/// default. Writes return `Err` with a message and have already been logged.
/// Mutations are whole-collection read-modify-write without locking, so
/// concurrent writers can overwrite each other.
pub trait Store: Send + Sync {
    fn backend_name(&self) -> &'static str;

    // ── Confirmations ───────────────────────────────────────────────
    fn confirmation_list(&self) -> Vec<Confirmation>;
    /// Always appends; duplicate tokens are not rejected.
    fn confirmation_add(&self, confirmation: &Confirmation) -> Result<(), String>;

    // ── Links ───────────────────────────────────────────────────────
    fn link_list(&self) -> Vec<Link>;
    fn link_add(&self, link: &Link) -> Result<(), String>;
    /// `Ok(false)` when no link has this id; nothing is written then.
    fn link_mark_clicked(&self, unique_id: &str) -> Result<bool, String>;
    fn link_mark_confirmed(&self, unique_id: &str) -> Result<bool, String>;
    fn link_find(&self, unique_id: &str) -> Option<Link> {
        self.link_list()
            .into_iter()
            .find(|l| l.unique_id == unique_id)
    }

    // ── Webhook logs ────────────────────────────────────────────────
    fn webhook_log_list(&self) -> Vec<WebhookLog>;
    /// Stamps the entry with the current time and keeps the newest 100.
    fn webhook_log_add(&self, entry: WebhookLogEntry) -> Result<(), String>;
    fn webhook_log_clear(&self) -> Result<(), String>;

    // ── Webhook settings ────────────────────────────────────────────
    fn webhook_settings_get(&self) -> WebhookSettings;
    fn webhook_settings_save(&self, settings: &WebhookSettings) -> Result<(), String>;

    // ── Maintenance ─────────────────────────────────────────────────
    /// Drops all four resources.
    fn clear_all(&self) -> Result<(), String>;
}

#[derive(Clone, Copy)]
pub(crate) enum LinkTransition {
    Clicked,
    Confirmed,
}

/// Apply `transition` to the first link with `unique_id`. Returns whether one matched.
pub(crate) fn apply_transition(links: &mut [Link], unique_id: &str, transition: LinkTransition) -> bool {
    match links.iter_mut().find(|l| l.unique_id == unique_id) {
        Some(link) => {
            let now = Utc::now();
            match transition {
                LinkTransition::Clicked => link.mark_clicked(now),
                LinkTransition::Confirmed => link.mark_confirmed(now),
            }
            true
        }
        None => false,
    }
}

/// Build the primary store selected in configuration.
pub fn from_config(config: &StorageConfig) -> Arc<dyn Store> {
    match config.backend {
        StorageBackend::Memory => Arc::new(memory::MemoryStore::new()) as Arc<dyn Store>,
        StorageBackend::File => {
            Arc::new(file::FileStore::new(&config.data_dir)) as Arc<dyn Store>
        }
    }
}
