use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::models::confirmation::Confirmation;
use crate::models::link::Link;
use crate::models::webhook::{push_bounded, WebhookLog, WebhookLogEntry, WebhookSettings};

use super::{apply_transition, LinkTransition, Store};

#[derive(Default)]
struct Collections {
    confirmations: Vec<Confirmation>,
    links: Vec<Link>,
    webhook_logs: Vec<WebhookLog>,
    webhook_settings: WebhookSettings,
}

/// Process-local implementation of the Store trait. Nothing survives a restart.
pub struct MemoryStore {
    data: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            data: Mutex::new(Collections::default()),
        }
    }

    fn data(&self) -> MutexGuard<'_, Collections> {
        // a panicking writer leaves plain Vecs behind, still usable
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn confirmation_list(&self) -> Vec<Confirmation> {
        self.data().confirmations.clone()
    }

    fn confirmation_add(&self, confirmation: &Confirmation) -> Result<(), String> {
        self.data().confirmations.push(confirmation.clone());
        Ok(())
    }

    fn link_list(&self) -> Vec<Link> {
        self.data().links.clone()
    }

    fn link_add(&self, link: &Link) -> Result<(), String> {
        self.data().links.push(link.clone());
        Ok(())
    }

    fn link_mark_clicked(&self, unique_id: &str) -> Result<bool, String> {
        Ok(apply_transition(
            &mut self.data().links,
            unique_id,
            LinkTransition::Clicked,
        ))
    }

    fn link_mark_confirmed(&self, unique_id: &str) -> Result<bool, String> {
        Ok(apply_transition(
            &mut self.data().links,
            unique_id,
            LinkTransition::Confirmed,
        ))
    }

    fn webhook_log_list(&self) -> Vec<WebhookLog> {
        self.data().webhook_logs.clone()
    }

    fn webhook_log_add(&self, entry: WebhookLogEntry) -> Result<(), String> {
        push_bounded(
            &mut self.data().webhook_logs,
            WebhookLog::stamp(entry, Utc::now()),
        );
        Ok(())
    }

    fn webhook_log_clear(&self) -> Result<(), String> {
        self.data().webhook_logs.clear();
        Ok(())
    }

    fn webhook_settings_get(&self) -> WebhookSettings {
        self.data().webhook_settings.clone()
    }

    fn webhook_settings_save(&self, settings: &WebhookSettings) -> Result<(), String> {
        self.data().webhook_settings = settings.clone();
        Ok(())
    }

    fn clear_all(&self) -> Result<(), String> {
        *self.data() = Collections::default();
        Ok(())
    }
}
