use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::confirmation::Confirmation;
use crate::models::link::Link;
use crate::models::webhook::{push_bounded, WebhookLog, WebhookLogEntry, WebhookSettings};

use super::{apply_transition, LinkTransition, Store};

pub const CONFIRMATIONS_FILE: &str = "confirmations.json";
pub const LINKS_FILE: &str = "links.json";
pub const WEBHOOK_LOGS_FILE: &str = "webhook-logs.json";
pub const WEBHOOK_SETTINGS_FILE: &str = "webhook-settings.json";

const ALL_FILES: [&str; 4] = [
    CONFIRMATIONS_FILE,
    LINKS_FILE,
    WEBHOOK_LOGS_FILE,
    WEBHOOK_SETTINGS_FILE,
];

/// What reading one resource document produced.
#[derive(Debug)]
pub enum ReadOutcome<T> {
    Loaded(T),
    Missing,
    Corrupt(String),
}

/// JSON-file implementation of the Store trait.
/// Each resource is one pretty-printed document holding its full snapshot.
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    pub fn read_doc<T: DeserializeOwned>(&self, file: &str) -> ReadOutcome<T> {
        let path = self.path(file);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return ReadOutcome::Missing,
            Err(e) => return ReadOutcome::Corrupt(format!("read failed: {}", e)),
        };
        match serde_json::from_str(&raw) {
            Ok(v) => ReadOutcome::Loaded(v),
            Err(e) => ReadOutcome::Corrupt(format!("invalid JSON: {}", e)),
        }
    }

    /// Read a resource, treating missing or corrupt documents as empty.
    fn load<T: DeserializeOwned + Default>(&self, file: &str) -> T {
        match self.read_doc(file) {
            ReadOutcome::Loaded(v) => v,
            ReadOutcome::Missing => T::default(),
            ReadOutcome::Corrupt(reason) => {
                log::warn!(
                    "[store] {} is unreadable ({}), using empty default",
                    self.path(file).display(),
                    reason
                );
                T::default()
            }
        }
    }

    fn save<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<(), String> {
        let path = self.path(file);
        let result = fs::create_dir_all(&self.data_dir)
            .map_err(|e| format!("cannot create {}: {}", self.data_dir.display(), e))
            .and_then(|_| {
                serde_json::to_string_pretty(value).map_err(|e| format!("encode failed: {}", e))
            })
            .and_then(|json| {
                fs::write(&path, json)
                    .map_err(|e| format!("cannot write {}: {}", path.display(), e))
            });
        if let Err(ref e) = result {
            log::error!("[store] {}", e);
        }
        result
    }

    fn transition(&self, unique_id: &str, transition: LinkTransition) -> Result<bool, String> {
        let mut links: Vec<Link> = self.load(LINKS_FILE);
        if !apply_transition(&mut links, unique_id, transition) {
            return Ok(false);
        }
        self.save(LINKS_FILE, &links)?;
        Ok(true)
    }
}

impl Store for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    // ── Confirmations ───────────────────────────────────────────────

    fn confirmation_list(&self) -> Vec<Confirmation> {
        self.load(CONFIRMATIONS_FILE)
    }

    fn confirmation_add(&self, confirmation: &Confirmation) -> Result<(), String> {
        let mut list = self.confirmation_list();
        list.push(confirmation.clone());
        self.save(CONFIRMATIONS_FILE, &list)
    }

    // ── Links ───────────────────────────────────────────────────────

    fn link_list(&self) -> Vec<Link> {
        self.load(LINKS_FILE)
    }

    fn link_add(&self, link: &Link) -> Result<(), String> {
        let mut links = self.link_list();
        links.push(link.clone());
        self.save(LINKS_FILE, &links)
    }

    fn link_mark_clicked(&self, unique_id: &str) -> Result<bool, String> {
        self.transition(unique_id, LinkTransition::Clicked)
    }

    fn link_mark_confirmed(&self, unique_id: &str) -> Result<bool, String> {
        self.transition(unique_id, LinkTransition::Confirmed)
    }

    // ── Webhook logs ────────────────────────────────────────────────

    fn webhook_log_list(&self) -> Vec<WebhookLog> {
        self.load(WEBHOOK_LOGS_FILE)
    }

    fn webhook_log_add(&self, entry: WebhookLogEntry) -> Result<(), String> {
        let mut logs = self.webhook_log_list();
        push_bounded(&mut logs, WebhookLog::stamp(entry, Utc::now()));
        self.save(WEBHOOK_LOGS_FILE, &logs)
    }

    fn webhook_log_clear(&self) -> Result<(), String> {
        self.save(WEBHOOK_LOGS_FILE, &Vec::<WebhookLog>::new())
    }

    // ── Webhook settings ────────────────────────────────────────────

    fn webhook_settings_get(&self) -> WebhookSettings {
        self.load(WEBHOOK_SETTINGS_FILE)
    }

    fn webhook_settings_save(&self, settings: &WebhookSettings) -> Result<(), String> {
        self.save(WEBHOOK_SETTINGS_FILE, settings)
    }

    // ── Maintenance ─────────────────────────────────────────────────

    fn clear_all(&self) -> Result<(), String> {
        for file in ALL_FILES {
            let path = self.path(file);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    let msg = format!("cannot remove {}: {}", path.display(), e);
                    log::error!("[store] {}", msg);
                    return Err(msg);
                }
            }
        }
        log::info!("[store] cleared all data in {}", self.data_dir.display());
        Ok(())
    }
}
