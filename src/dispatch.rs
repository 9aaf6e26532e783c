use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rocket::http::Status;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::links::{self, StoredIn};
use crate::models::confirmation::Confirmation;
use crate::models::link::{Link, LinkStats};
use crate::models::webhook::{WebhookLogEntry, WebhookSettings};
use crate::routes::client::ClientMeta;
use crate::store::Store;
use crate::webhook::{self, Event, Notifier};

pub type Reply = (Status, Value);

/// Every operation reachable through `?action=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GetConfirmations,
    AddConfirmation,
    GetLinks,
    AddLink,
    UpdateLinkClick,
    UpdateLinkConfirmation,
    GetWebhookSettings,
    SaveWebhookSettings,
    GetWebhookLogs,
    AddWebhookLog,
    ClearWebhookLogs,
    ClearAll,
    GenerateLink,
    GenerateBulkLinks,
    TestWebhook,
    GetStats,
}

impl Action {
    pub fn parse(action: &str) -> Option<Self> {
        Some(match action {
            "get-confirmations" => Action::GetConfirmations,
            "add-confirmation" => Action::AddConfirmation,
            "get-links" => Action::GetLinks,
            "add-link" => Action::AddLink,
            "update-link-click" => Action::UpdateLinkClick,
            "update-link-confirmation" => Action::UpdateLinkConfirmation,
            "get-webhook-settings" => Action::GetWebhookSettings,
            "save-webhook-settings" => Action::SaveWebhookSettings,
            "get-webhook-logs" => Action::GetWebhookLogs,
            "add-webhook-log" => Action::AddWebhookLog,
            "clear-webhook-logs" => Action::ClearWebhookLogs,
            "clear-all" => Action::ClearAll,
            "generate-link" => Action::GenerateLink,
            "generate-bulk-links" => Action::GenerateBulkLinks,
            "test-webhook" => Action::TestWebhook,
            "get-stats" => Action::GetStats,
            _ => return None,
        })
    }
}

#[derive(Deserialize)]
struct UniqueIdBody {
    #[serde(rename = "uniqueId", default)]
    unique_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateLinkBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    base_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkLinksBody {
    #[serde(default)]
    text: String,
    base_url: Option<String>,
}

fn bad_request(message: impl Into<String>) -> Reply {
    (Status::BadRequest, json!({ "error": message.into() }))
}

fn ok(body: Value) -> Reply {
    (Status::Ok, body)
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, Reply> {
    if body.trim().is_empty() {
        return Err(bad_request("Missing request body"));
    }
    serde_json::from_str(body).map_err(|e| bad_request(format!("Invalid request body: {}", e)))
}

/// Maps one action to its store / generator / notifier call.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    fallback: Arc<dyn Store>,
    notifier: Notifier,
    config: AppConfig,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, fallback: Arc<dyn Store>, config: AppConfig) -> Self {
        let notifier = Notifier::new(
            store.clone(),
            Duration::from_secs(config.webhook.timeout_secs),
            config.features.webhooks,
        );
        Dispatcher {
            store,
            fallback,
            notifier,
            config,
        }
    }

    pub fn handle(&self, action: Option<&str>, body: &str, client: &ClientMeta) -> Reply {
        let Some(action) = action.and_then(Action::parse) else {
            return bad_request("Invalid action");
        };

        let result = match action {
            Action::GetConfirmations => Ok(self.get_confirmations()),
            Action::AddConfirmation => self.add_confirmation(body, client),
            Action::GetLinks => Ok(self.get_links()),
            Action::AddLink => self.add_link(body),
            Action::UpdateLinkClick => self.update_link_click(body, client),
            Action::UpdateLinkConfirmation => self.update_link_confirmation(body),
            Action::GetWebhookSettings => Ok(self.get_webhook_settings()),
            Action::SaveWebhookSettings => self.save_webhook_settings(body),
            Action::GetWebhookLogs => Ok(self.get_webhook_logs()),
            Action::AddWebhookLog => self.add_webhook_log(body),
            Action::ClearWebhookLogs => Ok(self.clear_webhook_logs()),
            Action::ClearAll => Ok(self.clear_all()),
            Action::GenerateLink => self.generate_link(body),
            Action::GenerateBulkLinks => self.generate_bulk_links(body),
            Action::TestWebhook => self.test_webhook(body),
            Action::GetStats => Ok(self.get_stats()),
        };
        result.unwrap_or_else(|reply| reply)
    }

    // ── Confirmations ───────────────────────────────────────────────

    fn get_confirmations(&self) -> Reply {
        ok(json!({ "confirmations": self.store.confirmation_list() }))
    }

    fn add_confirmation(&self, body: &str, client: &ClientMeta) -> Result<Reply, Reply> {
        let confirmation: Confirmation = parse_body(body)?;
        if confirmation.token.trim().is_empty() {
            return Err(bad_request("token is required"));
        }
        let confirmation =
            confirmation.with_client_meta(client.ip.as_deref(), client.user_agent.as_deref());

        if self.store.confirmation_add(&confirmation).is_err() {
            return Ok((
                Status::InternalServerError,
                json!({ "success": false, "error": "Failed to save confirmation" }),
            ));
        }

        self.notifier.notify(
            Event::ConfirmationReceived,
            confirmation.confirmed_at,
            confirmation.event_data(),
            self.store.webhook_settings_get(),
        );
        Ok(ok(json!({ "success": true, "confirmation": confirmation })))
    }

    // ── Links ───────────────────────────────────────────────────────

    /// Primary links followed by fallback-only links.
    fn all_links(&self) -> Vec<Link> {
        let mut links = self.store.link_list();
        for link in self.fallback.link_list() {
            if !links.iter().any(|l| l.unique_id == link.unique_id) {
                links.push(link);
            }
        }
        links
    }

    fn get_links(&self) -> Reply {
        ok(json!({ "linkDatabase": self.all_links() }))
    }

    fn add_link(&self, body: &str) -> Result<Reply, Reply> {
        let link: Link = parse_body(body)?;
        match self.store.link_add(&link) {
            Ok(()) => Ok(ok(json!({ "success": true, "linkData": link }))),
            Err(_) => Ok((
                Status::InternalServerError,
                json!({ "success": false, "error": "Failed to save link" }),
            )),
        }
    }

    fn unique_id(body: &str) -> Result<String, Reply> {
        let UniqueIdBody { unique_id } = parse_body(body)?;
        if unique_id.trim().is_empty() {
            return Err(bad_request("uniqueId is required"));
        }
        Ok(unique_id)
    }

    /// Try the primary store, then the fallback for links only it holds.
    fn mark(
        &self,
        unique_id: &str,
        op: impl Fn(&dyn Store, &str) -> Result<bool, String>,
    ) -> bool {
        match op(&*self.store, unique_id) {
            Ok(true) => true,
            Ok(false) => op(&*self.fallback, unique_id).unwrap_or(false),
            Err(_) => false,
        }
    }

    fn update_link_click(&self, body: &str, client: &ClientMeta) -> Result<Reply, Reply> {
        let unique_id = Self::unique_id(body)?;
        let success = self.mark(&unique_id, |s, id| s.link_mark_clicked(id));

        if success {
            if let Some(link) = self
                .store
                .link_find(&unique_id)
                .or_else(|| self.fallback.link_find(&unique_id))
            {
                self.notifier.notify(
                    Event::LinkClicked,
                    Utc::now(),
                    json!({
                        "uniqueId": link.unique_id,
                        "token": link.token,
                        "name": link.name,
                        "email": link.email,
                        "clickedAt": link.clicked_at,
                        "userAgent": client.user_agent.as_deref().unwrap_or_default(),
                        "ipAddress": client.ip.as_deref().unwrap_or_default(),
                    }),
                    self.store.webhook_settings_get(),
                );
            }
        }
        Ok(ok(json!({ "success": success })))
    }

    fn update_link_confirmation(&self, body: &str) -> Result<Reply, Reply> {
        let unique_id = Self::unique_id(body)?;
        let success = self.mark(&unique_id, |s, id| s.link_mark_confirmed(id));
        Ok(ok(json!({ "success": success })))
    }

    fn base_url(&self, requested: Option<String>) -> Result<String, Reply> {
        let base = requested
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| self.config.links.base_url.clone());
        url::Url::parse(base.trim()).map_err(|e| bad_request(format!("Invalid baseUrl: {}", e)))?;
        Ok(base)
    }

    fn generate(&self, name: &str, email: &str, base_url: &str) -> Result<links::GeneratedLink, Reply> {
        links::generate_confirmation_link(
            &*self.store,
            &*self.fallback,
            name,
            email,
            base_url,
            self.config.features.tracking,
        )
        .map_err(|e| {
            log::error!("[dispatch] link generation failed: {}", e);
            (
                Status::InternalServerError,
                json!({ "success": false, "error": "Failed to generate link" }),
            )
        })
    }

    fn generate_link(&self, body: &str) -> Result<Reply, Reply> {
        let req: GenerateLinkBody = parse_body(body)?;
        let name = req.name.trim();
        let email = req.email.trim();
        if name.is_empty() || email.is_empty() {
            return Err(bad_request("Both name and email are required"));
        }
        if !links::is_valid_email(email) {
            return Err(bad_request("Invalid email address"));
        }
        let base_url = self.base_url(req.base_url)?;

        let generated = self.generate(name, email, &base_url)?;
        Ok(ok(json!({
            "success": true,
            "linkData": generated.link_data,
            "storedIn": generated.stored_in,
        })))
    }

    fn generate_bulk_links(&self, body: &str) -> Result<Reply, Reply> {
        let req: BulkLinksBody = parse_body(body)?;
        let recipients = links::parse_recipients(&req.text).map_err(|errors| {
            (
                Status::BadRequest,
                json!({ "error": "Invalid recipient list", "errors": errors }),
            )
        })?;
        if recipients.is_empty() {
            return Err(bad_request("No recipients given"));
        }
        let base_url = self.base_url(req.base_url)?;

        let mut generated = Vec::with_capacity(recipients.len());
        let mut fallback_used = false;
        for r in &recipients {
            let g = self.generate(&r.name, &r.email, &base_url)?;
            fallback_used |= g.stored_in == StoredIn::Fallback;
            generated.push(g.link_data);
        }
        if fallback_used {
            log::warn!("[dispatch] bulk generation stored some links in the fallback store");
        }
        Ok(ok(json!({ "success": true, "links": generated })))
    }

    // ── Webhooks ────────────────────────────────────────────────────

    fn get_webhook_settings(&self) -> Reply {
        ok(json!({ "webhookSettings": self.store.webhook_settings_get() }))
    }

    fn save_webhook_settings(&self, body: &str) -> Result<Reply, Reply> {
        let mut settings: WebhookSettings = parse_body(body)?;
        settings.url = settings.url.trim().to_string();
        settings.secret = settings.secret.trim().to_string();
        if settings.enabled && settings.url.is_empty() {
            return Err(bad_request("Webhook URL is required when enabled"));
        }
        match self.store.webhook_settings_save(&settings) {
            Ok(()) => Ok(ok(json!({ "success": true }))),
            Err(_) => Ok((
                Status::InternalServerError,
                json!({ "success": false, "error": "Failed to save webhook settings" }),
            )),
        }
    }

    fn get_webhook_logs(&self) -> Reply {
        ok(json!({ "webhookLogs": self.store.webhook_log_list() }))
    }

    fn add_webhook_log(&self, body: &str) -> Result<Reply, Reply> {
        let entry: WebhookLogEntry = parse_body(body)?;
        let success = self.store.webhook_log_add(entry).is_ok();
        Ok(ok(json!({ "success": success })))
    }

    fn clear_webhook_logs(&self) -> Reply {
        ok(json!({ "success": self.store.webhook_log_clear().is_ok() }))
    }

    fn test_webhook(&self, body: &str) -> Result<Reply, Reply> {
        let settings = if body.trim().is_empty() {
            self.store.webhook_settings_get()
        } else {
            parse_body(body)?
        };
        let timeout = Duration::from_secs(self.config.webhook.timeout_secs);
        Ok(match webhook::send_test(&settings, timeout) {
            Ok(code) => ok(json!({
                "success": (200..300).contains(&code),
                "status": code,
            })),
            Err(e) => ok(json!({ "success": false, "error": e })),
        })
    }

    // ── Maintenance ─────────────────────────────────────────────────

    fn clear_all(&self) -> Reply {
        let primary = self.store.clear_all();
        let fallback = self.fallback.clear_all();
        ok(json!({ "success": primary.is_ok() && fallback.is_ok() }))
    }

    fn get_stats(&self) -> Reply {
        let stats = LinkStats::compute(
            &self.all_links(),
            &self.store.confirmation_list(),
            Utc::now(),
        );
        ok(json!({ "stats": stats }))
    }
}
