use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::models::webhook::{WebhookLogEntry, WebhookSettings, WebhookStatus};
use crate::store::Store;

/// Header carrying the shared secret. Sent in clear, not a signature.
pub const SECRET_HEADER: &str = "X-Webhook-Secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ConfirmationReceived,
    LinkClicked,
    Test,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfirmationReceived => "confirmation_received",
            Event::LinkClicked => "link_clicked",
            Event::Test => "webhook_test",
        }
    }
}

/// `{event, timestamp, data}` as posted to the receiver. `timestamp` is when
/// the event happened, e.g. the confirmation's `confirmedAt`.
pub fn envelope(event: Event, timestamp: DateTime<Utc>, data: Value) -> Value {
    json!({
        "event": event.as_str(),
        "timestamp": timestamp,
        "data": data,
    })
}

/// POST `body` to the configured URL. Returns the response status code.
pub fn post(settings: &WebhookSettings, body: &Value, timeout: Duration) -> Result<u16, String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("HTTP client error: {}", e))?;

    let mut req = client
        .post(settings.url.trim())
        .header("Content-Type", "application/json")
        .json(body);
    if !settings.secret.is_empty() {
        req = req.header(SECRET_HEADER, settings.secret.as_str());
    }

    let resp = req
        .send()
        .map_err(|e| format!("Webhook request failed: {}", e))?;
    Ok(resp.status().as_u16())
}

/// Deliver a `webhook_test` event right away. Nothing is logged.
pub fn send_test(settings: &WebhookSettings, timeout: Duration) -> Result<u16, String> {
    if settings.url.trim().is_empty() {
        return Err("Webhook URL is not configured".into());
    }
    let body = envelope(
        Event::Test,
        Utc::now(),
        json!({ "message": "This is a test webhook from your confirmation page system." }),
    );
    post(settings, &body, timeout)
}

/// Posts events to the user's webhook and records every attempt in the store.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn Store>,
    timeout: Duration,
    enabled: bool,
}

impl Notifier {
    /// `enabled = false` turns every notification into a no-op.
    pub fn new(store: Arc<dyn Store>, timeout: Duration, enabled: bool) -> Self {
        Notifier {
            store,
            timeout,
            enabled,
        }
    }

    /// Single attempt, run on the calling thread. Returns the recorded status,
    /// or `None` when nothing was sent.
    pub fn deliver(
        &self,
        event: Event,
        at: DateTime<Utc>,
        data: Value,
        settings: &WebhookSettings,
    ) -> Option<WebhookStatus> {
        if !self.enabled || !settings.is_active() {
            return None;
        }

        let body = envelope(event, at, data);
        let (status, payload) = match post(settings, &body, self.timeout) {
            Ok(code) => {
                log::info!("[webhook] {} delivered to {} ({})", event.as_str(), settings.url, code);
                let status = match event {
                    Event::LinkClicked => WebhookStatus::ClickTracked,
                    _ => WebhookStatus::Code(code),
                };
                (status, body)
            }
            Err(e) => {
                log::warn!("[webhook] {} to {} failed: {}", event.as_str(), settings.url, e);
                (WebhookStatus::Failed, json!({ "error": e }))
            }
        };

        let entry = WebhookLogEntry {
            url: settings.url.clone(),
            status: status.clone(),
            payload,
        };
        if let Err(e) = self.store.webhook_log_add(entry) {
            log::error!("[webhook] could not record delivery log: {}", e);
        }
        Some(status)
    }

    /// Fire-and-forget: delivery happens on a detached thread so a slow
    /// receiver never holds up the caller.
    pub fn notify(
        &self,
        event: Event,
        at: DateTime<Utc>,
        data: Value,
        settings: WebhookSettings,
    ) -> Option<JoinHandle<()>> {
        if !self.enabled || !settings.is_active() {
            return None;
        }
        let notifier = self.clone();
        std::thread::Builder::new()
            .name("webhook".into())
            .spawn(move || {
                notifier.deliver(event, at, data, &settings);
            })
            .map_err(|e| log::error!("[webhook] could not spawn delivery thread: {}", e))
            .ok()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// One-shot HTTP receiver on localhost. Answers `status` and hands back
    /// the raw request it saw.
    pub fn spawn_receiver(status: u16) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = conn.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + content_length {
                        break;
                    }
                }
            }
            let reply = format!(
                "HTTP/1.1 {} OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            );
            conn.write_all(reply.as_bytes()).unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (url, handle)
    }

    fn settings(url: &str, secret: &str) -> WebhookSettings {
        WebhookSettings {
            enabled: true,
            url: url.to_string(),
            secret: secret.to_string(),
        }
    }

    fn notifier(store: &Arc<MemoryStore>) -> Notifier {
        Notifier::new(store.clone(), Duration::from_secs(5), true)
    }

    #[test]
    fn test_disabled_settings_are_noop() {
        let store = Arc::new(MemoryStore::new());
        let n = notifier(&store);
        let mut s = settings("http://127.0.0.1:1/hook", "");
        s.enabled = false;
        assert!(n.deliver(Event::ConfirmationReceived, Utc::now(), json!({}), &s).is_none());
        assert!(n
            .deliver(Event::ConfirmationReceived, Utc::now(), json!({}), &settings("", ""))
            .is_none());
        assert!(n.notify(Event::LinkClicked, Utc::now(), json!({}), s).is_none());
        assert!(store.webhook_log_list().is_empty());
    }

    #[test]
    fn test_feature_switch_off_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let n = Notifier::new(store.clone(), Duration::from_secs(5), false);
        let s = settings("http://127.0.0.1:1/hook", "");
        assert!(n.deliver(Event::ConfirmationReceived, Utc::now(), json!({}), &s).is_none());
        assert!(store.webhook_log_list().is_empty());
    }

    #[test]
    fn test_success_logs_status_code_and_sends_secret() {
        let (url, receiver) = spawn_receiver(202);
        let store = Arc::new(MemoryStore::new());
        let status = notifier(&store).deliver(
            Event::ConfirmationReceived,
            Utc::now(),
            json!({ "token": "abc" }),
            &settings(&url, "shh"),
        );
        assert_eq!(status, Some(WebhookStatus::Code(202)));

        let request = receiver.join().unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.to_ascii_lowercase().contains("x-webhook-secret: shh"));
        assert!(request.contains("\"event\":\"confirmation_received\""));
        assert!(request.contains("\"token\":\"abc\""));

        let logs = store.webhook_log_list();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, WebhookStatus::Code(202));
        assert_eq!(logs[0].url, url);
        assert_eq!(logs[0].payload["event"], "confirmation_received");
    }

    #[test]
    fn test_envelope_carries_event_time() {
        let (url, receiver) = spawn_receiver(200);
        let store = Arc::new(MemoryStore::new());
        let at: DateTime<Utc> = "2024-05-01T10:00:00Z".parse().unwrap();
        notifier(&store).deliver(Event::ConfirmationReceived, at, json!({}), &settings(&url, ""));

        let request = receiver.join().unwrap();
        assert!(request.contains("\"timestamp\":\"2024-05-01T10:00:00Z\""));
        assert_eq!(store.webhook_log_list()[0].payload["timestamp"], "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_no_secret_header_when_empty() {
        let (url, receiver) = spawn_receiver(200);
        let store = Arc::new(MemoryStore::new());
        notifier(&store).deliver(
            Event::ConfirmationReceived,
            Utc::now(),
            json!({}),
            &settings(&url, ""),
        );
        let request = receiver.join().unwrap();
        assert!(!request.to_ascii_lowercase().contains("x-webhook-secret"));
    }

    #[test]
    fn test_click_is_logged_as_click_tracked() {
        let (url, receiver) = spawn_receiver(500);
        let store = Arc::new(MemoryStore::new());
        let status = notifier(&store).deliver(
            Event::LinkClicked,
            Utc::now(),
            json!({ "uniqueId": "X1" }),
            &settings(&url, ""),
        );
        receiver.join().unwrap();
        assert_eq!(status, Some(WebhookStatus::ClickTracked));
        assert_eq!(store.webhook_log_list()[0].status, WebhookStatus::ClickTracked);
    }

    #[test]
    fn test_transport_failure_logged_as_failed() {
        let store = Arc::new(MemoryStore::new());
        let status = notifier(&store).deliver(
            Event::ConfirmationReceived,
            Utc::now(),
            json!({}),
            &settings("http://127.0.0.1:1/hook", ""),
        );
        assert_eq!(status, Some(WebhookStatus::Failed));
        let logs = store.webhook_log_list();
        assert_eq!(logs[0].status, WebhookStatus::Failed);
        assert!(logs[0].payload["error"].is_string());
    }

    #[test]
    fn test_notify_runs_in_background() {
        let (url, receiver) = spawn_receiver(200);
        let store = Arc::new(MemoryStore::new());
        let handle = notifier(&store)
            .notify(Event::ConfirmationReceived, Utc::now(), json!({}), settings(&url, ""))
            .unwrap();
        handle.join().unwrap();
        receiver.join().unwrap();
        assert_eq!(store.webhook_log_list().len(), 1);
    }

    #[test]
    fn test_send_test_event() {
        let (url, receiver) = spawn_receiver(200);
        let code = send_test(&settings(&url, ""), Duration::from_secs(5)).unwrap();
        assert_eq!(code, 200);
        assert!(receiver.join().unwrap().contains("\"event\":\"webhook_test\""));

        assert!(send_test(&settings(" ", ""), Duration::from_secs(5)).is_err());
    }
}
