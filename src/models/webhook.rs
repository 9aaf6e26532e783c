use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of webhook log entries kept; older ones are dropped first.
pub const MAX_WEBHOOK_LOGS: usize = 100;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WebhookSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub secret: String,
}

impl WebhookSettings {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.url.trim().is_empty()
    }
}

/// Outcome recorded for a delivery attempt.
/// On the wire this is the bare status code or a string label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStatus", into = "RawStatus")]
pub enum WebhookStatus {
    Code(u16),
    Failed,
    ClickTracked,
    Other(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawStatus {
    Code(u16),
    Label(String),
}

impl From<RawStatus> for WebhookStatus {
    fn from(raw: RawStatus) -> Self {
        match raw {
            RawStatus::Code(c) => WebhookStatus::Code(c),
            RawStatus::Label(s) => match s.as_str() {
                "failed" => WebhookStatus::Failed,
                "click-tracked" => WebhookStatus::ClickTracked,
                _ => WebhookStatus::Other(s),
            },
        }
    }
}

impl From<WebhookStatus> for RawStatus {
    fn from(status: WebhookStatus) -> Self {
        match status {
            WebhookStatus::Code(c) => RawStatus::Code(c),
            WebhookStatus::Failed => RawStatus::Label("failed".into()),
            WebhookStatus::ClickTracked => RawStatus::Label("click-tracked".into()),
            WebhookStatus::Other(s) => RawStatus::Label(s),
        }
    }
}

/// A log entry as submitted; the store stamps the time.
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookLogEntry {
    #[serde(default)]
    pub url: String,
    pub status: WebhookStatus,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WebhookLog {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub status: WebhookStatus,
    #[serde(default)]
    pub payload: Value,
}

impl WebhookLog {
    pub fn stamp(entry: WebhookLogEntry, at: DateTime<Utc>) -> Self {
        WebhookLog {
            timestamp: at,
            url: entry.url,
            status: entry.status,
            payload: entry.payload,
        }
    }
}

/// Append `log` and drop from the front until at most `MAX_WEBHOOK_LOGS` remain.
pub fn push_bounded(logs: &mut Vec<WebhookLog>, log: WebhookLog) {
    logs.push(log);
    if logs.len() > MAX_WEBHOOK_LOGS {
        let excess = logs.len() - MAX_WEBHOOK_LOGS;
        logs.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_value(WebhookStatus::Code(204)).unwrap(), 204);
        assert_eq!(serde_json::to_value(WebhookStatus::Failed).unwrap(), "failed");
        assert_eq!(
            serde_json::to_value(WebhookStatus::ClickTracked).unwrap(),
            "click-tracked"
        );

        let s: WebhookStatus = serde_json::from_str("\"click-tracked\"").unwrap();
        assert_eq!(s, WebhookStatus::ClickTracked);
        let s: WebhookStatus = serde_json::from_str("500").unwrap();
        assert_eq!(s, WebhookStatus::Code(500));
        let s: WebhookStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(s, WebhookStatus::Other("queued".into()));
    }

    #[test]
    fn test_numeric_label_keeps_string_type() {
        let s: WebhookStatus = serde_json::from_str("\"200\"").unwrap();
        assert_eq!(s, WebhookStatus::Other("200".into()));
        assert_eq!(serde_json::to_value(&s).unwrap(), serde_json::json!("200"));
    }

    #[test]
    fn test_settings_active() {
        let mut s = WebhookSettings::default();
        assert!(!s.is_active());
        s.enabled = true;
        assert!(!s.is_active());
        s.url = "https://hooks.example.com/in".into();
        assert!(s.is_active());
    }

    #[test]
    fn test_push_bounded_fifo() {
        let mut logs = Vec::new();
        for i in 0..(MAX_WEBHOOK_LOGS as u16 + 1) {
            let entry = WebhookLogEntry {
                url: format!("https://h/{}", i),
                status: WebhookStatus::Code(200),
                payload: Value::Null,
            };
            push_bounded(&mut logs, WebhookLog::stamp(entry, Utc::now()));
        }
        assert_eq!(logs.len(), MAX_WEBHOOK_LOGS);
        assert_eq!(logs[0].url, "https://h/1");
        assert_eq!(logs[MAX_WEBHOOK_LOGS - 1].url, "https://h/100");
    }
}
