use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder browsers send when they cannot see their own address.
pub const IP_PLACEHOLDER: &str = "client-ip-unavailable";

/// A recipient's recorded consent. Written once, never edited.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "Utc::now")]
    pub confirmed_at: DateTime<Utc>,
    #[serde(default)]
    pub participation_consent: bool,
    #[serde(default)]
    pub photo_consent: bool,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
}

impl Confirmation {
    /// Fill in request metadata the browser could not supply itself.
    pub fn with_client_meta(mut self, ip: Option<&str>, user_agent: Option<&str>) -> Self {
        if self.ip_address.is_empty() || self.ip_address == IP_PLACEHOLDER {
            if let Some(ip) = ip {
                self.ip_address = ip.to_string();
            }
        }
        if self.user_agent.is_empty() {
            if let Some(ua) = user_agent {
                self.user_agent = ua.to_string();
            }
        }
        self
    }

    /// Body of the `confirmation_received` webhook event.
    pub fn event_data(&self) -> serde_json::Value {
        serde_json::json!({
            "token": self.token,
            "name": self.name,
            "email": self.email,
            "confirmedAt": self.confirmed_at,
            "participationConsent": self.participation_consent,
            "photoConsent": self.photo_consent,
            "ipAddress": self.ip_address,
            "userAgent": self.user_agent,
        })
    }
}
