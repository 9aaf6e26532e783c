use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A generated confirmation link and its tracking state.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub unique_id: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub clicked: bool,
    #[serde(default)]
    pub clicked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Link {
    /// Flip `clicked` on. The first click's timestamp is kept.
    pub fn mark_clicked(&mut self, at: DateTime<Utc>) {
        if !self.clicked {
            self.clicked = true;
            self.clicked_at = Some(at);
        }
    }

    /// Flip `confirmed` on. The first confirmation's timestamp is kept.
    pub fn mark_confirmed(&mut self, at: DateTime<Utc>) {
        if !self.confirmed {
            self.confirmed = true;
            self.confirmed_at = Some(at);
        }
    }
}

/// Aggregate counters for the admin dashboard.
#[derive(Debug, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkStats {
    pub total_confirmations: usize,
    pub today_confirmations: usize,
    pub total_links: usize,
    pub total_clicks: usize,
    pub total_confirmed: usize,
    pub conversion_rate: u32,
}

impl LinkStats {
    pub fn compute(
        links: &[Link],
        confirmations: &[super::confirmation::Confirmation],
        now: DateTime<Utc>,
    ) -> Self {
        let today = now.date_naive();
        let total_clicks = links.iter().filter(|l| l.clicked).count();
        let total_confirmed = links.iter().filter(|l| l.confirmed).count();
        let conversion_rate = if total_clicks > 0 {
            ((total_confirmed as f64 / total_clicks as f64) * 100.0).round() as u32
        } else {
            0
        };
        LinkStats {
            total_confirmations: confirmations.len(),
            today_confirmations: confirmations
                .iter()
                .filter(|c| c.confirmed_at.date_naive() == today)
                .count(),
            total_links: links.len(),
            total_clicks,
            total_confirmed,
            conversion_rate,
        }
    }
}
