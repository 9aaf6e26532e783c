use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use rand::Rng;
use regex::Regex;
use serde::Serialize;

use crate::models::link::Link;
use crate::store::Store;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TOKEN_LEN: usize = 26;
const UNIQUE_ID_RANDOM_LEN: usize = 8;

/// Where a generated link ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredIn {
    Primary,
    Fallback,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedLink {
    pub link_data: Link,
    pub stored_in: StoredIn,
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Opaque confirmation token. Uniqueness is probabilistic only.
pub fn generate_token() -> String {
    random_base36(TOKEN_LEN)
}

/// Tracking id: base-36 epoch millis then random chars, upper-cased,
/// so ids sort roughly by creation time.
pub fn generate_unique_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}{}", to_base36(millis), random_base36(UNIQUE_ID_RANDOM_LEN)).to_uppercase()
}

/// `{base_url}/?token=..&id=..&name=..&email=..` with every value URL-encoded.
pub fn build_url(
    base_url: &str,
    token: &str,
    unique_id: Option<&str>,
    name: &str,
    email: &str,
) -> Result<String, String> {
    let base = format!("{}/", base_url.trim().trim_end_matches('/'));
    let mut url = url::Url::parse(&base).map_err(|e| format!("Invalid base URL: {}", e))?;
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("token", token);
        if let Some(id) = unique_id {
            q.append_pair("id", id);
        }
        q.append_pair("name", name);
        q.append_pair("email", email);
    }
    Ok(url.into())
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
        .is_match(email)
}

/// Create a link for one recipient and register it.
///
/// The link is written to `primary`; if that write fails it goes to
/// `fallback` instead. With tracking off the URL carries no `id`, but the
/// link is still registered.
pub fn generate_confirmation_link(
    primary: &dyn Store,
    fallback: &dyn Store,
    name: &str,
    email: &str,
    base_url: &str,
    tracking: bool,
) -> Result<GeneratedLink, String> {
    let token = generate_token();
    let unique_id = generate_unique_id();
    let url = build_url(
        base_url,
        &token,
        tracking.then_some(unique_id.as_str()),
        name,
        email,
    )?;

    let link = Link {
        unique_id,
        token,
        url,
        name: name.to_string(),
        email: email.to_string(),
        created_at: Utc::now(),
        clicked: false,
        clicked_at: None,
        confirmed: false,
        confirmed_at: None,
    };

    let stored_in = match primary.link_add(&link) {
        Ok(()) => StoredIn::Primary,
        Err(e) => {
            log::warn!(
                "[links] primary store rejected link {} ({}), using fallback",
                link.unique_id,
                e
            );
            fallback
                .link_add(&link)
                .map_err(|e| format!("Failed to store link: {}", e))?;
            StoredIn::Fallback
        }
    };

    Ok(GeneratedLink {
        link_data: link,
        stored_in,
    })
}

/// One recipient parsed from a `Name <email>` line.
#[derive(Debug, PartialEq)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

/// Parse one recipient per non-empty line. Any bad line fails the batch,
/// reporting every problem with its 1-based line number.
pub fn parse_recipients(text: &str) -> Result<Vec<Recipient>, Vec<String>> {
    static LINE_RE: OnceLock<Regex> = OnceLock::new();
    let line_re =
        LINE_RE.get_or_init(|| Regex::new(r"^(.+?)\s*<(.+?)>$").expect("valid recipient regex"));

    let mut recipients = Vec::new();
    let mut errors = Vec::new();
    for (index, line) in text.lines().filter(|l| !l.trim().is_empty()).enumerate() {
        let line = line.trim();
        match line_re.captures(line) {
            Some(caps) => {
                let name = caps[1].trim().to_string();
                let email = caps[2].trim().to_string();
                if is_valid_email(&email) {
                    recipients.push(Recipient { name, email });
                } else {
                    errors.push(format!("Line {}: Invalid email format", index + 1));
                }
            }
            None => errors.push(format!(
                "Line {}: Invalid format (should be \"Name <email@domain.com>\")",
                index + 1
            )),
        }
    }

    if errors.is_empty() {
        Ok(recipients)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file::FileStore;
    use crate::store::memory::MemoryStore;
    use crate::store::tests::scratch_dir;
    use std::collections::HashSet;

    fn query(url: &str) -> Vec<(String, String)> {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    fn param(url: &str, key: &str) -> Option<String> {
        query(url).into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[test]
    fn test_token_shape() {
        let t = generate_token();
        assert_eq!(t.len(), TOKEN_LEN);
        assert!(t.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn test_tokens_do_not_repeat_in_practice() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_unique_id_shape() {
        let id = generate_unique_id();
        assert!(id.len() > UNIQUE_ID_RANDOM_LEN);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn test_url_round_trips_name_and_email() {
        let name = "Zoë O'Brien & Co";
        let email = "zoe+test@example.com";
        let url = build_url("https://consent.example.org/", "tok", Some("ID1"), name, email)
            .unwrap();
        assert!(url.starts_with("https://consent.example.org/?"));
        assert_eq!(param(&url, "token").as_deref(), Some("tok"));
        assert_eq!(param(&url, "id").as_deref(), Some("ID1"));
        assert_eq!(param(&url, "name").as_deref(), Some(name));
        assert_eq!(param(&url, "email").as_deref(), Some(email));
    }

    #[test]
    fn test_url_rejects_bad_base() {
        assert!(build_url("not a url", "t", None, "n", "e@x.io").is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.d"));
        assert!(!is_valid_email("@c.d"));
        assert!(!is_valid_email("a@@c.d"));
    }

    #[test]
    fn test_generate_stores_in_primary() {
        let primary = MemoryStore::new();
        let fallback = MemoryStore::new();
        let g = generate_confirmation_link(
            &primary,
            &fallback,
            "Ada",
            "ada@example.com",
            "http://localhost:8000",
            true,
        )
        .unwrap();
        assert_eq!(g.stored_in, StoredIn::Primary);
        assert!(!g.link_data.clicked && !g.link_data.confirmed);
        assert_eq!(
            param(&g.link_data.url, "id").as_deref(),
            Some(g.link_data.unique_id.as_str())
        );

        let stored = primary.link_list();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], g.link_data);
        assert!(fallback.link_list().is_empty());
    }

    #[test]
    fn test_generate_falls_back_when_primary_fails() {
        let dir = scratch_dir("gen_fallback");
        std::fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("file");
        std::fs::write(&blocker, "x").unwrap();
        let primary = FileStore::new(blocker.join("data"));
        let fallback = MemoryStore::new();

        let g = generate_confirmation_link(
            &primary,
            &fallback,
            "Ada",
            "ada@example.com",
            "http://localhost:8000",
            true,
        )
        .unwrap();
        assert_eq!(g.stored_in, StoredIn::Fallback);
        assert!(primary.link_list().is_empty());
        assert_eq!(fallback.link_list(), vec![g.link_data]);
    }

    #[test]
    fn test_generate_without_tracking() {
        let primary = MemoryStore::new();
        let fallback = MemoryStore::new();
        let g = generate_confirmation_link(
            &primary,
            &fallback,
            "Ada",
            "ada@example.com",
            "http://localhost:8000",
            false,
        )
        .unwrap();
        assert_eq!(g.stored_in, StoredIn::Primary);
        assert!(param(&g.link_data.url, "id").is_none());
        assert_eq!(primary.link_list(), vec![g.link_data]);
    }

    #[test]
    fn test_parse_recipients() {
        let text = "Ada Lovelace <ada@example.com>\n\n  Alan Turing<alan@example.org>  \n";
        let r = parse_recipients(text).unwrap();
        assert_eq!(
            r,
            vec![
                Recipient {
                    name: "Ada Lovelace".into(),
                    email: "ada@example.com".into()
                },
                Recipient {
                    name: "Alan Turing".into(),
                    email: "alan@example.org".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_recipients_reports_every_bad_line() {
        let text = "Ada <ada@example.com>\nno brackets here\nBob <bob@nowhere>";
        let errors = parse_recipients(text).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Line 2: Invalid format"));
        assert_eq!(errors[1], "Line 3: Invalid email format");
    }
}
