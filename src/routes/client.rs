use rocket::request::{FromRequest, Outcome, Request};

/// Caller details recorded with a confirmation.
///
/// The address is taken from the first non-empty of:
///   1. CF-Connecting-IP (Cloudflare)
///   2. True-Client-IP (Cloudflare Enterprise / Akamai)
///   3. X-Real-IP (nginx proxy_set_header)
///   4. X-Forwarded-For (first IP in the chain is the client)
///   5. Rocket's client_ip() (socket peer address)
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

fn header_ip(request: &Request<'_>) -> Option<String> {
    let headers = request.headers();
    for name in ["CF-Connecting-IP", "True-Client-IP", "X-Real-IP"] {
        if let Some(ip) = headers.get_one(name) {
            let ip = ip.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }

    // X-Forwarded-For: client, proxy1, proxy2 — take the first (leftmost)
    headers
        .get_one("X-Forwarded-For")
        .and_then(|fwd| fwd.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientMeta {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = header_ip(request).or_else(|| request.client_ip().map(|ip| ip.to_string()));
        let user_agent = request
            .headers()
            .get_one("User-Agent")
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .map(str::to_string);
        Outcome::Success(ClientMeta { ip, user_agent })
    }
}
