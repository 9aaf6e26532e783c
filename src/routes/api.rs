use std::sync::Arc;

use rocket::data::{Data, ToByteUnit};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::dispatch::Dispatcher;
use crate::routes::client::ClientMeta;

const BODY_LIMIT_KIB: u64 = 512;

/// Run the action on the blocking pool. A panic inside it becomes a 500;
/// the details only reach the server log.
async fn run(
    dispatcher: &State<Arc<Dispatcher>>,
    action: Option<String>,
    body: String,
    client: ClientMeta,
) -> (Status, Json<Value>) {
    let dispatcher = Arc::clone(dispatcher.inner());
    let label = action.clone().unwrap_or_default();
    let outcome = rocket::tokio::task::spawn_blocking(move || {
        dispatcher.handle(action.as_deref(), &body, &client)
    })
    .await;

    match outcome {
        Ok((status, value)) => (status, Json(value)),
        Err(e) => {
            log::error!("[api] action '{}' aborted: {}", label, e);
            (
                Status::InternalServerError,
                Json(json!({ "error": "Internal server error" })),
            )
        }
    }
}

#[get("/confirmations?<action>")]
pub async fn dispatch_get(
    dispatcher: &State<Arc<Dispatcher>>,
    action: Option<String>,
    client: ClientMeta,
) -> (Status, Json<Value>) {
    run(dispatcher, action, String::new(), client).await
}

#[post("/confirmations?<action>", data = "<data>")]
pub async fn dispatch_post(
    dispatcher: &State<Arc<Dispatcher>>,
    action: Option<String>,
    client: ClientMeta,
    data: Data<'_>,
) -> (Status, Json<Value>) {
    let body = match data.open(BODY_LIMIT_KIB.kibibytes()).into_string().await {
        Ok(body) if body.is_complete() => body.into_inner(),
        Ok(_) => {
            return (
                Status::PayloadTooLarge,
                Json(json!({ "error": "Request body too large" })),
            )
        }
        Err(e) => {
            log::warn!("[api] could not read request body: {}", e);
            return (
                Status::BadRequest,
                Json(json!({ "error": "Unreadable request body" })),
            );
        }
    };
    run(dispatcher, action, body, client).await
}

/// CORS preflight: answered directly, headers come from the CORS fairing.
#[options("/<_..>")]
pub fn preflight() -> Status {
    Status::Ok
}

pub fn routes() -> Vec<rocket::Route> {
    routes![dispatch_get, dispatch_post]
}
