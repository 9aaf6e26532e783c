#[macro_use]
extern crate rocket;

use std::sync::Arc;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::serde::json::Json;
use rocket::{Build, Rocket};
use serde_json::{json, Value};

mod boot;
mod config;
mod dispatch;
mod links;
mod models;
mod routes;
mod store;
mod webhook;


use config::AppConfig;
use dispatch::Dispatcher;
use store::memory::MemoryStore;
use store::Store;

/// Open CORS: any origin may call the API.
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info { name: "CORS Headers", kind: Kind::Response }
    }

    async fn on_response<'r>(&self, _req: &'r rocket::Request<'_>, res: &mut rocket::Response<'r>) {
        res.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        res.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));
        res.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));
    }
}

#[catch(404)]
fn not_found() -> Json<Value> {
    Json(json!({ "error": "Not found" }))
}

#[catch(500)]
fn server_error() -> Json<Value> {
    Json(json!({ "error": "Internal server error" }))
}

/// Assemble the server around an already-selected primary store.
pub fn build(config: AppConfig, store: Arc<dyn Store>) -> Rocket<Build> {
    // links land here when the primary store rejects a write
    let fallback: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(store, fallback, config);

    rocket::build()
        .manage(Arc::new(dispatcher))
        .attach(Cors)
        .mount("/api", routes::api::routes())
        .mount("/", routes![routes::api::preflight])
        .register("/", catchers![not_found, server_error])
}

#[launch]
fn rocket() -> _ {
    env_logger::init();

    let config = AppConfig::load();

    // Boot check — verify/create the data directory, validate config
    boot::run(&config);

    let store = store::from_config(&config.storage);
    log::info!(
        "Storage backend: {} (tracking: {}, webhooks: {})",
        store.backend_name(),
        config.features.tracking,
        config.features.webhooks
    );

    build(config, store)
}
