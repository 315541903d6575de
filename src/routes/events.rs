use std::sync::Arc;

use actix_web::{http::header, web, HttpResponse};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{context::AuthState, state::AdminSession};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/events").route(web::get().to(stream_auth_state)));
}

/// Current authorization state first, then every change, so open admin pages
/// can leave as soon as the session ends.
async fn stream_auth_state(session: web::ReqData<Arc<AdminSession>>) -> HttpResponse {
    let initial = session.auth.state();
    let rx = session.auth.changes();
    let changes = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(state) => Some(state),
        Err(_) => None,
    });
    let stream = tokio_stream::once(initial)
        .chain(changes)
        .map(|state| Ok::<web::Bytes, actix_web::Error>(state_to_bytes(&state)));

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

fn state_to_bytes(state: &AuthState) -> web::Bytes {
    let payload = serde_json::to_string(state).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: auth\ndata: {}\n\n", payload))
}
