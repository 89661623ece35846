// src/handlers/health.rs
use actix_web::{web, HttpResponse, Responder};

use crate::directory::worker::SessionState;

/// Liveness snapshot of the directory session. No auth, no caching.
pub async fn health(state: web::Data<SessionState>) -> impl Responder {
    HttpResponse::Ok().json(state.snapshot())
}
