mod middleware;
mod print;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::{application::print::PrintService, config::Settings};

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct PrintState {
    pub print: Arc<PrintService>,
    /// Configured public base URL; derived per request when `None`.
    pub base_url: Option<String>,
    pub body_limit: usize,
}

impl PrintState {
    pub fn new(print: Arc<PrintService>, settings: &Settings) -> Self {
        Self {
            print,
            base_url: settings.server.base_url.clone(),
            body_limit: usize::try_from(settings.server.max_request_bytes.get())
                .unwrap_or(usize::MAX),
        }
    }
}

pub fn build_router(state: PrintState) -> Router {
    Router::new()
        .route(
            "/print.pdf",
            get(print::print_document)
                .post(print::print_document)
                .fallback(print::unknown_method),
        )
        .route(
            "/create.json",
            post(print::create_ticket).fallback(print::unknown_method),
        )
        .route(
            "/info.json",
            get(print::info).fallback(print::unknown_method),
        )
        .fallback(print::fetch_or_unknown)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
