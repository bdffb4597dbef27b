// API route configuration

use crate::api::handlers::{self, ExtractState, LoadState, ServiceName};
use actix_web::web;

/// Routes for the extract service.
pub fn configure_extract(
    state: web::Data<ExtractState>,
) -> impl Fn(&mut web::ServiceConfig) + Clone + Send + 'static {
    move |cfg| {
        cfg.app_data(state.clone())
            .app_data(web::Data::new(ServiceName("extract")))
            .route("/health", web::get().to(handlers::health))
            .route("/fetch-stats", web::get().to(handlers::fetch_stats));
    }
}

/// Routes for the load service. The path keeps its historical name.
pub fn configure_load(
    state: web::Data<LoadState>,
) -> impl Fn(&mut web::ServiceConfig) + Clone + Send + 'static {
    move |cfg| {
        cfg.app_data(state.clone())
            .app_data(web::Data::new(ServiceName("load")))
            .route("/health", web::get().to(handlers::health))
            .route("/load-to-bigquery", web::get().to(handlers::load_to_warehouse));
    }
}
