// HTTP request handlers for the extract and load services

use crate::api::models::*;
use crate::error::EtlError;
use crate::extract::{run_extract, ExtractOptions};
use crate::load::{run_load, LoadOptions};
use crate::models::Roster;
use crate::riot::MatchSource;
use crate::storage::BlobStore;
use crate::warehouse::Warehouse;
use actix_web::{web, HttpResponse};
use std::sync::Arc;

/// Everything `/fetch-stats` needs, shared across workers.
pub struct ExtractState {
    pub roster: Roster,
    pub source: Arc<dyn MatchSource>,
    pub store: Arc<dyn BlobStore>,
    pub options: ExtractOptions,
}

pub struct LoadState {
    pub roster: Roster,
    pub store: Arc<dyn BlobStore>,
    pub warehouse: Arc<dyn Warehouse>,
    /// Only set for live key resolution
    pub source: Option<Arc<dyn MatchSource>>,
    pub options: LoadOptions,
}

/// Name reported by `/health`.
#[derive(Debug, Clone, Copy)]
pub struct ServiceName(pub &'static str);

fn error_response(err: &EtlError) -> HttpResponse {
    tracing::error!(kind = err.kind(), error = %err, "pipeline run failed");
    HttpResponse::InternalServerError().json(ErrorResponse {
        error: err.to_string(),
    })
}

pub async fn health(service: web::Data<ServiceName>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        service: service.0.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Run one extract and report where the snapshot landed.
pub async fn fetch_stats(state: web::Data<ExtractState>) -> HttpResponse {
    tracing::info!(players = state.roster.len(), "fetch-stats requested");
    match run_extract(
        &state.roster,
        state.source.as_ref(),
        state.store.as_ref(),
        &state.options,
    )
    .await
    {
        Ok(report) => HttpResponse::Ok().json(FetchStatsResponse {
            message: "Roster data fetched and uploaded".to_string(),
            gcs_uri: report.blob_uri,
        }),
        Err(e) => error_response(&e),
    }
}

/// Load the newest snapshot into the warehouse.
pub async fn load_to_warehouse(state: web::Data<LoadState>) -> HttpResponse {
    tracing::info!(target_table = %state.options.target, "load requested");
    match run_load(
        state.store.as_ref(),
        state.warehouse.as_ref(),
        &state.roster,
        state.source.as_deref(),
        &state.options,
    )
    .await
    {
        Ok(report) => HttpResponse::Ok().json(LoadResponse::from(&report)),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{auth::Auth, routes};
    use crate::extract::KeyResolution;
    use crate::test_utils::{match_doc, MemoryBlobStore, MemoryWarehouse, ScriptedSource};
    use crate::warehouse::{MergeKey, TableRef};
    use actix_web::{http::StatusCode, test, App};

    fn extract_state(source: ScriptedSource, store: Arc<MemoryBlobStore>) -> web::Data<ExtractState> {
        web::Data::new(ExtractState {
            roster: Roster::parse_pairs("Faker#KR1=p-faker").unwrap(),
            source: Arc::new(source),
            store,
            options: ExtractOptions::default(),
        })
    }

    fn faker_source() -> ScriptedSource {
        ScriptedSource::default().with_player(
            "Faker#KR1",
            "p-faker",
            &[("KR_1", match_doc("KR_1", 1_700_000_000_000, &[("p-faker", "Ahri", 5, 2, 10, true)]))],
        )
    }

    fn load_state(store: Arc<MemoryBlobStore>, warehouse: Arc<MemoryWarehouse>) -> web::Data<LoadState> {
        web::Data::new(LoadState {
            roster: Roster::parse_pairs("Faker#KR1=p-faker").unwrap(),
            store,
            warehouse,
            source: None,
            options: LoadOptions {
                snapshot_prefix: "t1_riot_data_".into(),
                target: TableRef::new("riot_data", "match_stats").unwrap(),
                staging: TableRef::new("riot_data", "match_stats_staging").unwrap(),
                merge_key: MergeKey::MatchPlayer,
                key_resolution: KeyResolution::Static,
                skip_existing: false,
                stage_blob: false,
            },
        })
    }

    #[actix_web::test]
    async fn fetch_stats_returns_blob_uri() {
        let store = Arc::new(MemoryBlobStore::default());
        let app = test::init_service(
            App::new().configure(routes::configure_extract(extract_state(faker_source(), store.clone()))),
        )
        .await;
        let req = test::TestRequest::get().uri("/fetch-stats").to_request();
        let body: FetchStatsResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.gcs_uri.starts_with("mem://bucket/t1_riot_data_"));
        assert_eq!(store.names().len(), 1);
    }

    #[actix_web::test]
    async fn fetch_stats_failure_is_500_with_error() {
        let store = Arc::new(MemoryBlobStore::default());
        let mut source = faker_source();
        source.failing_match = Some(("KR_1".into(), 429));
        let app = test::init_service(
            App::new().configure(routes::configure_extract(extract_state(source, store.clone()))),
        )
        .await;
        let req = test::TestRequest::get().uri("/fetch-stats").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.error.contains("429"), "{}", body.error);
        assert!(store.names().is_empty());
    }

    #[actix_web::test]
    async fn load_reports_row_counts() {
        let store = Arc::new(MemoryBlobStore::default());
        let snapshot = serde_json::json!({
            "Faker#KR1": [match_doc("KR_1", 1_700_000_000_000, &[("p-faker", "Ahri", 5, 2, 10, true)])]
        });
        store.insert_at("t1_riot_data_1.json", &serde_json::to_vec(&snapshot).unwrap(), 1);
        let warehouse = Arc::new(MemoryWarehouse::default());
        let app = test::init_service(
            App::new().configure(routes::configure_load(load_state(store, warehouse))),
        )
        .await;
        let req = test::TestRequest::get().uri("/load-to-bigquery").to_request();
        let body: LoadResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.rows_processed, 1);
        assert_eq!(body.skipped, 0);
        assert_eq!(body.message, "Processed 1 rows, merged into warehouse");
    }

    #[actix_web::test]
    async fn load_without_snapshots_is_500() {
        let app = test::init_service(App::new().configure(routes::configure_load(load_state(
            Arc::new(MemoryBlobStore::default()),
            Arc::new(MemoryWarehouse::default()),
        ))))
        .await;
        let req = test::TestRequest::get().uri("/load-to-bigquery").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.error.contains("no snapshots"), "{}", body.error);
    }

    #[actix_web::test]
    async fn bearer_secret_guards_everything_but_health() {
        let store = Arc::new(MemoryBlobStore::default());
        let app = test::init_service(
            App::new()
                .wrap(Auth::new(Some("s3cret".into())))
                .configure(routes::configure_extract(extract_state(faker_source(), store))),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/fetch-stats").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let health = test::TestRequest::get().uri("/health").to_request();
        let body: HealthResponse = test::call_and_read_body_json(&app, health).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.service, "extract");

        let authed = test::TestRequest::get()
            .uri("/fetch-stats")
            .insert_header(("Authorization", "Bearer s3cret"))
            .to_request();
        assert_eq!(test::call_service(&app, authed).await.status(), StatusCode::OK);
    }
}
