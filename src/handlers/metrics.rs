//! Prometheus scrape endpoint.

use crate::state::AppState;
use actix_web::{web, HttpResponse};

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// `GET /metrics`
pub async fn prometheus_metrics(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(PROMETHEUS_CONTENT_TYPE)
        .body(state.transcription_metrics.render_prometheus())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::state_with;
    use crate::transcription::handler::test_support::StubProvider;
    use actix_web::http::header;
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_metrics_are_exposed_as_prometheus_text() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(Arc::new(StubProvider::returning("ok")), dir.path());
        state.transcription_metrics.record_request();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(crate::handlers::metrics_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            PROMETHEUS_CONTENT_TYPE
        );
        let body = test::read_body(resp).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("request_count 1"));
        assert!(text.contains("# TYPE audio_length_seconds histogram"));
    }
}
