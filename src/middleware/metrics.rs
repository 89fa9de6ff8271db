//! # HTTP Metrics Middleware
//!
//! Feeds the per-endpoint statistics in [`AppState`]: request count, error
//! count (4xx/5xx) and cumulative duration, keyed by `"<METHOD> <route>"`.
//!
//! Routes are keyed by their pattern when one matched, so arbitrary paths
//! probing the server collapse into a single `"<METHOD> unmatched"` entry.

use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let route = req
            .match_pattern()
            .unwrap_or_else(|| "unmatched".to_string());
        let endpoint = format!("{} {}", req.method(), route);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        if let Some(state) = &state {
            state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let is_error = match &result {
                Ok(response) => {
                    response.status().is_client_error() || response.status().is_server_error()
                }
                Err(_) => true,
            };

            if let Some(state) = state {
                state.record_endpoint_request(&endpoint, duration_ms, is_error);
                if is_error {
                    state.increment_error_count();
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::state_with;
    use crate::transcription::handler::test_support::StubProvider;
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_requests_are_counted_per_route() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(Arc::new(StubProvider::returning("ok")), dir.path());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .configure(crate::handlers::routes),
        )
        .await;

        for _ in 0..2 {
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        }
        test::call_service(&app, test::TestRequest::get().uri("/nope").to_request()).await;

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 3);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.endpoint_metrics["GET /health"].request_count, 2);
        assert_eq!(snapshot.endpoint_metrics["GET unmatched"].error_count, 1);
    }
}
