//! # Request Logging Middleware
//!
//! Logs every HTTP request at start and completion with a request id.
//!
//! ## Request ids:
//! - Taken from the incoming `x-request-id` header when present
//! - Otherwise generated as a UUID v4
//! - Echoed back on the response under the same header
//! - Stored in request extensions as [`RequestId`] for handlers
//!
//! ## Logged fields:
//! `request_id`, `method`, `uri`, `remote_addr`, and on completion `status`
//! and `duration_ms`.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{error, info, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
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
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        let remote_addr = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        req.extensions_mut().insert(RequestId(request_id.clone()));

        let span = tracing::info_span!("request", request_id = %request_id);
        span.in_scope(|| {
            info!(
                method = %method,
                uri = %uri,
                remote_addr = %remote_addr,
                "Request started"
            )
        });

        let fut = self.service.call(req);

        Box::pin(
            async move {
                let mut result = fut.await;
                let duration = start_time.elapsed();

                match &mut result {
                    Ok(response) => {
                        if let Ok(value) = HeaderValue::from_str(&request_id) {
                            response
                                .headers_mut()
                                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                        }
                        info!(
                            method = %method,
                            uri = %uri,
                            remote_addr = %remote_addr,
                            status = response.status().as_u16(),
                            duration_ms = duration.as_millis() as u64,
                            "Request completed"
                        );
                    }
                    Err(err) => {
                        error!(
                            method = %method,
                            uri = %uri,
                            remote_addr = %remote_addr,
                            duration_ms = duration.as_millis() as u64,
                            error = %err,
                            "Request failed"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
