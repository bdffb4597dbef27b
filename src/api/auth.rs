// Optional bearer-token gate for the service endpoints

use crate::api::models::ErrorResponse;
use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};

/// Validates `Authorization: Bearer <secret>`. With no secret configured
/// every request passes.
pub struct Auth {
    secret: Option<String>,
}

impl Auth {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Auth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        }))
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: Option<String>,
}

impl<S> AuthMiddleware<S> {
    fn allowed(&self, req: &ServiceRequest) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            return true;
        };
        if req.path() == "/health" {
            return true;
        }
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .is_some_and(|token| token == secret)
    }
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.allowed(&req) {
            let fut = self.service.call(req);
            return Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            });
        }

        tracing::warn!(path = %req.path(), "rejected request without valid bearer token");
        Box::pin(async move {
            let response = HttpResponse::Unauthorized()
                .json(ErrorResponse {
                    error: "Invalid or missing authentication token".to_string(),
                })
                .map_into_right_body();
            Ok(req.into_response(response))
        })
    }
}
