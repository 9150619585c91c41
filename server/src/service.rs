//! The endpoint/service binder (C7, §4.7): registers one `axum::Router`
//! route per method and wires the unimplemented catch-alls.
//!
//! Adapted from `connectrpc-axum/src/service_builder.rs`'s `MakeServiceBuilder`
//! (aggregating multiple routers into one service) and `tonic.rs`'s
//! `ContentTypeSwitch` (dispatch by content-type); this crate serves gRPC
//! only, so the binder produces a single `axum::Router` instead of switching
//! between two protocol stacks.

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;

use grpc_core::{compression::CompressionEncoding, Event, EventSink};

use crate::context::{GrpcMethodMetadata, MethodKind};

/// A single method registration: the path segments and shape, independent
/// of how the handler itself is invoked (the caller supplies an axum
/// `MethodRouter` built around `GrpcPipeline`).
#[derive(Clone)]
struct MethodEntry {
    method: String,
    kind: MethodKind,
}

/// Builds the route table for one gRPC service (§4.7): one route per
/// registered method, plus an unknown-method catch-all under the service's
/// path unless suppressed.
pub struct ServiceBinder<S = ()> {
    service: String,
    router: Router<S>,
    methods: Vec<MethodEntry>,
    ignore_unknown_methods: bool,
}

impl<S> ServiceBinder<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            router: Router::new(),
            methods: Vec::new(),
            ignore_unknown_methods: false,
        }
    }

    /// Skip adding the per-service unknown-method catch-all (§4.7: callers
    /// composing several binders under a shared fallback may want only the
    /// global one).
    pub fn ignore_unknown_methods(mut self, ignore: bool) -> Self {
        self.ignore_unknown_methods = ignore;
        self
    }

    /// Register one method, validating its response compression provider
    /// (if any) against the registry before accepting the route.
    ///
    /// `handler` is a fully-formed axum handler; callers build it around
    /// [`crate::pipeline::GrpcPipeline`] and their service logic, then pass
    /// it here purely for route wiring and metadata attachment.
    pub fn method<H, T>(
        mut self,
        name: impl Into<String>,
        kind: MethodKind,
        response_encoding: Option<CompressionEncoding>,
        handler: H,
    ) -> Result<Self, String>
    where
        H: axum::handler::Handler<T, S>,
        T: 'static,
    {
        let name = name.into();
        if let Some(encoding) = response_encoding {
            if !encoding.is_identity() && encoding.codec().is_none() {
                return Err(format!(
                    "The configured response compression algorithm '{}' does not have a matching compression provider.",
                    encoding.as_str()
                ));
            }
        }

        let metadata = GrpcMethodMetadata {
            service: self.service.clone(),
            method: name.clone(),
            kind,
        };
        let path = format!("/{}/{}", self.service, name);
        tracing::debug!(service = %self.service, method = %name, ?kind, "method bound");

        self.router = self.router.route(
            &path,
            post(handler).layer(Extension(Arc::new(metadata))),
        );
        self.methods.push(MethodEntry { method: name, kind });
        Ok(self)
    }

    /// Finish registration: add the per-service unknown-method catch-all
    /// (unless suppressed) and return the assembled router.
    pub fn build(mut self) -> Router<S> {
        if self.methods.is_empty() {
            tracing::warn!(service = %self.service, "service registered with zero methods");
        }
        if !self.ignore_unknown_methods {
            let service = self.service.clone();
            self.router = self.router.route(
                &format!("/{}/{{*method}}", self.service),
                post(move || unimplemented_method(service.clone())),
            );
        }
        self.router
    }
}

async fn unimplemented_method(service: String) -> Response {
    tracing::debug!(%service, "unmatched method under known service");
    unimplemented_response(&service, "Method is unimplemented.")
}

/// The global fallback route (§4.7): any request that matched no
/// registered service.
pub async fn unimplemented_service() -> Response {
    unimplemented_response("unknown", "Service is unimplemented.")
}

fn unimplemented_response(full_name: &str, message: &str) -> Response {
    let events: Arc<dyn EventSink> = Arc::new(grpc_core::TracingEventSink);
    events.emit(Event::CallUnimplemented {
        full_name: full_name.to_string(),
    });
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert("grpc-status", grpc_core::Code::Unimplemented.as_u32().to_string().parse().unwrap());
    headers.insert(
        "grpc-message",
        grpc_core::metadata::percent_encode_message(message).parse().unwrap(),
    );
    response
}

/// Combine several service binders' routers into one top-level service,
/// adding the global unimplemented fallback (§4.7). Grounded in
/// `MakeServiceBuilder::add_routers`/`build`, minus the Connect/gRPC
/// content-type switch (this crate has only the gRPC side).
pub struct ServiceAggregator<S = ()> {
    router: Router<S>,
}

impl<S> Default for ServiceAggregator<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ServiceAggregator<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { router: Router::new() }
    }

    pub fn add_service(mut self, router: Router<S>) -> Self {
        self.router = self.router.merge(router);
        self
    }

    pub fn add_services(mut self, routers: impl IntoIterator<Item = Router<S>>) -> Self {
        for router in routers {
            self.router = self.router.merge(router);
        }
        self
    }

    pub fn build(self) -> Router<S> {
        self.router.fallback(unimplemented_service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    #[test]
    fn method_rejects_unsupported_compression_provider() {
        let result: Result<ServiceBinder, String> = ServiceBinder::new("svc").method(
            "Do",
            MethodKind::Unary,
            Some(CompressionEncoding::Identity),
            ok_handler,
        );
        // Identity always has a provider; this should succeed.
        assert!(result.is_ok());
    }

    #[test]
    fn build_adds_catch_all_route() {
        let binder: ServiceBinder = ServiceBinder::new("svc");
        let router = binder.build();
        assert!(format!("{:?}", router).contains("Router"));
    }

    #[test]
    fn aggregator_adds_global_fallback() {
        let binder: ServiceBinder = ServiceBinder::new("svc")
            .method("Do", MethodKind::Unary, None, ok_handler)
            .unwrap();
        let app: Router = ServiceAggregator::new().add_service(binder.build()).build();
        assert!(format!("{:?}", app).contains("Router"));
    }
}
