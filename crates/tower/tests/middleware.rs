// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::FutureExt as _;
use http::{HeaderMap, Request, StatusCode, header::USER_AGENT};
use opentelemetry::{
    Context, Value,
    propagation::TextMapPropagator,
    trace::{SpanContext, SpanKind, Status, TraceContextExt, Tracer, TracerProvider as _},
};
use opentelemetry_http::HeaderInjector;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{InMemorySpanExporter, SdkTracerProvider, SpanData},
};
use tower_layer::Layer;
use traceware_http::{Handler, ResponseRecorder, ResponseWriter, handler_fn};
use traceware_tower::{
    Filter, INSTRUMENTATION_NAME, RequestContextExt, SpanNameFormatter, TraceLayer, with_filter,
    with_propagator, with_span_name_formatter, with_tracer_provider,
};

fn setup() -> (InMemorySpanExporter, SdkTracerProvider) {
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    (exporter, provider)
}

fn attribute(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

fn hello_world() -> impl Handler<()> + Clone {
    handler_fn(|writer: &mut dyn ResponseWriter, _request: Request<()>| {
        Box::pin(async move {
            writer.write_all(b"Hello World").unwrap();
        })
    })
}

fn respond_with(status: StatusCode) -> impl Handler<()> {
    handler_fn(move |writer: &mut dyn ResponseWriter, _request: Request<()>| {
        Box::pin(async move {
            writer.write_header(status);
        })
    })
}

#[tokio::test]
async fn test_basic_request() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let traced = TraceLayer::new(
        "test-service",
        [
            with_tracer_provider(provider.clone()),
            with_propagator(TraceContextPropagator::new()),
        ],
    )
    .layer(hello_world());

    let request = Request::get("/test?debug=1")
        .header(USER_AGENT, "test-agent/1.0")
        .body(())?;
    let mut recorder = ResponseRecorder::new();
    traced.serve(&mut recorder, request).await;

    assert_eq!(recorder.status(), StatusCode::OK);
    assert_eq!(recorder.body(), b"Hello World");

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans.len(), 1);
    let span = &spans[0];

    assert_eq!(span.name, "GET /test");
    assert_eq!(span.span_kind, SpanKind::Server);
    assert_eq!(span.status, Status::Ok);
    assert_eq!(span.instrumentation_scope.name(), INSTRUMENTATION_NAME);

    assert_eq!(attribute(span, "http.request.method"), Some("GET".into()));
    assert_eq!(attribute(span, "http.route"), Some("/test".into()));
    assert_eq!(attribute(span, "url.path"), Some("/test".into()));
    assert_eq!(attribute(span, "url.query"), Some("debug=1".into()));
    assert_eq!(
        attribute(span, "user_agent.original"),
        Some("test-agent/1.0".into())
    );
    assert_eq!(attribute(span, "service.name"), Some("test-service".into()));
    assert_eq!(
        attribute(span, "http.response.status_code"),
        Some(Value::I64(200))
    );
    assert_eq!(
        attribute(span, "http.response.body.size"),
        Some(Value::I64(11))
    );

    Ok(())
}

#[tokio::test]
async fn test_missing_user_agent_and_query() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
        .layer(hello_world());

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::get("/test").body(())?)
        .await;

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans.len(), 1);
    assert_eq!(attribute(&spans[0], "user_agent.original"), Some("".into()));
    assert_eq!(attribute(&spans[0], "url.query"), Some("".into()));

    Ok(())
}

#[tokio::test]
async fn test_filtered_request() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let seen_context = Arc::new(Mutex::new(None));

    let handler = {
        let seen_context = Arc::clone(&seen_context);
        handler_fn(move |writer: &mut dyn ResponseWriter, request: Request<()>| {
            *seen_context.lock().unwrap() = Some(request.otel_context().is_some());
            Box::pin(async move {
                writer.write_all(b"OK").unwrap();
            })
        })
    };

    let traced = TraceLayer::new(
        "test-service",
        [
            with_tracer_provider(provider.clone()),
            with_filter(Filter::health_check()),
        ],
    )
    .layer(handler);

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::get("/health").body(())?)
        .await;

    assert_eq!(recorder.body(), b"OK");
    assert_eq!(*seen_context.lock().unwrap(), Some(false));
    assert!(exporter.get_finished_spans()?.is_empty());

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::get("/api/users").body(())?)
        .await;

    assert_eq!(*seen_context.lock().unwrap(), Some(true));
    assert_eq!(exporter.get_finished_spans()?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_custom_span_name() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let formatter = SpanNameFormatter::new(|_operation, request| {
        format!(
            "custom-{}-{}",
            request.method,
            request.uri.path().trim_start_matches('/')
        )
    });

    let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
        .with_span_name_formatter(formatter)
        .layer(hello_world());

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::post("/api/users").body(())?)
        .await;

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "custom-POST-api/users");

    Ok(())
}

#[tokio::test]
async fn test_operation_label() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let formatter = SpanNameFormatter::new(|operation, _request| operation.to_owned());
    let traced = TraceLayer::new(
        "test-service",
        [
            with_tracer_provider(provider.clone()),
            with_span_name_formatter(formatter),
        ],
    )
    .layer(hello_world());

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::delete("/api/users/1").body(())?)
        .await;

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans[0].name, "HTTP DELETE");

    Ok(())
}

#[tokio::test]
async fn test_distributed_tracing() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let propagator = TraceContextPropagator::new();

    let upstream = provider.tracer("upstream").start("upstream");
    let upstream_cx = Context::current_with_span(upstream);
    let upstream_span_context: SpanContext = upstream_cx.span().span_context().clone();

    let mut headers = HeaderMap::new();
    propagator.inject_context(&upstream_cx, &mut HeaderInjector(&mut headers));
    assert!(headers.contains_key("traceparent"));

    let traced = TraceLayer::new(
        "test-service",
        [
            with_tracer_provider(provider.clone()),
            with_propagator(propagator),
        ],
    )
    .layer(hello_world());

    let mut request = Request::get("/test").body(())?;
    *request.headers_mut() = headers;
    let mut recorder = ResponseRecorder::new();
    traced.serve(&mut recorder, request).await;

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(
        span.span_context.trace_id(),
        upstream_span_context.trace_id()
    );
    assert_eq!(span.parent_span_id, upstream_span_context.span_id());

    Ok(())
}

#[tokio::test]
async fn test_invalid_traceparent_starts_a_root() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let traced = TraceLayer::new(
        "test-service",
        [
            with_tracer_provider(provider.clone()),
            with_propagator(TraceContextPropagator::new()),
        ],
    )
    .layer(hello_world());

    let request = Request::get("/test")
        .header("traceparent", "not-a-trace-parent")
        .body(())?;
    let mut recorder = ResponseRecorder::new();
    traced.serve(&mut recorder, request).await;

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans.len(), 1);
    assert!(spans[0].span_context.is_valid());
    assert_eq!(
        spans[0].parent_span_id,
        opentelemetry::trace::SpanId::INVALID
    );

    Ok(())
}

#[tokio::test]
async fn test_error_statuses() -> Result<(), anyhow::Error> {
    for (status, description) in [
        (StatusCode::NOT_FOUND, "HTTP 404"),
        (StatusCode::INTERNAL_SERVER_ERROR, "HTTP 500"),
        (StatusCode::from_u16(600)?, "HTTP 600"),
        (StatusCode::from_u16(999)?, "HTTP 999"),
    ] {
        let (exporter, provider) = setup();
        let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
            .layer(respond_with(status));

        let mut recorder = ResponseRecorder::new();
        traced
            .serve(&mut recorder, Request::get("/missing").body(())?)
            .await;

        let spans = exporter.get_finished_spans()?;
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, Status::error(description));
        assert_eq!(
            attribute(&spans[0], "http.response.status_code"),
            Some(Value::I64(i64::from(status.as_u16())))
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_redirect_is_ok() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
        .layer(respond_with(StatusCode::FOUND));

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::get("/login").body(())?)
        .await;

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans[0].status, Status::Ok);

    Ok(())
}

#[tokio::test]
async fn test_empty_response_defaults_to_ok() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let handler = handler_fn(|_writer: &mut dyn ResponseWriter, _request: Request<()>| {
        Box::pin(async move {})
    });
    let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
        .layer(handler);

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::get("/noop").body(())?)
        .await;

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].status, Status::Ok);
    assert_eq!(
        attribute(&spans[0], "http.response.status_code"),
        Some(Value::I64(200))
    );
    assert_eq!(
        attribute(&spans[0], "http.response.body.size"),
        Some(Value::I64(0))
    );

    Ok(())
}

#[tokio::test]
async fn test_first_status_wins() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let handler = handler_fn(|writer: &mut dyn ResponseWriter, _request: Request<()>| {
        Box::pin(async move {
            writer.write_header(StatusCode::CREATED);
            writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
            writer.write_all(b"{}").unwrap();
        })
    });
    let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
        .layer(handler);

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::post("/api/users").body(())?)
        .await;

    assert_eq!(recorder.status(), StatusCode::CREATED);

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans[0].status, Status::Ok);
    assert_eq!(
        attribute(&spans[0], "http.response.status_code"),
        Some(Value::I64(201))
    );
    assert_eq!(
        attribute(&spans[0], "http.response.body.size"),
        Some(Value::I64(2))
    );

    Ok(())
}

#[tokio::test]
async fn test_panicking_handler_ends_span() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let handler = handler_fn(|writer: &mut dyn ResponseWriter, _request: Request<()>| {
        Box::pin(async move {
            writer.write_header(StatusCode::ACCEPTED);
            panic!("boom");
        })
    });
    let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
        .layer(handler);

    let mut recorder = ResponseRecorder::new();
    let result = AssertUnwindSafe(traced.serve(&mut recorder, Request::get("/boom").body(())?))
        .catch_unwind()
        .await;
    assert!(result.is_err());

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].status, Status::error("handler panicked"));
    assert_eq!(
        attribute(&spans[0], "http.response.status_code"),
        Some(Value::I64(202))
    );

    Ok(())
}

#[tokio::test]
async fn test_cancelled_request_ends_span() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let handler = handler_fn(|writer: &mut dyn ResponseWriter, _request: Request<()>| {
        Box::pin(async move {
            writer.write_header(StatusCode::ACCEPTED);
            std::future::pending::<()>().await;
        })
    });
    let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
        .layer(handler);

    let mut recorder = ResponseRecorder::new();
    let request = Request::get("/slow").body(())?;
    let result = tokio::time::timeout(
        Duration::from_millis(10),
        traced.serve(&mut recorder, request),
    )
    .await;
    assert!(result.is_err());

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].status, Status::Ok);
    assert_eq!(
        attribute(&spans[0], "http.response.status_code"),
        Some(Value::I64(202))
    );

    Ok(())
}

#[tokio::test]
async fn test_handler_sees_span_context() -> Result<(), anyhow::Error> {
    let (exporter, provider) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let handler = {
        let seen = Arc::clone(&seen);
        handler_fn(move |writer: &mut dyn ResponseWriter, request: Request<()>| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                let from_request = request
                    .otel_context()
                    .map(|cx| cx.span().span_context().clone());
                let current = Context::current().span().span_context().clone();
                seen.lock().unwrap().extend(from_request);
                seen.lock().unwrap().push(current);
                writer.write_header(StatusCode::NO_CONTENT);
            })
        })
    };

    let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
        .layer(handler);

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::get("/whoami").body(())?)
        .await;

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans.len(), 1);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], spans[0].span_context);
    assert_eq!(seen[1], spans[0].span_context);

    Ok(())
}

#[tokio::test]
async fn test_nested_tracing_spans() -> Result<(), anyhow::Error> {
    use tracing_subscriber::layer::SubscriberExt as _;

    let (exporter, provider) = setup();
    let subscriber = tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("handler")));
    let _guard = tracing::subscriber::set_default(subscriber);

    let handler = handler_fn(|writer: &mut dyn ResponseWriter, _request: Request<()>| {
        Box::pin(async move {
            tracing::info_span!("load_user").in_scope(|| {
                tracing::info!("Loading user");
            });
            writer.write_all(b"user").unwrap();
        })
    });

    let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
        .layer(handler);

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::get("/users/1").body(())?)
        .await;

    let spans = exporter.get_finished_spans()?;
    assert_eq!(spans.len(), 2);

    let server = spans
        .iter()
        .find(|span| span.name == "GET /users/1")
        .unwrap();
    let child = spans.iter().find(|span| span.name == "load_user").unwrap();
    assert_eq!(
        child.span_context.trace_id(),
        server.span_context.trace_id()
    );
    assert_eq!(child.parent_span_id, server.span_context.span_id());

    Ok(())
}

#[tokio::test]
async fn test_flush_and_hijack_through_middleware() -> Result<(), anyhow::Error> {
    let (_exporter, provider) = setup();
    let outcome = Arc::new(Mutex::new(None));

    let handler = {
        let outcome = Arc::clone(&outcome);
        handler_fn(move |writer: &mut dyn ResponseWriter, _request: Request<()>| {
            let outcome = Arc::clone(&outcome);
            Box::pin(async move {
                let flushed = writer.as_flusher().map(|flusher| flusher.flush().is_ok());
                let hijacked = writer
                    .as_hijacker()
                    .map(|hijacker| hijacker.hijack().is_err());
                *outcome.lock().unwrap() = Some((flushed, hijacked));
            })
        })
    };

    let traced = TraceLayer::new("test-service", [with_tracer_provider(provider.clone())])
        .layer(handler);

    let mut recorder = ResponseRecorder::new();
    traced
        .serve(&mut recorder, Request::get("/stream").body(())?)
        .await;

    // The recorder flushes but can't hand over its connection
    assert_eq!(*outcome.lock().unwrap(), Some((Some(true), Some(true))));
    assert_eq!(recorder.flushes(), 1);

    Ok(())
}
