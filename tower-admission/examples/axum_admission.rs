use std::sync::Arc;

use admission_policy::ACCOUNT_ID;
use admission_policy::InFlightGauge;
use admission_policy::LocalThrottler;
use admission_policy::Memoizer;
use admission_policy::RequestContext;
use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tower::BoxError;
use tower::ServiceBuilder;
use tower_admission::AdmissionError;
use tower_admission::Archetype;
use tower_admission::LoadShedHandler;
use tower_admission::ServiceBuilderExt;
use tower_admission::ThrottlingHandler;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 1. One throttler backs both handlers: plain keys for throttling,
    // "droppable-" keys for load shedding.
    let throttler = LocalThrottler::new([
        ("", 100.0),
        ("aws-account:demo", 5.0),
        ("droppable-", 20.0),
    ])
    .unwrap();
    let memoizer = Arc::new(Memoizer::new(Arc::new(throttler)));

    // 2. Setup Handlers
    let throttling = ThrottlingHandler::builder()
        .with_archetype(Archetype::Identity)
        .with_memoizer(memoizer.clone())
        .build()
        .unwrap();
    let load_shed = LoadShedHandler::builder()
        .with_archetype(Archetype::Identity)
        .with_memoizer(memoizer)
        .with_capacity(8)
        .build()
        .unwrap();

    let gauge = InFlightGauge::new();

    // 3. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, Admission!" }))
        .layer(
            ServiceBuilder::new()
                // 1. The outermost layer: catches BoxError and returns Response
                .layer(HandleErrorLayer::new(handle_admission_error))
                // 2. Describe the request for the handlers
                .map_request(move |request: Request| attach_context(&gauge, request))
                // 3. Admission: rejections surface as BoxError
                .throttle(Arc::new(throttling))
                .shed_load(Arc::new(load_shed))
                // 4. Converts the Route's Infallible to BoxError
                .map_err(BoxError::from),
        );

    // 4. Serve
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .unwrap();
    info!("listening on http://127.0.0.1:3000");

    axum::serve(listener, app).await.unwrap();
}

/// Stores the request's `RequestContext`, and the in-flight guard that
/// counts it, in the request extensions.
fn attach_context(gauge: &InFlightGauge, mut request: Request) -> Request {
    let guard = gauge.enter();
    let mut ctx = RequestContext::new()
        .with_operation("Demo", request.uri().path())
        .with_in_flight(guard.observed());
    if let Some(account) = request
        .headers()
        .get("x-account-id")
        .and_then(|value| value.to_str().ok())
    {
        ctx = ctx.with_identity(ACCOUNT_ID, account);
    }

    request.extensions_mut().insert(Arc::new(ctx));
    request.extensions_mut().insert(Arc::new(guard));
    request
}

/// The signature must match BoxError -> IntoResponse
async fn handle_admission_error(err: BoxError) -> impl IntoResponse {
    if let Some(admission_err) = err.downcast_ref::<AdmissionError>() {
        admission_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
