//! 示例：把入站请求的追踪ID传递给下游服务
//!
//! 在 127.0.0.1:3001 启动后端，在 127.0.0.1:3000 启动前端。
//! 执行 `curl -H 'x-trace-id: testing-demo' localhost:3000` 后，两个服务的日志中会出现同一个ID。

use axum::{body::Body, extract::State, http::Request, routing::get, Router};
use ctxtrace::{DefaultTransport, TraceId, TraceIdLayer, TraceIdPropagation, TRACE_ID_HEADER};
use tower::ServiceExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type HttpClient = TraceIdPropagation<DefaultTransport<Body>>;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let backend = Router::new()
        .route("/", get(backend_handler))
        .layer(TraceIdLayer::new());

    let frontend = Router::new()
        .route("/", get(frontend_handler))
        .with_state(HttpClient::default())
        .layer(TraceIdLayer::new());

    let backend_listener = tokio::net::TcpListener::bind("127.0.0.1:3001").await.unwrap();
    let frontend_listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();

    // 后端在后台运行
    tokio::spawn(async move { axum::serve(backend_listener, backend).await.unwrap() });

    tracing::info!("Starting frontend on 127.0.0.1:3000, backend on 127.0.0.1:3001");
    axum::serve(frontend_listener, frontend).await.unwrap();
}

async fn frontend_handler(State(client): State<HttpClient>, trace_id: TraceId) -> String {
    tracing::info!("Calling backend");

    let request = Request::builder()
        .uri("http://127.0.0.1:3001/")
        .body(Body::empty())
        .unwrap();

    // 客户端自动使用 TraceIdLayer 设置的环境上下文
    match client.oneshot(request).await {
        Ok(response) => {
            let downstream = response
                .headers()
                .get(TRACE_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_owned();
            format!("frontend trace id: {trace_id}, backend trace id: {downstream}\n")
        }
        Err(err) => {
            tracing::warn!(error = %err, "Backend call failed");
            format!("frontend trace id: {trace_id}, backend unreachable\n")
        }
    }
}

async fn backend_handler(trace_id: TraceId) -> String {
    tracing::info!("Handling backend request");
    format!("backend saw {trace_id}\n")
}
