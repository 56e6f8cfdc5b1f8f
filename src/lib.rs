//! 请求追踪ID的生成、校验与传递
//!
//! 入站请求通过 `X-Trace-Id` 头部携带或生成追踪ID，
//! 进程内通过不可变的 [`Context`] 传递，出站请求再把它写回头部，
//! 使同一个ID贯穿整条调用链，方便在日志中关联。
//!
//! ## Usage
//!
//! ### 基础用法：生成、校验和测试ID
//! ```
//! use ctxtrace::{is_testing_trace_id, is_valid_trace_id, with_testing_prefix, TraceId};
//!
//! let trace_id = TraceId::new();
//! assert!(is_valid_trace_id(trace_id.as_str()));
//!
//! assert!(!is_valid_trace_id("abc-123-invalid"));
//!
//! let testing = with_testing_prefix("abc");
//! assert_eq!(testing, "testing-abc");
//! assert!(is_testing_trace_id(&testing));
//! assert!(is_valid_trace_id(&testing));
//! ```
//!
//! ### 上下文
//! ```
//! use ctxtrace::Context;
//!
//! let ctx = Context::new();
//! assert_eq!(ctx.trace_id(), "");
//!
//! let traced = ctx.with_trace_id("0af76519-16cd-43dd-8448-eb211c80319c");
//! assert_eq!(traced.trace_id(), "0af76519-16cd-43dd-8448-eb211c80319c");
//!
//! // 日志会带上 trace_id 字段
//! traced.in_scope(|| tracing::info!("handling request"));
//! ```
//!
//! ### Axum 集成（需要启用 axum feature）
//! ```ignore
//! use axum::{routing::get, Router};
//! use ctxtrace::{TraceId, TraceIdLayer};
//!
//! async fn handler(trace_id: TraceId) -> String {
//!     format!("Hello! Your trace ID is: {}", trace_id)
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .route("/", get(handler))
//!         .layer(TraceIdLayer::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ### 出站请求（需要启用 client feature）
//! ```ignore
//! use ctxtrace::{with_trace_id, TraceIdPropagation, DefaultTransport};
//! use tower::ServiceExt;
//!
//! let client: TraceIdPropagation<DefaultTransport<axum::body::Body>> = Default::default();
//! let response = with_trace_id("testing-demo", client.oneshot(request)).await?;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod context;
mod trace_id;

pub use context::{get_trace_id, with_trace_id, Context};
pub use trace_id::{
    is_testing_trace_id, is_valid_trace_id, new_trace_id, with_testing_prefix, TraceId,
    TESTING_PREFIX,
};

/// HTTP 头部中的追踪ID字段名（`X-Trace-Id`，按 http 规范小写）
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// 结构化日志中的追踪ID字段名
pub const TRACE_ID_FIELD: &str = "trace_id";

#[cfg(any(feature = "axum", feature = "client"))]
mod integrations;

#[cfg(feature = "axum")]
#[cfg_attr(docsrs, doc(cfg(feature = "axum")))]
pub use integrations::axum::{
    trace_id_from_headers, traced_context, TraceIdConfig, TraceIdLayer, TraceIdService,
};

#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub use integrations::client::{DefaultTransport, TraceIdPropagation, TraceIdPropagationLayer};
