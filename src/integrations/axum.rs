//! Axum框架的追踪ID中间件

use crate::{
    context::{self, Context},
    trace_id::{is_valid_trace_id, TraceId},
    TRACE_ID_HEADER,
};
use axum::{
    extract::{FromRequestParts, Request},
    http::{header::Entry, request::Parts, HeaderMap, HeaderValue},
    response::Response,
};
use std::convert::Infallible;
use std::{
    sync::Arc,
    task::{Context as TaskContext, Poll},
};
use tower::{Layer, Service};
use tracing::Instrument;

/// 用于生成追踪ID的函数签名
type Generator = Arc<dyn Fn() -> String + Send + Sync>;

/// 追踪ID中间件配置选项
#[derive(Clone, Debug)]
pub struct TraceIdConfig {
    /// 是否启用 tracing span（默认启用）
    pub enable_span: bool,
    /// 是否启用响应头（默认启用）
    pub enable_response_header: bool,
}

impl Default for TraceIdConfig {
    fn default() -> Self {
        Self {
            enable_span: true,
            enable_response_header: true,
        }
    }
}

/// 入站追踪中间件层
///
/// 从请求头提取追踪ID（无效或缺失时生成），附加到请求上下文并写回响应头
#[derive(Clone)]
pub struct TraceIdLayer {
    generator: Option<Generator>,
    config: TraceIdConfig,
}

impl TraceIdLayer {
    /// 创建新的追踪ID层，使用默认配置和UUID生成器
    pub fn new() -> Self {
        Self {
            generator: None,
            config: TraceIdConfig::default(),
        }
    }

    /// 创建高性能模式的追踪ID层
    ///
    /// 禁用 tracing span 以获得最佳性能
    pub fn new_high_performance() -> Self {
        Self {
            generator: None,
            config: TraceIdConfig {
                enable_span: false,
                enable_response_header: true,
            },
        }
    }

    /// 使用自定义配置创建追踪ID层
    pub fn with_config(config: TraceIdConfig) -> Self {
        Self {
            generator: None,
            config,
        }
    }

    /// 使用自定义的生成器创建追踪ID层
    ///
    /// 生成结果不是有效追踪ID或无法作为头部值时，回退到默认生成器。
    ///
    /// # 示例
    /// ```
    /// use ctxtrace::{with_testing_prefix, TraceIdLayer};
    ///
    /// // 所有新生成的ID都标记为测试ID
    /// let layer = TraceIdLayer::new().with_generator(|| with_testing_prefix(""));
    /// ```
    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.generator = Some(Arc::new(generator));
        self
    }
}

impl Default for TraceIdLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for TraceIdLayer {
    type Service = TraceIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceIdService {
            inner,
            generator: self.generator.clone(),
            config: self.config.clone(),
        }
    }
}

/// 入站追踪ID服务
#[derive(Clone)]
pub struct TraceIdService<S> {
    inner: S,
    generator: Option<Generator>,
    config: TraceIdConfig,
}

impl<S> Service<Request> for TraceIdService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let trace_id = extract_or_generate_trace_id(req.headers(), self.generator.as_deref());

        let ctx = request_context(&req).with_trace_id(&trace_id);

        // span 需要在 trace_id 移入 future 之前创建
        let span = self.config.enable_span.then(|| {
            tracing::info_span!(
                "request",
                trace_id = %trace_id,
                method = %req.method(),
                uri = %req.uri()
            )
        });

        req.extensions_mut().insert(ctx.clone());
        req.extensions_mut().insert(trace_id.clone());

        let future = self.inner.call(req);
        let enable_response_header = self.config.enable_response_header;

        let traced = context::scope(ctx, async move {
            let mut response = future.await?;

            // 处理器自己设置的头部优先
            if enable_response_header {
                set_response_trace_id(response.headers_mut(), &trace_id);
            }

            Ok::<_, S::Error>(response)
        });

        match span {
            Some(span) => Box::pin(traced.instrument(span)),
            // 高性能模式：跳过 span 创建
            None => Box::pin(traced),
        }
    }
}

/// 从请求头中提取有效的追踪ID，缺失或无效时生成新的
///
/// ```
/// use axum::http::{HeaderMap, HeaderValue};
/// use ctxtrace::{is_valid_trace_id, trace_id_from_headers, TRACE_ID_HEADER};
///
/// let mut headers = HeaderMap::new();
/// headers.insert(TRACE_ID_HEADER, HeaderValue::from_static("abc-123-invalid"));
///
/// let trace_id = trace_id_from_headers(&headers);
/// assert_ne!(trace_id.as_str(), "abc-123-invalid");
/// assert!(is_valid_trace_id(trace_id.as_str()));
/// ```
pub fn trace_id_from_headers(headers: &HeaderMap) -> TraceId {
    extract_or_generate_trace_id(headers, None)
}

/// 不经过中间件，直接为请求派生携带追踪ID的上下文
///
/// 追踪ID取自请求头（缺失或无效时生成），同时写入 `response_headers`；
/// 响应头中已有非空的 `x-trace-id` 时保持不变。
pub fn traced_context<B>(
    req: &axum::http::Request<B>,
    response_headers: &mut HeaderMap,
) -> Context {
    let trace_id = trace_id_from_headers(req.headers());
    set_response_trace_id(response_headers, &trace_id);
    request_context(req).with_trace_id(&trace_id)
}

/// 请求已有的上下文，没有时使用当前环境上下文
fn request_context<B>(req: &axum::http::Request<B>) -> Context {
    req.extensions()
        .get::<Context>()
        .cloned()
        .unwrap_or_else(context::current)
}

/// 写入响应头中的追踪ID，不覆盖已有的非空值
fn set_response_trace_id(headers: &mut HeaderMap, trace_id: &TraceId) {
    let Ok(header_value) = HeaderValue::from_str(trace_id.as_str()) else {
        tracing::warn!(
            trace_id = %trace_id,
            "Trace id is not a valid header value, response header skipped"
        );
        return;
    };

    match headers.entry(TRACE_ID_HEADER) {
        Entry::Occupied(mut existing) => {
            if existing.get().is_empty() {
                existing.insert(header_value);
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(header_value);
        }
    }
}

fn extract_or_generate_trace_id(
    headers: &HeaderMap,
    generator: Option<&(dyn Fn() -> String + Send + Sync)>,
) -> TraceId {
    if let Some(header_value) = headers.get(TRACE_ID_HEADER) {
        match header_value.to_str() {
            Ok(id_str) if is_valid_trace_id(id_str) => {
                return TraceId::from_string_unchecked(id_str);
            }
            _ => {
                tracing::debug!(
                    rejected = ?header_value,
                    "Invalid trace id header, generating a new one"
                );
            }
        }
    }

    generator
        .map(|generator_fn| generator_fn())
        .filter(|id| is_valid_trace_id(id) && HeaderValue::from_str(id).is_ok())
        .map(|id| TraceId::from_string_unchecked(&id))
        .unwrap_or_default()
}

// -- 提取器 --

/// Axum 提取器，用于在 handler 函数签名中直接获取 TraceId
///
/// 优先读取 [`TraceIdLayer`] 放入请求扩展的ID，其次是当前环境上下文。
/// 两者都没有时记录警告并生成新ID，因此永远不会失败。
///
/// # 示例
/// ```no_run
/// use axum::{routing::get, Router};
/// use ctxtrace::{TraceId, TraceIdLayer};
///
/// async fn my_handler(trace_id: TraceId) -> String {
///     tracing::info!(trace_id = %trace_id, "Handler started");
///     format!("Hello! Your trace ID is: {}", trace_id)
/// }
///
/// let app: Router = Router::new()
///     .route("/", get(my_handler))
///     .layer(TraceIdLayer::new());
/// ```
impl<S> FromRequestParts<S> for TraceId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(trace_id) = parts.extensions.get::<TraceId>() {
            return Ok(trace_id.clone());
        }

        let ambient = context::get_trace_id();
        if !ambient.is_empty() {
            return Ok(TraceId::from_string_unchecked(&ambient));
        }

        tracing::warn!(
            "TraceId not found in request or task-local context. Generating a new one. \
             This might indicate a handler that is not wrapped by TraceIdLayer."
        );
        Ok(TraceId::new())
    }
}

/// Axum 提取器，获取请求上下文
///
/// 优先读取请求扩展中的 [`Context`]，否则返回当前环境上下文。
/// 把它放进出站请求的扩展中，追踪ID就会被 `TraceIdPropagation` 继续传递。
impl<S> FromRequestParts<S> for Context
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Context>()
            .cloned()
            .unwrap_or_else(context::current))
    }
}
