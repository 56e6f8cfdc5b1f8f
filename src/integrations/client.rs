//! 出站请求的追踪ID传递
//!
//! [`TraceIdPropagation`] 包装任意 `tower::Service<http::Request<B>>`（HTTP客户端），
//! 在请求发出前把上下文中的追踪ID写入 `x-trace-id` 头部。

use crate::{context, context::Context, trace_id::TraceId, TRACE_ID_HEADER};
use http::{HeaderValue, Request};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::task::{Context as TaskContext, Poll};
use tower::{Layer, Service};

/// 未指定时使用的默认传输层
pub type DefaultTransport<B> = Client<HttpConnector, B>;

/// 出站追踪ID传递层
///
/// ```
/// use ctxtrace::TraceIdPropagationLayer;
/// use tower::ServiceBuilder;
///
/// let client = ServiceBuilder::new()
///     .layer(TraceIdPropagationLayer::new())
///     .service_fn(|req: http::Request<()>| async move {
///         Ok::<_, std::convert::Infallible>(req.headers().contains_key("x-trace-id"))
///     });
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceIdPropagationLayer {
    _priv: (),
}

impl TraceIdPropagationLayer {
    /// 创建新的出站追踪ID传递层
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> Layer<S> for TraceIdPropagationLayer {
    type Service = TraceIdPropagation<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceIdPropagation::new(inner)
    }
}

/// 出站追踪ID传递服务
///
/// - 请求已显式设置非空的 `x-trace-id` 时原样转发，绝不覆盖
/// - 否则依次使用请求扩展中的 [`Context`]、当前环境上下文中的追踪ID，都没有时生成新ID
/// - 内层服务的错误原样返回
#[derive(Clone, Debug)]
pub struct TraceIdPropagation<S> {
    inner: S,
}

impl<S> TraceIdPropagation<S> {
    /// 包装指定的内层传输服务
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// 获取内层服务的引用
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// 取出内层服务
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<B> Default for TraceIdPropagation<DefaultTransport<B>>
where
    B: hyper::body::Body + Send,
    B::Data: Send,
{
    /// 使用 hyper-util 的连接池客户端作为传输层
    fn default() -> Self {
        Self::new(Client::builder(TokioExecutor::new()).build(HttpConnector::new()))
    }
}

impl<S, B> Service<Request<B>> for TraceIdPropagation<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        self.inner.call(set_trace_header(req))
    }
}

/// 为出站请求设置追踪ID头部
///
/// 请求的所有权已转移给本服务，调用方持有的头部集合不会被修改。
fn set_trace_header<B>(mut req: Request<B>) -> Request<B> {
    let already_set = req
        .headers()
        .get(TRACE_ID_HEADER)
        .is_some_and(|value| !value.is_empty());
    if already_set {
        return req;
    }

    if let Some(header_value) = outbound_trace_id(&req) {
        req.headers_mut().insert(TRACE_ID_HEADER, header_value);
    }
    req
}

/// 选择出站请求使用的追踪ID
fn outbound_trace_id<B>(req: &Request<B>) -> Option<HeaderValue> {
    let id = req
        .extensions()
        .get::<Context>()
        .map(|ctx| ctx.trace_id().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(context::get_trace_id);

    if !id.is_empty() {
        match HeaderValue::from_str(&id) {
            Ok(header_value) => return Some(header_value),
            Err(_) => {
                tracing::warn!(
                    trace_id = %id,
                    "Trace id from context is not a valid header value, generating a new one"
                );
            }
        }
    }

    HeaderValue::from_str(TraceId::new().as_str()).ok()
}
