//! 追踪ID上下文管理
//!
//! [`Context`] 是不可变的、写时复制的请求上下文：每次附加值都会派生出新的上下文，
//! 原上下文保持不变。追踪ID存放在模块私有的类型下，外部只能通过本模块的方法读写。
//!
//! 另外使用 `tokio::task_local` 提供与Web框架无关的隐式（环境）上下文。

use crate::trace_id::{with_testing_prefix, TraceId};
use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task_local;
use tracing::{Instrument, Span};

/// 追踪ID在上下文中的私有存储槽
struct TraceIdSlot(String);

struct Entry {
    key: TypeId,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

/// 不可变的请求上下文
///
/// 以链表形式保存类型化的值，按值的类型查找，越新的附加越优先。
/// 克隆只复制一个 `Arc`。
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Entry>>,
}

impl Context {
    /// 创建空上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 派生一个附加了 `value` 的新上下文
    ///
    /// 同类型的已有值在新上下文中被遮蔽，`self` 不受影响。
    pub fn with_value<T>(&self, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            head: Some(Arc::new(Entry {
                key: TypeId::of::<T>(),
                value: Box::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// 查找类型为 `T` 的最近一次附加的值
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        let key = TypeId::of::<T>();
        let mut cursor = self.head.as_deref();
        while let Some(entry) = cursor {
            if entry.key == key {
                return entry.value.downcast_ref::<T>();
            }
            cursor = entry.parent.as_deref();
        }
        None
    }

    /// 派生一个携带追踪ID的新上下文
    ///
    /// `id` 为空时会生成新的标准ID，因此经由此方法存入的值永远非空。
    pub fn with_trace_id(&self, id: impl AsRef<str>) -> Self {
        let id = id.as_ref();
        let id = if id.is_empty() {
            TraceId::new().into_string()
        } else {
            id.to_string()
        };
        self.with_value(TraceIdSlot(id))
    }

    /// 派生一个携带有效追踪ID的新上下文
    ///
    /// `id` 通过 [`is_valid_trace_id`](crate::is_valid_trace_id) 校验时原样保存，否则生成新的标准ID。
    pub fn with_valid_trace_id(&self, id: impl AsRef<str>) -> Self {
        let trace_id = TraceId::from_string_validated(id.as_ref()).unwrap_or_default();
        self.with_value(TraceIdSlot(trace_id.into_string()))
    }

    /// 创建携带新生成追踪ID的空上下文
    pub fn new_traced() -> Self {
        Self::new().with_trace_id(TraceId::new())
    }

    /// 派生一个携带测试用追踪ID的新上下文
    pub fn with_testing_trace_id(&self, id: impl AsRef<str>) -> Self {
        self.with_trace_id(with_testing_prefix(id.as_ref()))
    }

    /// 获取上下文中的追踪ID
    ///
    /// 从未附加过时返回空字符串，不会生成新ID。
    pub fn trace_id(&self) -> &str {
        self.get::<TraceIdSlot>()
            .map(|slot| slot.0.as_str())
            .unwrap_or_default()
    }

    /// 携带 `trace_id` 字段的 tracing span
    ///
    /// 在该span内输出的日志都会带上追踪ID；上下文中没有追踪ID时返回 `Span::none()`。
    pub fn span(&self) -> Span {
        match self.get::<TraceIdSlot>() {
            Some(slot) => tracing::info_span!("trace", trace_id = %slot.0),
            None => Span::none(),
        }
    }

    /// 在 [`Context::span`] 内执行同步闭包
    pub fn in_scope<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.span().in_scope(f)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("trace_id", &self.trace_id())
            .finish_non_exhaustive()
    }
}

// 使用tokio的task_local来存储当前任务的上下文
task_local! {
    static CURRENT_CONTEXT: Context;
}

/// 获取当前任务的环境上下文
///
/// 不在任何 [`scope`] 内时返回空上下文。
pub fn current() -> Context {
    CURRENT_CONTEXT
        .try_with(Context::clone)
        .unwrap_or_default()
}

/// 以 `ctx` 作为环境上下文执行异步操作
pub async fn scope<F, T>(ctx: Context, future: F) -> T
where
    F: Future<Output = T>,
{
    CURRENT_CONTEXT.scope(ctx, future).await
}

/// 获取当前环境上下文中的追踪ID
///
/// 不在追踪上下文中时返回空字符串。
pub fn get_trace_id() -> String {
    CURRENT_CONTEXT
        .try_with(|ctx| ctx.trace_id().to_string())
        .unwrap_or_default()
}

/// 在附加了指定追踪ID的环境上下文中执行异步操作
///
/// 新上下文从当前环境上下文派生，`future` 同时运行在携带 `trace_id` 字段的span内。
///
/// # 参数
/// * `trace_id` - 要设置的追踪ID，为空时生成新ID
/// * `future` - 要执行的异步操作
pub async fn with_trace_id<F, T>(trace_id: impl AsRef<str>, future: F) -> T
where
    F: Future<Output = T>,
{
    let ctx = current().with_trace_id(trace_id);
    let span = ctx.span();
    scope(ctx, future.instrument(span)).await
}
