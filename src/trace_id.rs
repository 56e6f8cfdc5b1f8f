//! TraceId 核心结构体与ID策略
//!
//! 标准ID为 UUID v4 的文本形式；测试ID带有固定前缀 `testing-`，
//! 用于在下游审计流程中排除测试请求。

use std::fmt;
use uuid::Uuid;

/// 测试用追踪ID的固定前缀
pub const TESTING_PREFIX: &str = "testing-";

/// 追踪ID结构体
///
/// 不可变的字符串令牌，可以是标准ID（UUID v4）或测试ID（带 `testing-` 前缀）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(String);

impl TraceId {
    /// 生成新的标准追踪ID（UUID v4，小写带连字符）
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// 从字符串创建追踪ID，并按 [`is_valid_trace_id`] 的规则校验
    ///
    /// # 返回
    /// 如果有效则返回Some(TraceId)，否则返回None
    #[inline]
    pub fn from_string_validated(id: &str) -> Option<Self> {
        is_valid_trace_id(id).then(|| Self(id.to_string()))
    }

    /// 从字符串创建追踪ID（不进行校验）
    ///
    /// 调用者需要确保输入字符串是有效的追踪ID
    #[inline]
    pub fn from_string_unchecked(id: &str) -> Self {
        Self(id.to_string())
    }

    /// 获取追踪ID字符串
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 取出内部字符串
    #[inline]
    pub fn into_string(self) -> String {
        self.0
    }

    /// 是否为测试用追踪ID
    #[inline]
    pub fn is_testing(&self) -> bool {
        is_testing_trace_id(&self.0)
    }

    /// 转换为测试用追踪ID（已带前缀时保持不变）
    pub fn to_testing(&self) -> Self {
        Self(with_testing_prefix(&self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for TraceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<TraceId> for String {
    fn from(trace_id: TraceId) -> Self {
        trace_id.0
    }
}

/// 生成新的标准追踪ID
#[inline]
pub fn new_trace_id() -> TraceId {
    TraceId::new()
}

/// 校验追踪ID
///
/// # 校验规则
/// - 空字符串无效
/// - 带 `testing-` 前缀的字符串一律有效，不检查后缀
/// - 其他字符串必须能解析为 UUID
pub fn is_valid_trace_id(id: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    if is_testing_trace_id(id) {
        return true;
    }
    Uuid::try_parse(id).is_ok()
}

/// 是否带有测试前缀（纯前缀检查，不做解析）
#[inline]
pub fn is_testing_trace_id(id: &str) -> bool {
    id.starts_with(TESTING_PREFIX)
}

/// 为追踪ID加上测试前缀
///
/// 已带前缀时原样返回；输入为空时先生成新的标准ID再加前缀。
pub fn with_testing_prefix(id: &str) -> String {
    if is_testing_trace_id(id) {
        return id.to_string();
    }
    if id.is_empty() {
        return format!("{TESTING_PREFIX}{}", TraceId::new());
    }
    format!("{TESTING_PREFIX}{id}")
}
