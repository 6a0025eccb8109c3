//! 数据结构定义

use plangate_common::{Feature, Limit, ResourceKind};
use plangate_errors::AppError;
use plangate_ports::WindowSnapshot;
use serde::Serialize;
use std::time::Duration;

/// 固定限流窗口长度
pub const WINDOW: Duration = Duration::from_secs(60);

/// 限流检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// 是否允许请求
    pub allowed: bool,
    /// 每分钟预算
    pub limit: Limit,
    /// 当前窗口内的请求计数（不限量时不计数，为 0）
    pub count: u64,
    /// 剩余可用请求数，不限量时为 `None`
    pub remaining: Option<u64>,
    /// 窗口重置时间（Unix 秒）
    pub reset_at: u64,
    /// 建议重试等待时间（秒，仅在拒绝时有效）
    pub retry_after: Option<u64>,
}

impl RateLimitResult {
    /// 不限量租户：不计数，始终放行
    pub fn unmetered(now_ms: u64) -> Self {
        let window_ms = WINDOW.as_millis() as u64;
        Self {
            allowed: true,
            limit: Limit::Unlimited,
            count: 0,
            remaining: None,
            reset_at: (now_ms + window_ms).div_ceil(1000),
            retry_after: None,
        }
    }

    /// 根据窗口快照计算结果
    ///
    /// 计数恰好等于上限时放行，超过上限才拒绝
    pub fn from_snapshot(limit: u64, snapshot: WindowSnapshot, now_ms: u64) -> Self {
        let reset_at_ms = snapshot.reset_at_ms(WINDOW);
        let allowed = snapshot.count <= limit;
        let retry_after = if allowed {
            None
        } else {
            Some(reset_at_ms.saturating_sub(now_ms).div_ceil(1000).max(1))
        };

        Self {
            allowed,
            limit: Limit::Limited(limit),
            count: snapshot.count,
            remaining: Some(limit.saturating_sub(snapshot.count)),
            reset_at: reset_at_ms.div_ceil(1000),
            retry_after,
        }
    }

    /// 转换为限流拒绝错误
    pub fn to_rejection(&self, tier: &str) -> AppError {
        AppError::RateLimitExceeded {
            tier: tier.to_string(),
            limit: self.limit.finite().unwrap_or(u64::MAX),
            reset_at: self.reset_at,
            retry_after_secs: self.retry_after.unwrap_or(1),
        }
    }
}

/// 配额结果的可信程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    /// 已按本地计数强制执行
    Enforced,
    /// 等级不限量，未计数
    Unlimited,
    /// 计数来源在外部系统，暂不强制
    ExternalUnenforced,
    /// 计数暂时无法读取，按放行处理
    Unavailable,
}

/// 配额检查结果（按需计算，不存储）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaCheckResult {
    pub resource: ResourceKind,
    pub tier: String,
    pub allowed: bool,
    /// 未计数时为 `None`
    pub current_count: Option<u64>,
    pub limit: Limit,
    pub enforcement: Enforcement,
}

impl QuotaCheckResult {
    /// 转换为配额超限错误
    pub fn to_rejection(&self) -> AppError {
        AppError::QuotaExceeded {
            tier: self.tier.clone(),
            resource: self.resource.to_string(),
            limit: self.limit.finite().unwrap_or(u64::MAX),
            current_count: self.current_count.unwrap_or(0),
        }
    }
}

/// 请求对应的受管控操作
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Operation {
    /// 该操作会创建的资源
    pub resource: Option<ResourceKind>,
    /// 该操作需要的功能
    pub feature: Option<Feature>,
}

impl Operation {
    /// 只受请求预算约束的普通操作
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn creates(resource: ResourceKind) -> Self {
        Self {
            resource: Some(resource),
            feature: None,
        }
    }

    pub fn requires(feature: Feature) -> Self {
        Self {
            resource: None,
            feature: Some(feature),
        }
    }

    pub fn is_governed(&self) -> bool {
        self.resource.is_some() || self.feature.is_some()
    }
}

/// 准入通过
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    /// 生效的等级，失败放行时为 `None`
    pub tier: Option<String>,
    /// 限流结果，失败放行时为 `None`
    pub rate: Option<RateLimitResult>,
    pub quota: Option<QuotaCheckResult>,
}

impl Admitted {
    /// 内部错误时的放行结果
    ///
    /// 限流已计数时保留其结果，否则不携带预算信息
    pub fn fail_open(rate: Option<RateLimitResult>) -> Self {
        Self {
            tier: None,
            rate,
            quota: None,
        }
    }
}

/// 准入检查阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rate,
    Quota,
    Feature,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Rate => "rate",
            Stage::Quota => "quota",
            Stage::Feature => "feature",
        }
    }
}

/// 准入未通过：业务拒绝或内部错误
#[derive(Debug, Clone, PartialEq)]
pub struct Denied {
    /// 出错的阶段
    pub stage: Stage,
    pub error: AppError,
    /// 出错前已完成计数的限流结果
    pub rate: Option<RateLimitResult>,
}

impl Denied {
    pub fn new(stage: Stage, error: AppError) -> Self {
        Self {
            stage,
            error,
            rate: None,
        }
    }

    pub fn after(mut self, rate: &RateLimitResult) -> Self {
        self.rate = Some(rate.clone());
        self
    }

    pub fn is_rejection(&self) -> bool {
        self.error.is_rejection()
    }
}
