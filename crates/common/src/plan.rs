//! 订阅等级与套餐策略
//!
//! 等级表由运维在配置文件中维护，解析后的策略不可变

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// 数量上限
///
/// `Limited(n) < Unlimited`，派生的 `Ord` 依赖变体顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Limit {
    Limited(u64),
    Unlimited,
}

impl Limit {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// 有限上限的数值
    pub fn finite(&self) -> Option<u64> {
        match self {
            Self::Limited(n) => Some(*n),
            Self::Unlimited => None,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{}", n),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Limited(n) => serializer.serialize_u64(*n),
            Self::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self::Limited(n)),
            Raw::Text(s) if s.eq_ignore_ascii_case("unlimited") => Ok(Self::Unlimited),
            Raw::Text(s) => s.trim().parse::<u64>().map(Self::Limited).map_err(|_| {
                serde::de::Error::custom(format!(
                    "invalid limit `{}`, expected a non-negative integer or \"unlimited\"",
                    s
                ))
            }),
        }
    }
}

/// 受配额管控的资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// 客户空间
    ClientSpace,
    /// 团队成员
    TeamMember,
    /// 第三方集成
    Integration,
    /// 外部访客（计数在第三方目录中）
    ExternalGuest,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        Self::ClientSpace,
        Self::TeamMember,
        Self::Integration,
        Self::ExternalGuest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSpace => "client_space",
            Self::TeamMember => "team_member",
            Self::Integration => "integration",
            Self::ExternalGuest => "external_guest",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| PlanError::UnknownResource(s.to_string()))
    }
}

/// 套餐功能开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    CustomBranding,
    ApiAccess,
    AdvancedReporting,
    SingleSignOn,
    AuditLog,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Self::CustomBranding,
        Self::ApiAccess,
        Self::AdvancedReporting,
        Self::SingleSignOn,
        Self::AuditLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomBranding => "custom_branding",
            Self::ApiAccess => "api_access",
            Self::AdvancedReporting => "advanced_reporting",
            Self::SingleSignOn => "single_sign_on",
            Self::AuditLog => "audit_log",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|feature| feature.as_str() == normalized)
            .ok_or_else(|| PlanError::UnknownFeature(s.to_string()))
    }
}

/// 等级表中单个等级的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    /// 每分钟请求预算
    pub requests_per_minute: Limit,
    /// 资源上限（未列出的资源不受管控）
    #[serde(default)]
    pub resource_caps: HashMap<ResourceKind, Limit>,
    /// 包含的功能
    #[serde(default)]
    pub features: HashSet<Feature>,
}

/// 等级策略（不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierPolicy {
    pub name: String,
    pub requests_per_minute: Limit,
    pub resource_caps: HashMap<ResourceKind, Limit>,
    pub features: HashSet<Feature>,
}

impl TierPolicy {
    pub fn new(name: impl Into<String>, spec: TierSpec) -> Self {
        Self {
            name: name.into(),
            requests_per_minute: spec.requests_per_minute,
            resource_caps: spec.resource_caps,
            features: spec.features,
        }
    }

    /// 资源上限，未配置视为不受限
    pub fn cap(&self, kind: ResourceKind) -> Limit {
        self.resource_caps
            .get(&kind)
            .copied()
            .unwrap_or(Limit::Unlimited)
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("tier catalog is empty")]
    EmptyCatalog,

    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("unknown resource kind: {0}")]
    UnknownResource(String),

    #[error("unknown feature: {0}")]
    UnknownFeature(String),
}

/// 等级目录
///
/// 等级名 → 策略，附带最严格的兜底策略
#[derive(Debug, Clone)]
pub struct TierCatalog {
    tiers: HashMap<String, Arc<TierPolicy>>,
    fallback: Arc<TierPolicy>,
}

impl TierCatalog {
    /// 构建目录
    ///
    /// `fallback_tier` 未指定时取每分钟预算最低的等级
    pub fn from_specs(
        specs: HashMap<String, TierSpec>,
        fallback_tier: Option<&str>,
    ) -> Result<Self, PlanError> {
        let tiers: HashMap<String, Arc<TierPolicy>> = specs
            .into_iter()
            .map(|(name, spec)| {
                let policy = Arc::new(TierPolicy::new(name.clone(), spec));
                (name, policy)
            })
            .collect();

        let fallback = match fallback_tier {
            Some(name) => tiers
                .get(name)
                .cloned()
                .ok_or_else(|| PlanError::UnknownTier(name.to_string()))?,
            None => tiers
                .values()
                .min_by(|a, b| {
                    a.requests_per_minute
                        .cmp(&b.requests_per_minute)
                        .then_with(|| a.name.cmp(&b.name))
                })
                .cloned()
                .ok_or(PlanError::EmptyCatalog)?,
        };

        Ok(Self { tiers, fallback })
    }

    pub fn get(&self, tier_name: &str) -> Option<Arc<TierPolicy>> {
        self.tiers.get(tier_name).cloned()
    }

    pub fn contains(&self, tier_name: &str) -> bool {
        self.tiers.contains_key(tier_name)
    }

    /// 最严格的策略
    pub fn fallback(&self) -> Arc<TierPolicy> {
        self.fallback.clone()
    }
}
