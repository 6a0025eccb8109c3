//! plangate-config - 配置加载库
//!
//! 加载顺序：`default.toml` → `{APP_ENV}.toml` → `APP_` 前缀环境变量（`__` 分隔层级）

use std::collections::HashMap;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use plangate_common::{Feature, PlanError, ResourceKind, TierCatalog, TierSpec};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid tier table: {0}")]
    Plan(#[from] PlanError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Secret<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    "plangate".to_string()
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 输出 JSON 日志（生产环境默认开启）
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// 操作分类规则
///
/// 方法与路径匹配的请求会额外经过配额或功能检查
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionRule {
    /// HTTP 方法，缺省匹配所有方法
    #[serde(default)]
    pub method: Option<String>,
    /// 路径正则
    pub path: String,
    /// 该操作创建的资源
    #[serde(default)]
    pub resource: Option<ResourceKind>,
    /// 该操作需要的功能
    #[serde(default)]
    pub feature: Option<Feature>,
}

/// 准入控制配置
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 等级策略缓存 TTL（秒）
    #[serde(default = "default_policy_cache_ttl_secs")]
    pub policy_cache_ttl_secs: u64,
    #[serde(default = "default_policy_cache_capacity")]
    pub policy_cache_capacity: u64,
    /// 订阅查询超时（毫秒）
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    /// 查询失败时使用的等级，缺省取预算最低的等级
    #[serde(default)]
    pub fallback_tier: Option<String>,
    /// 空闲窗口清理间隔（秒）
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// 窗口空闲多久后清理（秒）
    #[serde(default = "default_idle_eviction_secs")]
    pub idle_eviction_secs: u64,
    /// 计数由外部系统维护的资源，暂不强制
    #[serde(default)]
    pub external_count_kinds: Vec<ResourceKind>,
    #[serde(default)]
    pub rules: Vec<AdmissionRule>,
}

fn default_enabled() -> bool {
    true
}

fn default_policy_cache_ttl_secs() -> u64 {
    60
}

fn default_policy_cache_capacity() -> u64 {
    10_000
}

fn default_lookup_timeout_ms() -> u64 {
    1_500
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_idle_eviction_secs() -> u64 {
    300
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            policy_cache_ttl_secs: default_policy_cache_ttl_secs(),
            policy_cache_capacity: default_policy_cache_capacity(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            fallback_tier: None,
            sweep_interval_secs: default_sweep_interval_secs(),
            idle_eviction_secs: default_idle_eviction_secs(),
            external_count_kinds: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl AdmissionConfig {
    pub fn policy_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.policy_cache_ttl_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_eviction(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_secs)
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// 未配置时使用进程内存储
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// 等级表：等级名 → 限额
    pub tiers: HashMap<String, TierSpec>,
    /// 静态租户等级分配（仅进程内订阅存储使用）
    #[serde(default)]
    pub tenants: HashMap<String, String>,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let figment = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("APP_").split("__"));

        Self::from_figment(figment)
    }

    /// 从任意 figment 提取并校验
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// 校验等级表与规则
    pub fn validate(&self) -> Result<(), ConfigError> {
        let catalog = self.tier_catalog()?;

        for (tenant, tier) in &self.tenants {
            if !catalog.contains(tier) {
                return Err(ConfigError::Invalid(format!(
                    "tenant `{}` is assigned to unknown tier `{}`",
                    tenant, tier
                )));
            }
        }

        for rule in &self.admission.rules {
            if rule.resource.is_none() && rule.feature.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "admission rule for `{}` governs neither a resource nor a feature",
                    rule.path
                )));
            }
        }

        if self.admission.lookup_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "admission.lookup_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.admission.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "admission.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// 构建等级目录
    pub fn tier_catalog(&self) -> Result<TierCatalog, ConfigError> {
        Ok(TierCatalog::from_specs(
            self.tiers.clone(),
            self.admission.fallback_tier.as_deref(),
        )?)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}
