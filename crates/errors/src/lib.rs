//! plangate-errors - 统一错误处理
//!
//! 三类业务拒绝（限流、配额、功能）拥有稳定的错误码与响应结构，
//! 其余错误仅在系统内部流转

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Rate limit of {limit} requests per minute exceeded for tier {tier}")]
    RateLimitExceeded {
        tier: String,
        limit: u64,
        /// 窗口重置时间（Unix 秒）
        reset_at: u64,
        retry_after_secs: u64,
    },

    #[error("Quota for {resource} exceeded on tier {tier} ({current_count}/{limit})")]
    QuotaExceeded {
        tier: String,
        resource: String,
        limit: u64,
        current_count: u64,
    },

    #[error("Feature {feature} is not available on tier {tier}")]
    FeatureNotAvailable { tier: String, feature: String },
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 是否为面向调用方的业务拒绝
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. }
                | Self::QuotaExceeded { .. }
                | Self::FeatureNotAvailable { .. }
        )
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Internal(_) => 500,
            Self::ExternalService(_) => 502,
            Self::Timeout(_) => 504,
            Self::RateLimitExceeded { .. } => 429,
            Self::QuotaExceeded { .. } => 403,
            Self::FeatureNotAvailable { .. } => 403,
        }
    }

    /// 稳定的错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::FeatureNotAvailable { .. } => "FEATURE_NOT_AVAILABLE",
        }
    }

    /// 建议重试等待时间（秒）
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded {
                retry_after_secs, ..
            } => Some((*retry_after_secs).max(1)),
            _ => None,
        }
    }

    /// 转换为错误响应体
    pub fn to_error_body(&self) -> ErrorBody {
        let (tier, limit, current_count) = match self {
            Self::RateLimitExceeded { tier, limit, .. } => (Some(tier.clone()), Some(*limit), None),
            Self::QuotaExceeded {
                tier,
                limit,
                current_count,
                ..
            } => (Some(tier.clone()), Some(*limit), Some(*current_count)),
            Self::FeatureNotAvailable { tier, .. } => (Some(tier.clone()), None, None),
            _ => (None, None, None),
        };

        ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                tier,
                limit,
                current_count,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = self.retry_after_secs();
        let mut response = (status, Json(self.to_error_body())).into_response();

        if let Self::RateLimitExceeded { limit, reset_at, .. } = &self {
            let headers = response.headers_mut();
            if let Ok(val) = HeaderValue::from_str(&limit.to_string()) {
                headers.insert("X-RateLimit-Limit", val);
            }
            headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
            if let Ok(val) = HeaderValue::from_str(&reset_at.to_string()) {
                headers.insert("X-RateLimit-Reset", val);
            }
        }

        if let Some(secs) = retry_after {
            if let Ok(val) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, val);
            }
        }

        response
    }
}

/// 拒绝响应体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_count: Option<u64>,
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
