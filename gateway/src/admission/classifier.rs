//! 操作分类器
//!
//! 根据配置的方法与路径规则，判断请求会创建哪种资源或需要哪个功能

use crate::admission::types::Operation;
use axum::http::{Method, Uri};
use plangate_config::AdmissionRule;
use plangate_errors::{AppError, AppResult};
use regex::Regex;

#[derive(Debug, Clone)]
struct CompiledRule {
    method: Option<Method>,
    path: Regex,
    operation: Operation,
}

/// 操作分类器
///
/// 按配置顺序匹配，第一条命中的规则生效
#[derive(Debug, Clone, Default)]
pub struct OperationClassifier {
    rules: Vec<CompiledRule>,
}

impl OperationClassifier {
    pub fn from_rules(rules: &[AdmissionRule]) -> AppResult<Self> {
        let rules = rules
            .iter()
            .map(|rule| -> AppResult<CompiledRule> {
                let method = rule
                    .method
                    .as_deref()
                    .map(|m| {
                        Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).map_err(|e| {
                            AppError::validation(format!("invalid method `{}`: {}", m, e))
                        })
                    })
                    .transpose()?;
                let path = Regex::new(&rule.path).map_err(|e| {
                    AppError::validation(format!("invalid path pattern `{}`: {}", rule.path, e))
                })?;

                Ok(CompiledRule {
                    method,
                    path,
                    operation: Operation {
                        resource: rule.resource,
                        feature: rule.feature,
                    },
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// 未命中任何规则时为普通操作
    pub fn classify(&self, method: &Method, uri: &Uri) -> Operation {
        let path = uri.path();
        self.rules
            .iter()
            .find(|rule| {
                rule.method.as_ref().is_none_or(|m| m == method) && rule.path.is_match(path)
            })
            .map(|rule| rule.operation)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
