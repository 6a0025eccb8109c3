//! Admission Metrics
//!
//! 准入控制指标记录

use metrics::counter;

/// 准入结果
pub fn record_admission(outcome: &'static str) {
    counter!("admission_requests_total", "outcome" => outcome).increment(1);
}

/// 内部错误被放行
pub fn record_fail_open(stage: &'static str) {
    counter!("admission_fail_open_total", "stage" => stage).increment(1);
}

/// 订阅查询结果
pub fn record_tier_lookup(result: &'static str) {
    counter!("tier_policy_lookups_total", "result" => result).increment(1);
}

/// 使用兜底等级
pub fn record_tier_fallback(reason: &'static str) {
    counter!("tier_policy_fallback_total", "reason" => reason).increment(1);
}

/// 清理的空闲窗口数
pub fn record_windows_evicted(count: usize) {
    counter!("rate_windows_evicted_total").increment(count as u64);
}
