//! 规则引擎指标
//!
//! 基于 metrics crate 的门面 API 记录指标，由 metrics-exporter-prometheus 收集。
//! 命令行工具是短生命周期进程，不启动抓取端口；需要时通过 [`render`] 输出当前快照。

use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{InfraError, Result};

pub const RULES_CREATED_TOTAL: &str = "rules_created_total";
pub const RULES_COMBINED_TOTAL: &str = "rules_combined_total";
pub const RULE_COMBINATION_SOURCES: &str = "rule_combination_sources";
pub const RULE_EVALUATIONS_TOTAL: &str = "rule_evaluations_total";
pub const RULE_EVALUATION_DURATION_SECONDS: &str = "rule_evaluation_duration_seconds";

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 安装全局 Prometheus recorder 并注册指标描述
///
/// 重复调用返回已安装的 handle。
pub fn install() -> Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| InfraError::Observability(format!("metrics recorder: {}", e)))?;
    describe_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// 当前指标的 Prometheus 文本格式快照；未安装 recorder 时返回 None
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_metrics() {
    metrics::describe_counter!(RULES_CREATED_TOTAL, "Total number of rules created from text");
    metrics::describe_counter!(RULES_COMBINED_TOTAL, "Total number of combined rules");
    metrics::describe_histogram!(
        RULE_COMBINATION_SOURCES,
        "Number of source rules per combination"
    );
    metrics::describe_counter!(RULE_EVALUATIONS_TOTAL, "Total number of rule evaluations");
    metrics::describe_histogram!(
        RULE_EVALUATION_DURATION_SECONDS,
        "Rule evaluation duration in seconds"
    );
}

/// 记录规则创建
#[inline]
pub fn record_rule_created(outcome: &'static str) {
    metrics::counter!(RULES_CREATED_TOTAL, "outcome" => outcome).increment(1);
}

/// 记录规则组合
#[inline]
pub fn record_rule_combined(outcome: &'static str, source_count: usize) {
    metrics::counter!(RULES_COMBINED_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(RULE_COMBINATION_SOURCES).record(source_count as f64);
}

/// 记录规则评估
///
/// outcome 取值：matched / not_matched / error
#[inline]
pub fn record_evaluation(outcome: &'static str, elapsed: Duration) {
    metrics::counter!(RULE_EVALUATIONS_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(RULE_EVALUATION_DURATION_SECONDS, "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    // 全局 recorder 每个进程只能安装一次，相关断言集中在同一个测试中
    #[test]
    fn test_installed_recorder_collects_metrics() {
        let handle = install().unwrap();
        assert!(std::ptr::eq(handle, install().unwrap()));

        record_rule_created("success");
        record_rule_combined("success", 3);
        record_evaluation("matched", Duration::from_millis(2));

        let snapshot = render().unwrap();
        assert!(snapshot.contains(RULES_CREATED_TOTAL));
        assert!(snapshot.contains(RULES_COMBINED_TOTAL));
        assert!(snapshot.contains(RULE_COMBINATION_SOURCES));
        assert!(snapshot.contains(RULE_EVALUATIONS_TOTAL));
        assert!(snapshot.contains("outcome=\"matched\""));
    }
}
