//! 规则服务
//!
//! 对外暴露的规则生命周期操作。写操作在单个存储会话内完成，任何一步失败都不会留下
//! 部分写入；评估只读取存储。

use std::time::Instant;

use eligibility_shared::config::EngineConfig;
use eligibility_shared::observability::metrics;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::ast::Expr;
use crate::combiner::Combiner;
use crate::compiler::RuleCompiler;
use crate::error::{Result, RuleError};
use crate::executor::{EvaluationResult, RuleExecutor};
use crate::materializer::Materializer;
use crate::models::{Attribute, EvaluationContext, NewAttribute, Rule};
use crate::store::{RuleStorage, StorageSession, TreeReader};
use crate::tree::RuleTree;

/// 默认分页大小
pub const DEFAULT_LIST_LIMIT: i64 = 100;

/// 规则元数据更新，空字符串视为未提供
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl RuleUpdate {
    fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|s| !s.is_empty())
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref().filter(|s| !s.is_empty())
    }
}

/// 规则及其还原出的表达式
#[derive(Debug, Clone, Serialize)]
pub struct RuleDetail {
    #[serde(flatten)]
    pub rule: Rule,
    pub expression: String,
    pub node_count: usize,
}

pub struct RuleService<S: RuleStorage> {
    storage: S,
    compiler: RuleCompiler,
    combiner: Combiner,
}

impl<S: RuleStorage> RuleService<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, &EngineConfig::default())
    }

    pub fn with_config(storage: S, config: &EngineConfig) -> Self {
        Self {
            storage,
            compiler: RuleCompiler::with_max_depth(config.max_depth),
            combiner: Combiner::new(config.combine_strategy),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// 解析规则文本并持久化
    #[instrument(skip(self, rule_string, description), fields(rule_name = %name))]
    pub async fn create(
        &self,
        rule_string: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Rule> {
        let result = self.create_inner(rule_string, name, description).await;
        metrics::record_rule_created(outcome(&result));
        if let Err(e) = &result {
            warn!(code = e.code(), error = %e, "规则创建失败");
        }
        result
    }

    async fn create_inner(
        &self,
        rule_string: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Rule> {
        // 先解析，解析失败时不开启会话
        let expr = self.compiler.compile(rule_string)?;

        let mut session = self.storage.begin().await?;
        let rule_id = session.insert_rule(name, description).await?;
        let root_id = Materializer::new(&mut session, rule_id)
            .materialize(&expr)
            .await?;
        session.set_root(rule_id, root_id).await?;
        let rule = session
            .find_rule(rule_id)
            .await?
            .ok_or(RuleError::RuleNotFound(rule_id))?;
        session.commit().await?;

        info!(rule_id, root_node_id = root_id, "规则已创建");
        Ok(rule)
    }

    /// 按顺序用 AND 组合已有规则
    #[instrument(skip(self), fields(source_count = rule_ids.len()))]
    pub async fn combine(&self, rule_ids: &[i64], new_name: &str) -> Result<Rule> {
        let result: Result<Rule> = async {
            let mut session = self.storage.begin().await?;
            let rule = self
                .combiner
                .combine(&mut session, rule_ids, new_name)
                .await?;
            session.commit().await?;
            Ok(rule)
        }
        .await;

        metrics::record_rule_combined(outcome(&result), rule_ids.len());
        if let Err(e) = &result {
            warn!(code = e.code(), error = %e, "规则组合失败");
        }
        result
    }

    /// 对已存储的规则求值
    pub async fn evaluate(&self, rule_id: i64, context: &EvaluationContext) -> Result<bool> {
        Ok(self.evaluate_detailed(rule_id, context, false).await?.matched)
    }

    /// 求值并返回耗时，可选记录追踪
    #[instrument(skip(self, context))]
    pub async fn evaluate_detailed(
        &self,
        rule_id: i64,
        context: &EvaluationContext,
        trace: bool,
    ) -> Result<EvaluationResult> {
        let start = Instant::now();
        let result: Result<EvaluationResult> = async {
            let tree = self.load_tree(rule_id).await?;
            executor(trace).execute_tree(&tree, context)
        }
        .await;

        metrics::record_evaluation(evaluation_outcome(&result), start.elapsed());
        result
    }

    /// 不落库，直接对规则文本求值
    #[instrument(skip(self, context))]
    pub fn dry_run(
        &self,
        rule_string: &str,
        context: &EvaluationContext,
        trace: bool,
    ) -> Result<EvaluationResult> {
        let expr = self.compiler.compile(rule_string)?;
        executor(trace).execute_expr(&expr, context)
    }

    /// 仅解析规则文本
    pub fn compile(&self, rule_string: &str) -> Result<Expr> {
        self.compiler.compile(rule_string)
    }

    pub async fn get(&self, rule_id: i64) -> Result<Rule> {
        let mut session = self.storage.begin().await?;
        session
            .find_rule(rule_id)
            .await?
            .ok_or(RuleError::RuleNotFound(rule_id))
    }

    /// 获取规则并还原其表达式
    pub async fn describe(&self, rule_id: i64) -> Result<RuleDetail> {
        let mut session = self.storage.begin().await?;
        let rule = session
            .find_rule(rule_id)
            .await?
            .ok_or(RuleError::RuleNotFound(rule_id))?;
        let tree = RuleTree::load(&mut session, rule_id).await?;

        Ok(RuleDetail {
            expression: tree.expression()?,
            node_count: tree.len(),
            rule,
        })
    }

    pub async fn load_tree(&self, rule_id: i64) -> Result<RuleTree> {
        let mut session = self.storage.begin().await?;
        RuleTree::load(&mut session, rule_id).await
    }

    pub async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Rule>> {
        self.storage.list_rules(skip, limit).await
    }

    /// 更新名称或描述，规则树保持不变
    #[instrument(skip(self))]
    pub async fn update(&self, rule_id: i64, update: &RuleUpdate) -> Result<Rule> {
        let rule = self
            .storage
            .update_rule(rule_id, update.name(), update.description())
            .await?
            .ok_or(RuleError::RuleNotFound(rule_id))?;

        info!(rule_id, "规则已更新");
        Ok(rule)
    }

    /// 删除规则记录；节点不级联删除，引用它们的组合规则仍然可用
    #[instrument(skip(self))]
    pub async fn delete(&self, rule_id: i64) -> Result<()> {
        if self.storage.delete_rule(rule_id).await? {
            Ok(())
        } else {
            Err(RuleError::RuleNotFound(rule_id))
        }
    }

    #[instrument(skip(self, attribute), fields(attribute = %attribute.name))]
    pub async fn declare_attribute(&self, attribute: NewAttribute) -> Result<Attribute> {
        let attribute = self.storage.declare_attribute(attribute).await?;
        info!(attribute_id = attribute.id, "属性已登记");
        Ok(attribute)
    }

    pub async fn list_attributes(&self) -> Result<Vec<Attribute>> {
        self.storage.list_attributes().await
    }
}

fn executor(trace: bool) -> RuleExecutor {
    if trace {
        RuleExecutor::new().with_trace()
    } else {
        RuleExecutor::new()
    }
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}

fn evaluation_outcome(result: &Result<EvaluationResult>) -> &'static str {
    match result {
        Ok(r) if r.matched => "matched",
        Ok(_) => "not_matched",
        Err(_) => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRuleStorage;
    use serde_json::json;

    fn service() -> RuleService<MemoryRuleStorage> {
        RuleService::new(MemoryRuleStorage::new())
    }

    fn ctx(value: serde_json::Value) -> EvaluationContext {
        EvaluationContext::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_evaluate() {
        let service = service();
        let rule = service
            .create("(age > 30) AND (department = Sales)", "senior_sales", Some("demo"))
            .await
            .unwrap();
        assert!(rule.root_node_id.is_some());
        assert_eq!(rule.description.as_deref(), Some("demo"));

        assert!(service
            .evaluate(rule.id, &ctx(json!({"age": 35, "department": "Sales"})))
            .await
            .unwrap());
        assert!(!service
            .evaluate(rule.id, &ctx(json!({"age": 25, "department": "Sales"})))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_parse_failure_creates_nothing() {
        let service = service();
        let err = service.create("(age > 30", "broken", None).await.unwrap_err();
        assert!(matches!(err, RuleError::ParseError(_)));
        assert_eq!(service.storage().rule_count(), 0);
        assert_eq!(service.storage().node_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_name() {
        let service = service();
        service.create("a > 1", "dup", None).await.unwrap();
        let err = service.create("b > 2", "dup", None).await.unwrap_err();
        assert!(matches!(err, RuleError::NameConflict(_)));
        assert_eq!(service.storage().node_count(), 1);
    }

    #[tokio::test]
    async fn test_update_ignores_empty_values() {
        let service = service();
        let rule = service.create("a > 1", "original", Some("first")).await.unwrap();

        let updated = service
            .update(
                rule.id,
                &RuleUpdate {
                    name: Some(String::new()),
                    description: Some("second".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "original");
        assert_eq!(updated.description.as_deref(), Some("second"));
        assert_eq!(updated.root_node_id, rule.root_node_id);

        let err = service.update(999, &RuleUpdate::default()).await.unwrap_err();
        assert!(matches!(err, RuleError::RuleNotFound(999)));
    }

    #[tokio::test]
    async fn test_describe() {
        let service = service();
        let rule = service
            .create("a > 1 OR b > 2 AND c = x", "mixed", None)
            .await
            .unwrap();
        let detail = service.describe(rule.id).await.unwrap();
        assert_eq!(detail.expression, "(a > 1 OR (b > 2 AND c = x))");
        assert_eq!(detail.node_count, 5);
    }

    #[tokio::test]
    async fn test_delete() {
        let service = service();
        let rule = service.create("a > 1", "gone", None).await.unwrap();
        service.delete(rule.id).await.unwrap();

        assert!(matches!(
            service.get(rule.id).await,
            Err(RuleError::RuleNotFound(_))
        ));
        assert!(matches!(
            service.delete(rule.id).await,
            Err(RuleError::RuleNotFound(_))
        ));
    }

    #[test]
    fn test_dry_run_with_trace() {
        let result = service()
            .dry_run("(a > 1) OR (b = x)", &ctx(json!({"a": 0, "b": "x"})), true)
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.evaluation_trace.len(), 3);
    }

    #[test]
    fn test_depth_limit_from_config() {
        let config = EngineConfig {
            max_depth: 2,
            ..EngineConfig::default()
        };
        let service = RuleService::with_config(MemoryRuleStorage::new(), &config);
        assert!(service.compile("((a > 1))").is_ok());
        assert!(matches!(
            service.compile("(((a > 1)))"),
            Err(RuleError::DepthExceeded { limit: 2 })
        ));
    }
}
