//! 规则执行器
//!
//! 在后序展开的步骤序列上用显式栈求值。逻辑节点的两个子节点总是都会被求值，
//! 不做短路，因此任一子节点的错误都会在合并之前抛出。

use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::ast::{Condition, Expr};
use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::models::EvaluationContext;
use crate::operators::LogicalOperator;
use crate::tree::RuleTree;

/// 后序求值步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    /// 对一个叶子条件求值并压栈
    Condition(Condition<'a>),
    /// 弹出右、左两个结果，按保存的操作符合并后压栈
    Combine(&'a str),
}

/// 评估结果
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub matched: bool,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_us: u64,
}

/// 规则执行器
#[derive(Debug, Clone, Default)]
pub struct RuleExecutor {
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 直接在语法树上求值
    pub fn execute_expr(&self, expr: &Expr, context: &EvaluationContext) -> Result<EvaluationResult> {
        self.execute(&expr.steps(), context)
    }

    /// 在已加载的持久化规则树上求值
    pub fn execute_tree(
        &self,
        tree: &RuleTree,
        context: &EvaluationContext,
    ) -> Result<EvaluationResult> {
        self.execute(&tree.steps()?, context)
    }

    /// 执行步骤序列
    pub fn execute(&self, steps: &[Step<'_>], context: &EvaluationContext) -> Result<EvaluationResult> {
        let start = Instant::now();
        let mut trace = Vec::new();
        let mut values: Vec<bool> = Vec::with_capacity(steps.len() / 2 + 1);

        for step in steps {
            match step {
                Step::Condition(condition) => {
                    let matched = ConditionEvaluator::evaluate(condition, context)?;
                    debug!(condition = %condition, matched, "条件已评估");
                    if self.trace_enabled {
                        trace.push(format!(
                            "{} => {}",
                            condition,
                            if matched { "MATCHED" } else { "NOT_MATCHED" }
                        ));
                    }
                    values.push(matched);
                }
                Step::Combine(symbol) => {
                    let (left, right) = match (values.pop(), values.pop()) {
                        (Some(right), Some(left)) => (left, right),
                        _ => {
                            return Err(RuleError::CorruptTree(format!(
                                "操作符 {} 缺少操作数",
                                symbol
                            )));
                        }
                    };
                    let operator: LogicalOperator = symbol.parse()?;
                    let combined = operator.apply(left, right);
                    if self.trace_enabled {
                        trace.push(format!("{} {} {} => {}", left, operator, right, combined));
                    }
                    values.push(combined);
                }
            }
        }

        let matched = match (values.pop(), values.is_empty()) {
            (Some(matched), true) => matched,
            _ => {
                return Err(RuleError::CorruptTree(
                    "求值结束时结果栈不平衡".to_string(),
                ));
            }
        };

        Ok(EvaluationResult {
            matched,
            evaluation_trace: trace,
            evaluation_time_us: start.elapsed().as_micros() as u64,
        })
    }
}
