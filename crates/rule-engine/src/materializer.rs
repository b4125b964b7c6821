//! 规则树物化
//!
//! 把语法树逐节点写入存储：先左子树、再右子树、最后父节点，父节点插入时两个子节点的
//! ID 都已确定。所有新节点都记在同一条规则名下。

use tracing::debug;

use crate::ast::Expr;
use crate::error::{Result, RuleError};
use crate::executor::Step;
use crate::models::{NewNode, Node};
use crate::operators::LogicalOperator;
use crate::store::NodeWriter;
use crate::tree::RuleTree;

pub struct Materializer<'w, W: NodeWriter + ?Sized> {
    writer: &'w mut W,
    rule_id: i64,
    created: usize,
}

impl<'w, W: NodeWriter + ?Sized> Materializer<'w, W> {
    pub fn new(writer: &'w mut W, rule_id: i64) -> Self {
        Self {
            writer,
            rule_id,
            created: 0,
        }
    }

    pub fn rule_id(&self) -> i64 {
        self.rule_id
    }

    /// 本次物化新插入的节点数
    pub fn created(&self) -> usize {
        self.created
    }

    /// 写入整棵语法树，返回根节点 ID
    pub async fn materialize(&mut self, expr: &Expr) -> Result<i64> {
        self.write_steps(expr.steps()).await
    }

    /// 把已加载的规则树复制为归属当前规则的新节点
    pub async fn deep_copy(&mut self, tree: &RuleTree) -> Result<i64> {
        self.write_steps(tree.steps()?).await
    }

    /// 按后序步骤逐个插入节点
    async fn write_steps(&mut self, steps: Vec<Step<'_>>) -> Result<i64> {
        let mut built: Vec<i64> = Vec::with_capacity(steps.len());

        for step in steps {
            let node = match step {
                Step::Condition(condition) => NewNode::operand(self.rule_id, condition.to_string()),
                Step::Combine(operator) => match (built.pop(), built.pop()) {
                    (Some(right), Some(left)) => {
                        NewNode::operator(self.rule_id, operator, left, right)
                    }
                    _ => {
                        return Err(RuleError::CorruptTree(format!(
                            "操作符 {} 缺少操作数",
                            operator
                        )));
                    }
                },
            };
            built.push(self.insert(node).await?);
        }

        match (built.pop(), built.is_empty()) {
            (Some(root_id), true) => {
                debug!(rule_id = self.rule_id, root_id, created = self.created, "语法树已物化");
                Ok(root_id)
            }
            _ => Err(RuleError::CorruptTree("语法树无法物化为单一根节点".to_string())),
        }
    }

    /// 按引用复用已有节点，不写入任何数据
    pub fn graft(&self, node: &Node) -> i64 {
        debug!(rule_id = self.rule_id, node_id = node.id, owner = node.rule_id, "复用已有节点");
        node.id
    }

    /// 新建一个逻辑节点连接两个已有节点
    pub async fn join(&mut self, operator: LogicalOperator, left: i64, right: i64) -> Result<i64> {
        self.insert(NewNode::operator(self.rule_id, operator.as_str(), left, right))
            .await
    }

    async fn insert(&mut self, node: NewNode) -> Result<i64> {
        let id = self.writer.insert_node(node).await?;
        self.created += 1;
        Ok(id)
    }
}
