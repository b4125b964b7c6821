//! 持久化规则树
//!
//! 从规则的根节点出发把可达节点一次性读入内存。组合规则的树可能引用其他规则的节点，
//! 同一节点也可能被多次引用（有向无环图），加载时每个节点只读取一次。

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{Condition, Expr};
use crate::error::{Result, RuleError};
use crate::executor::Step;
use crate::models::{Node, NodeKind};
use crate::store::TreeReader;

/// [`RuleTree::to_expr`] 允许的最大树高
pub const MAX_EXPR_HEIGHT: usize = 1024;

/// 已加载的规则树
#[derive(Debug, Clone)]
pub struct RuleTree {
    rule_id: i64,
    root_id: i64,
    nodes: HashMap<i64, Node>,
}

impl RuleTree {
    /// 加载规则的完整树
    pub async fn load<R: TreeReader + ?Sized>(reader: &mut R, rule_id: i64) -> Result<Self> {
        let rule = reader
            .find_rule(rule_id)
            .await?
            .ok_or(RuleError::RuleNotFound(rule_id))?;
        let root_id = rule.root_node_id.ok_or_else(|| {
            RuleError::CorruptTree(format!("规则 {} 没有根节点", rule_id))
        })?;

        let mut nodes = HashMap::new();
        let mut pending = vec![root_id];
        while let Some(node_id) = pending.pop() {
            if nodes.contains_key(&node_id) {
                continue;
            }
            let node = reader.find_node(node_id).await?.ok_or_else(|| {
                RuleError::CorruptTree(format!("规则 {} 引用了不存在的节点 {}", rule_id, node_id))
            })?;
            if node.kind == NodeKind::Operator {
                let (left, right) = node.children()?;
                pending.push(right);
                pending.push(left);
            }
            nodes.insert(node_id, node);
        }

        debug!(rule_id, root_id, nodes = nodes.len(), "规则树已加载");
        Ok(Self {
            rule_id,
            root_id,
            nodes,
        })
    }

    /// 由已知节点构造
    pub fn from_nodes(rule_id: i64, root_id: i64, nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            rule_id,
            root_id,
            nodes: nodes.into_iter().map(|node| (node.id, node)).collect(),
        }
    }

    pub fn rule_id(&self) -> i64 {
        self.rule_id
    }

    pub fn root_id(&self) -> i64 {
        self.root_id
    }

    /// 不同节点的数量（共享节点只计一次）
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Result<&Node> {
        self.node(self.root_id)
    }

    pub fn node(&self, node_id: i64) -> Result<&Node> {
        self.nodes
            .get(&node_id)
            .ok_or_else(|| RuleError::CorruptTree(format!("节点 {} 不在规则树中", node_id)))
    }

    /// 后序展开为求值步骤
    ///
    /// 当前路径上再次出现同一操作符节点即视为环。
    pub fn steps(&self) -> Result<Vec<Step<'_>>> {
        let mut steps = Vec::with_capacity(self.nodes.len());
        let mut on_path: HashSet<i64> = HashSet::new();
        let mut stack = vec![(self.root_id, false)];

        while let Some((node_id, expanded)) = stack.pop() {
            let node = self.node(node_id)?;

            if expanded {
                on_path.remove(&node_id);
                steps.push(Step::Combine(node.operator_symbol()?));
                continue;
            }

            match node.kind {
                NodeKind::Operand => {
                    steps.push(Step::Condition(Condition::from_payload(node.payload_text()?)?));
                }
                NodeKind::Operator => {
                    if !on_path.insert(node_id) {
                        return Err(self.cycle_at(node_id));
                    }
                    let (left, right) = node.children()?;
                    stack.push((node_id, true));
                    stack.push((right, false));
                    stack.push((left, false));
                }
            }
        }

        Ok(steps)
    }

    /// 按求值顺序列出所有叶子 payload
    pub fn payloads(&self) -> Result<Vec<String>> {
        Ok(self
            .steps()?
            .into_iter()
            .filter_map(|step| match step {
                Step::Condition(condition) => Some(condition.to_string()),
                Step::Combine(_) => None,
            })
            .collect())
    }

    /// 还原为可重新解析的规则文本，如 `(age > 30 AND department = Sales)`
    ///
    /// 显式栈遍历，组合多次的深层规则树同样适用。
    pub fn expression(&self) -> Result<String> {
        enum Visit<'t> {
            Enter(i64),
            Text(&'t str),
            Leave(i64),
        }

        let mut out = String::new();
        let mut on_path: HashSet<i64> = HashSet::new();
        let mut stack = vec![Visit::Enter(self.root_id)];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Text(text) => out.push_str(text),
                Visit::Leave(node_id) => {
                    on_path.remove(&node_id);
                    out.push(')');
                }
                Visit::Enter(node_id) => {
                    let node = self.node(node_id)?;
                    match node.kind {
                        NodeKind::Operand => {
                            let condition = Condition::from_payload(node.payload_text()?)?;
                            out.push_str(&condition.to_string());
                        }
                        NodeKind::Operator => {
                            if !on_path.insert(node_id) {
                                return Err(self.cycle_at(node_id));
                            }
                            let (left, right) = node.children()?;
                            out.push('(');
                            stack.push(Visit::Leave(node_id));
                            stack.push(Visit::Enter(right));
                            stack.push(Visit::Text(" "));
                            stack.push(Visit::Text(node.operator_symbol()?));
                            stack.push(Visit::Text(" "));
                            stack.push(Visit::Enter(left));
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// 还原为独立的语法树，共享节点会被展开为各自的副本
    ///
    /// 语法树的格式化与比较是递归实现，树高超过 [`MAX_EXPR_HEIGHT`] 时返回
    /// `DepthExceeded`；深层规则请使用 [`RuleTree::expression`] 或 [`RuleTree::steps`]。
    pub fn to_expr(&self) -> Result<Expr> {
        let mut built: Vec<(Expr, usize)> = Vec::new();
        for step in self.steps()? {
            match step {
                Step::Condition(condition) => {
                    built.push((Expr::Operand(condition.to_operand()), 0));
                }
                Step::Combine(operator) => match (built.pop(), built.pop()) {
                    (Some((right, rh)), Some((left, lh))) => {
                        let height = lh.max(rh) + 1;
                        if height > MAX_EXPR_HEIGHT {
                            return Err(RuleError::DepthExceeded {
                                limit: MAX_EXPR_HEIGHT,
                            });
                        }
                        built.push((Expr::operator(operator, left, right), height));
                    }
                    _ => {
                        return Err(RuleError::CorruptTree(format!(
                            "操作符 {} 缺少操作数",
                            operator
                        )));
                    }
                },
            }
        }

        match (built.pop(), built.is_empty()) {
            (Some((expr, _)), true) => Ok(expr),
            _ => Err(RuleError::CorruptTree(format!(
                "规则 {} 无法还原为单一表达式",
                self.rule_id
            ))),
        }
    }

    fn cycle_at(&self, node_id: i64) -> RuleError {
        RuleError::CorruptTree(format!("规则 {} 的节点 {} 形成环", self.rule_id, node_id))
    }
}
