//! 规则表达式的内存语法树

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, RuleError};
use crate::executor::Step;

/// 语法树节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    /// 二元逻辑组合；operator 保留解析时的原始 token
    Operator {
        operator: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Operand(Operand),
}

impl Expr {
    pub fn operator(operator: impl Into<String>, left: Expr, right: Expr) -> Self {
        Self::Operator {
            operator: operator.into(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn operand(
        attribute: impl Into<String>,
        comparator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Operand(Operand {
            attribute: attribute.into(),
            comparator: comparator.into(),
            value: value.into(),
        })
    }

    /// 后序展开：左子树、右子树、父节点
    pub fn steps(&self) -> Vec<Step<'_>> {
        enum Visit<'e> {
            Enter(&'e Expr),
            Combine(&'e str),
        }

        let mut steps = Vec::new();
        let mut stack = vec![Visit::Enter(self)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(Expr::Operand(operand)) => {
                    steps.push(Step::Condition(operand.as_condition()));
                }
                Visit::Enter(Expr::Operator {
                    operator,
                    left,
                    right,
                }) => {
                    stack.push(Visit::Combine(operator));
                    stack.push(Visit::Enter(right));
                    stack.push(Visit::Enter(left));
                }
                Visit::Combine(operator) => steps.push(Step::Combine(operator)),
            }
        }
        steps
    }

    /// 表达式引用到的所有属性名
    pub fn attributes(&self) -> BTreeSet<&str> {
        self.steps()
            .into_iter()
            .filter_map(|step| match step {
                Step::Condition(condition) => Some(condition.attribute),
                Step::Combine(_) => None,
            })
            .collect()
    }
}

/// 逐层拆下子树后释放，析构深度与树高无关
impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_children(&mut pending);
        while let Some(mut expr) = pending.pop() {
            expr.detach_children(&mut pending);
        }
    }
}

impl Expr {
    fn detach_children(&mut self, into: &mut Vec<Expr>) {
        if let Self::Operator { left, right, .. } = self {
            into.push(std::mem::replace(left.as_mut(), Self::placeholder()));
            into.push(std::mem::replace(right.as_mut(), Self::placeholder()));
        }
    }

    /// 不分配内存的空叶子
    fn placeholder() -> Self {
        Self::Operand(Operand {
            attribute: String::new(),
            comparator: String::new(),
            value: String::new(),
        })
    }
}

/// 以可重新解析的形式输出，如 `(age > 30 AND department = Sales)`
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operand(operand) => write!(f, "{}", operand),
            Self::Operator {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
        }
    }
}

/// 叶子条件：属性、比较符、字面量三元组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operand {
    pub attribute: String,
    pub comparator: String,
    pub value: String,
}

impl Operand {
    /// 持久化形式：三个字段以单个空格连接
    pub fn payload(&self) -> String {
        format!("{} {} {}", self.attribute, self.comparator, self.value)
    }

    pub fn as_condition(&self) -> Condition<'_> {
        Condition {
            attribute: &self.attribute,
            comparator: &self.comparator,
            value: &self.value,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload())
    }
}

/// 借用形式的条件，既可以来自语法树也可以来自节点 payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition<'a> {
    pub attribute: &'a str,
    pub comparator: &'a str,
    pub value: &'a str,
}

impl<'a> Condition<'a> {
    /// 按空白切分 payload，必须恰好得到三个字段
    pub fn from_payload(payload: &'a str) -> Result<Self> {
        let mut fields = payload.split_whitespace();
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(attribute), Some(comparator), Some(value), None) => Ok(Self {
                attribute,
                comparator,
                value,
            }),
            _ => Err(RuleError::CorruptTree(format!(
                "操作数 payload 必须包含三个字段: '{}'",
                payload
            ))),
        }
    }

    pub fn to_operand(&self) -> Operand {
        Operand {
            attribute: self.attribute.to_string(),
            comparator: self.comparator.to_string(),
            value: self.value.to_string(),
        }
    }
}

impl fmt::Display for Condition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.attribute, self.comparator, self.value)
    }
}
