//! 规则引擎领域模型
//!
//! `Rule`、`Node`、`Attribute` 与数据库表一一对应；`EvaluationContext` 是调用方提供的待评估数据。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Result, RuleError};

/// 规则定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// 创建成功后必然非空
    pub root_node_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum NodeKind {
    /// 逻辑操作符节点，持有左右两个子节点
    Operator,
    /// 叶子节点，payload 为 "属性 比较符 字面量"
    Operand,
}

/// 持久化的树节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Node {
    pub id: i64,
    pub kind: NodeKind,
    pub operator: Option<String>,
    pub payload: Option<String>,
    /// 创建该节点时所属的规则；组合规则引用的节点仍保留源规则 ID
    pub rule_id: i64,
    pub left_child_id: Option<i64>,
    pub right_child_id: Option<i64>,
}

impl Node {
    /// 操作符节点的左右子节点 ID
    pub fn children(&self) -> Result<(i64, i64)> {
        match (self.left_child_id, self.right_child_id) {
            (Some(left), Some(right)) => Ok((left, right)),
            _ => Err(RuleError::CorruptTree(format!(
                "操作符节点 {} 缺少子节点",
                self.id
            ))),
        }
    }

    /// 操作符节点上保存的符号
    pub fn operator_symbol(&self) -> Result<&str> {
        self.operator
            .as_deref()
            .ok_or_else(|| RuleError::CorruptTree(format!("操作符节点 {} 缺少操作符", self.id)))
    }

    /// 操作数节点的 payload
    pub fn payload_text(&self) -> Result<&str> {
        self.payload
            .as_deref()
            .ok_or_else(|| RuleError::CorruptTree(format!("操作数节点 {} 缺少 payload", self.id)))
    }
}

/// 待插入的节点（ID 由存储层分配）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub kind: NodeKind,
    pub operator: Option<String>,
    pub payload: Option<String>,
    pub rule_id: i64,
    pub left_child_id: Option<i64>,
    pub right_child_id: Option<i64>,
}

impl NewNode {
    pub fn operand(rule_id: i64, payload: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Operand,
            operator: None,
            payload: Some(payload.into()),
            rule_id,
            left_child_id: None,
            right_child_id: None,
        }
    }

    pub fn operator(rule_id: i64, operator: impl Into<String>, left: i64, right: i64) -> Self {
        Self {
            kind: NodeKind::Operator,
            operator: Some(operator.into()),
            payload: None,
            rule_id,
            left_child_id: Some(left),
            right_child_id: Some(right),
        }
    }

    /// 分配 ID 后转换为持久化节点
    pub fn with_id(self, id: i64) -> Node {
        Node {
            id,
            kind: self.kind,
            operator: self.operator,
            payload: self.payload,
            rule_id: self.rule_id,
            left_child_id: self.left_child_id,
            right_child_id: self.right_child_id,
        }
    }
}

/// 属性数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Integer,
    Float,
    Boolean,
}

impl std::str::FromStr for AttributeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "boolean" => Ok(Self::Boolean),
            other => Err(format!("未知的属性类型: {}", other)),
        }
    }
}

/// 属性登记
///
/// 仅作为元数据保存，解析与评估均不会查询它。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attribute {
    pub id: i64,
    pub name: String,
    pub data_type: AttributeType,
    pub is_active: bool,
}

/// 待登记的属性
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewAttribute {
    pub name: String,
    pub data_type: AttributeType,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewAttribute {
    pub fn new(name: impl Into<String>, data_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            data_type,
            is_active: true,
        }
    }
}

/// 评估上下文 - 扁平的 属性名 -> 值 映射
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationContext {
    data: HashMap<String, Value>,
}

impl EvaluationContext {
    pub fn new(data: HashMap<String, Value>) -> Self {
        Self { data }
    }

    /// 从 JSON 对象创建
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 从 JSON 值创建，非对象时报错
    pub fn from_value(value: Value) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// 追加一个字段
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(attribute.into(), value.into());
        self
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.data.get(attribute)
    }

    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }
}

impl FromIterator<(String, Value)> for EvaluationContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}
