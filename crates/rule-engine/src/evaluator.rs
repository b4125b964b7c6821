//! 条件评估器
//!
//! 对单个 `属性 比较符 字面量` 条件求值。

use crate::ast::Condition;
use crate::error::{Result, RuleError};
use crate::models::EvaluationContext;
use crate::operators::Comparator;
use serde_json::Value;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// 先查属性再解析比较符：属性缺失时报 `MissingAttribute`，
    /// 即使比较符本身也不受支持。
    pub fn evaluate(condition: &Condition<'_>, context: &EvaluationContext) -> Result<bool> {
        let field = context
            .get(condition.attribute)
            .ok_or_else(|| RuleError::MissingAttribute(condition.attribute.to_string()))?;

        match condition.comparator.parse::<Comparator>()? {
            Comparator::Eq => Ok(Self::eq(field, condition.value)),
            Comparator::Gt => Self::compare(field, condition.value, |a, b| a > b),
            Comparator::Lt => Self::compare(field, condition.value, |a, b| a < b),
        }
    }

    /// 相等比较：不做数值转换，只有与字面量相同的字符串才相等
    fn eq(field: &Value, literal: &str) -> bool {
        matches!(field, Value::String(s) if s == literal)
    }

    /// 数值比较：字面量按浮点数解析，字段值必须可参与数值排序
    fn compare<F>(field: &Value, literal: &str, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let expected = Self::parse_literal(literal).ok_or_else(|| RuleError::TypeMismatch {
            expected: "number literal".to_string(),
            actual: format!("'{}'", literal),
        })?;

        let actual = Self::as_f64(field).ok_or_else(|| RuleError::TypeMismatch {
            expected: "number".to_string(),
            actual: Self::type_name(field).to_string(),
        })?;

        Ok(cmp(actual, expected))
    }

    /// 解析数值字面量，允许数字之间的单个下划线分隔符，如 `1_000`
    fn parse_literal(literal: &str) -> Option<f64> {
        if !literal.contains('_') {
            return literal.parse().ok();
        }

        let bytes = literal.as_bytes();
        let separated_by_digits = bytes.iter().enumerate().all(|(i, b)| {
            *b != b'_'
                || (i > 0
                    && bytes[i - 1].is_ascii_digit()
                    && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
        });
        if !separated_by_digits {
            return None;
        }
        literal.replace('_', "").parse().ok()
    }

    /// 布尔值按 0/1 参与比较
    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// 获取值的类型名称
    fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}
