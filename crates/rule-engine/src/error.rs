//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("规则未找到: {0}")]
    RuleNotFound(i64),

    #[error("数据中缺少属性: {0}")]
    MissingAttribute(String),

    #[error("不支持的操作符: {0}")]
    UnsupportedOperator(String),

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("无效的规则组合: {0}")]
    InvalidCombination(String),

    #[error("表达式嵌套超过上限 {limit}")]
    DepthExceeded { limit: usize },

    #[error("规则树已损坏: {0}")]
    CorruptTree(String),

    #[error("名称已存在: {0}")]
    NameConflict(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "PARSE_ERROR",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::MissingAttribute(_) => "MISSING_ATTRIBUTE",
            Self::UnsupportedOperator(_) => "UNSUPPORTED_OPERATOR",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::InvalidCombination(_) => "INVALID_COMBINATION",
            Self::DepthExceeded { .. } => "DEPTH_EXCEEDED",
            Self::CorruptTree(_) => "CORRUPT_TREE",
            Self::NameConflict(_) => "NAME_CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::JsonError(_) => "JSON_ERROR",
        }
    }

    /// 是否为可重试错误（仅存储层的瞬时故障）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::PoolTimedOut) | Self::Database(sqlx::Error::Io(_))
        )
    }

    /// 将唯一约束冲突转换为 NameConflict，其余数据库错误原样保留
    pub(crate) fn from_insert(err: sqlx::Error, name: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::NameConflict(name.to_string())
            }
            _ => Self::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(RuleError::RuleNotFound(7).code(), "RULE_NOT_FOUND");
        assert_eq!(
            RuleError::MissingAttribute("age".to_string()).code(),
            "MISSING_ATTRIBUTE"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(RuleError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!RuleError::ParseError("empty".to_string()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = RuleError::TypeMismatch {
            expected: "number".to_string(),
            actual: "string".to_string(),
        };
        assert_eq!(err.to_string(), "类型不匹配: 期望 number, 实际 string");
    }
}
