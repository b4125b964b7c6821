//! 规则编译器
//!
//! 将规则文本分词并解析为语法树。

use tracing::debug;

use crate::ast::Expr;
use crate::error::Result;
use crate::lexer::tokenize;
use crate::parser::{DEFAULT_MAX_DEPTH, Parser};

/// 规则编译器
#[derive(Debug, Clone)]
pub struct RuleCompiler {
    max_depth: usize,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// 编译规则文本
    pub fn compile(&self, source: &str) -> Result<Expr> {
        let tokens = tokenize(source);
        let (expr, consumed) = Parser::new(&tokens)
            .with_max_depth(self.max_depth)
            .parse_prefix()?;

        if consumed < tokens.len() {
            debug!(
                consumed,
                ignored = tokens.len() - consumed,
                "表达式之后的 token 已被忽略"
            );
        }

        Ok(expr)
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}
