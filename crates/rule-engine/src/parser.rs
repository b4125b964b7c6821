//! 递归下降解析器
//!
//! 语法（游标只向前移动，不修改 token 序列）：
//!
//! ```text
//! expression  := conjunction ( 'OR' conjunction )*
//! conjunction := primary ( 'AND' primary )*
//! primary     := '(' primary [ OP primary CLOSE | ')' ]
//!              | operand
//! operand     := TOKEN TOKEN TOKEN
//! ```
//!
//! - operand 无条件消费接下来的三个 token，不检查其种类。
//! - 括号内只解析一个二元运算：第一个子表达式之后若不是 `)`，该 token 原样作为操作符保存，
//!   随后解析右侧子表达式并弹出 CLOSE（不检查种类）。`(a > 1 AND b > 2 AND c > 3)`
//!   等价于 `(a > 1 AND b > 2)`，多余的 token 被丢弃。
//! - 顶层表达式结束后，剩余 token 被静默忽略：`age > 30 extra` 等价于 `age > 30`。
//! - `max_depth` 同时限制括号嵌套层数与语法树高度，超长的 AND/OR 链返回 `DepthExceeded`。

use crate::ast::Expr;
use crate::error::{Result, RuleError};
use crate::lexer::{Token, TokenKind};

/// 默认括号嵌套与语法树高度上限
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// 已解析的子表达式及其高度（叶子为 0）
struct Parsed {
    expr: Expr,
    height: usize,
}

pub struct Parser<'t, 's> {
    tokens: &'t [Token<'s>],
    pos: usize,
    max_depth: usize,
}

impl<'t, 's> Parser<'t, 's> {
    pub fn new(tokens: &'t [Token<'s>]) -> Self {
        Self {
            tokens,
            pos: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 解析一个表达式，忽略其后的 token
    pub fn parse(self) -> Result<Expr> {
        self.parse_prefix().map(|(expr, _)| expr)
    }

    /// 解析一个表达式，同时返回消费的 token 数
    pub fn parse_prefix(mut self) -> Result<(Expr, usize)> {
        let parsed = self.expression()?;
        Ok((parsed.expr, self.pos))
    }

    fn expression(&mut self) -> Result<Parsed> {
        let mut left = self.conjunction()?;
        while let Some(keyword) = self.peek_keyword("OR") {
            self.pos += 1;
            let right = self.conjunction()?;
            left = self.join(keyword, left, right)?;
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> Result<Parsed> {
        let mut left = self.primary(0)?;
        while let Some(keyword) = self.peek_keyword("AND") {
            self.pos += 1;
            let right = self.primary(0)?;
            left = self.join(keyword, left, right)?;
        }
        Ok(left)
    }

    fn primary(&mut self, depth: usize) -> Result<Parsed> {
        if !matches!(self.peek(), Some(token) if token.kind == TokenKind::LParen) {
            return self.operand();
        }

        if depth >= self.max_depth {
            return Err(self.depth_exceeded());
        }
        self.pos += 1;

        let left = self.primary(depth + 1)?;
        match self.peek() {
            Some(token) if token.kind == TokenKind::RParen => {
                self.pos += 1;
                Ok(left)
            }
            Some(_) => {
                let operator = self.next("操作符")?.text;
                let right = self.primary(depth + 1)?;
                self.next("')'")?;
                self.join(operator, left, right)
            }
            None => Err(RuleError::ParseError("缺少右括号 ')'".to_string())),
        }
    }

    /// 构造二元节点，树高超过上限时报错
    fn join(&self, operator: &str, left: Parsed, right: Parsed) -> Result<Parsed> {
        let height = left.height.max(right.height) + 1;
        if height > self.max_depth {
            return Err(self.depth_exceeded());
        }
        Ok(Parsed {
            expr: Expr::operator(operator, left.expr, right.expr),
            height,
        })
    }

    fn depth_exceeded(&self) -> RuleError {
        RuleError::DepthExceeded {
            limit: self.max_depth,
        }
    }

    fn operand(&mut self) -> Result<Parsed> {
        let attribute = self.next("属性名")?.text;
        let comparator = self.next("比较符")?.text;
        let value = self.next("比较值")?.text;
        Ok(Parsed {
            expr: Expr::operand(attribute, comparator, value),
            height: 0,
        })
    }

    fn peek(&self) -> Option<&'t Token<'s>> {
        self.tokens.get(self.pos)
    }

    fn peek_keyword(&self, keyword: &str) -> Option<&'s str> {
        self.peek()
            .filter(|token| token.is_keyword(keyword))
            .map(|token| token.text)
    }

    fn next(&mut self, expected: &str) -> Result<&'t Token<'s>> {
        let token = self.tokens.get(self.pos).ok_or_else(|| {
            RuleError::ParseError(format!("输入意外结束，缺少{}", expected))
        })?;
        self.pos += 1;
        Ok(token)
    }
}
