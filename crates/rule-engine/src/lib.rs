//! 资格规则引擎
//!
//! 把 `(age > 30) AND (department = Sales)` 这类规则文本解析为二叉语法树，
//! 以节点表的形式持久化，支持把多条规则用 AND 组合为新规则，
//! 并对扁平的 属性 -> 值 数据求值。
//!
//! 流程：分词（lexer）-> 解析（parser/compiler）-> 物化（materializer）-> 加载（tree）-> 求值（executor）。

pub mod ast;
pub mod cli;
pub mod combiner;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod lexer;
pub mod materializer;
pub mod models;
pub mod operators;
pub mod parser;
pub mod postgres;
pub mod service;
pub mod store;
pub mod tree;

pub use ast::{Condition, Expr, Operand};
pub use combiner::Combiner;
pub use compiler::RuleCompiler;
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use executor::{EvaluationResult, RuleExecutor, Step};
pub use lexer::{Token, TokenKind, tokenize};
pub use materializer::Materializer;
pub use models::{
    Attribute, AttributeType, EvaluationContext, NewAttribute, NewNode, Node, NodeKind, Rule,
};
pub use operators::{Comparator, LogicalOperator};
pub use postgres::PgRuleStorage;
pub use service::{RuleDetail, RuleService, RuleUpdate};
pub use store::{MemoryRuleStorage, NodeWriter, RuleStorage, StorageSession, TreeReader};
pub use tree::RuleTree;
