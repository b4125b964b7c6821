//! 共享库
//!
//! 包含规则引擎各二进制共用的配置、错误处理、数据库连接与可观测性代码。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
