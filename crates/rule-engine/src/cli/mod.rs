//! CLI 模块
//!
//! ```bash
//! rule-engine create "(age > 30) AND (department = Sales)" --name senior_sales
//! rule-engine combine --name combined 1 2 3
//! rule-engine evaluate 4 --data '{"age": 35, "department": "Sales"}' --trace
//! rule-engine check "a > 1 OR b = x" --data '{"a": 0, "b": "x"}'
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands};
pub use runner::{CommandRunner, run_offline, run_stored};
