//! CLI 命令定义

use clap::{Parser, Subcommand};

use crate::models::AttributeType;

/// 资格规则引擎命令行工具
#[derive(Parser, Debug)]
#[command(name = "rule-engine")]
#[command(version, about = "布尔资格规则的解析、存储、组合与评估")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别，覆盖配置文件 (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// 命令结束后把 Prometheus 格式的指标快照写到 stderr
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 解析规则文本并保存
    Create {
        /// 规则文本，如 "(age > 30) AND (department = Sales)"
        rule: String,

        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// 按顺序用 AND 组合已有规则
    Combine {
        #[arg(short, long)]
        name: String,

        #[arg(required = true)]
        rule_ids: Vec<i64>,
    },

    /// 对已保存的规则求值
    Evaluate {
        rule_id: i64,

        /// JSON 对象形式的待评估数据
        #[arg(short, long)]
        data: String,

        /// 输出评估追踪
        #[arg(long)]
        trace: bool,
    },

    /// 查看规则及其表达式
    Get { rule_id: i64 },

    /// 分页列出规则
    List {
        #[arg(long, default_value = "0")]
        skip: i64,

        #[arg(long, default_value = "100")]
        limit: i64,
    },

    /// 更新规则名称或描述
    Update {
        rule_id: i64,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// 删除规则
    Delete { rule_id: i64 },

    /// 登记属性
    DeclareAttribute {
        name: String,

        /// string, integer, float, boolean
        data_type: AttributeType,

        #[arg(long)]
        inactive: bool,
    },

    /// 列出已登记的属性
    Attributes,

    /// 输出规则文本的 token 序列（不访问数据库）
    Tokenize { rule: String },

    /// 解析并直接对规则文本求值（不访问数据库）
    Check {
        rule: String,

        #[arg(short, long)]
        data: String,

        #[arg(long)]
        trace: bool,
    },
}

impl Commands {
    /// 是否需要连接数据库
    pub fn needs_storage(&self) -> bool {
        !matches!(self, Self::Tokenize { .. } | Self::Check { .. })
    }
}
