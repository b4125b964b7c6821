//! 命令执行器
//!
//! 所有命令都在规则服务上执行。离线命令使用不落盘的内存存储，其余命令连接 PostgreSQL。

use std::io::Write as _;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use eligibility_shared::config::AppConfig;
use eligibility_shared::database::Database;

use crate::cli::commands::Commands;
use crate::lexer::tokenize;
use crate::models::{EvaluationContext, NewAttribute};
use crate::postgres::PgRuleStorage;
use crate::service::{RuleService, RuleUpdate};
use crate::store::{MemoryRuleStorage, RuleStorage};

pub struct CommandRunner {
    config: AppConfig,
}

impl CommandRunner {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// 执行命令，需要时连接数据库
    pub async fn run(&self, command: Commands) -> Result<()> {
        if !command.needs_storage() {
            return self.run_offline(command);
        }

        let database = Database::connect(&self.config.database)
            .await
            .context("连接数据库失败")?;
        let service = RuleService::with_config(
            PgRuleStorage::new(database.pool().clone()),
            &self.config.engine,
        );

        let result = run_stored(&service, command).await;
        database.close().await;
        result
    }

    fn run_offline(&self, command: Commands) -> Result<()> {
        let service = RuleService::with_config(MemoryRuleStorage::new(), &self.config.engine);
        run_offline(&service, command)
    }
}

/// 执行不需要持久化的命令
pub fn run_offline<S: RuleStorage>(service: &RuleService<S>, command: Commands) -> Result<()> {
    match command {
        Commands::Tokenize { rule } => print_json(&tokenize(&rule)),
        Commands::Check { rule, data, trace } => {
            let context = parse_context(&data)?;
            print_json(&service.dry_run(&rule, &context, trace)?)
        }
        other => anyhow::bail!("命令需要数据库: {:?}", other),
    }
}

/// 在给定存储上执行需要持久化的命令
pub async fn run_stored<S: RuleStorage>(service: &RuleService<S>, command: Commands) -> Result<()> {
    match command {
        Commands::Create {
            rule,
            name,
            description,
        } => {
            let rule = service
                .create(&rule, &name, description.as_deref())
                .await?;
            print_json(&rule)
        }
        Commands::Combine { name, rule_ids } => {
            let rule = service.combine(&rule_ids, &name).await?;
            print_json(&rule)
        }
        Commands::Evaluate {
            rule_id,
            data,
            trace,
        } => {
            let context = parse_context(&data)?;
            let result = service.evaluate_detailed(rule_id, &context, trace).await?;
            print_json(&result)
        }
        Commands::Get { rule_id } => print_json(&service.describe(rule_id).await?),
        Commands::List { skip, limit } => print_json(&service.list(skip, limit).await?),
        Commands::Update {
            rule_id,
            name,
            description,
        } => {
            let rule = service
                .update(rule_id, &RuleUpdate { name, description })
                .await?;
            print_json(&rule)
        }
        Commands::Delete { rule_id } => {
            service.delete(rule_id).await?;
            info!(rule_id, "规则已删除");
            Ok(())
        }
        Commands::DeclareAttribute {
            name,
            data_type,
            inactive,
        } => {
            let attribute = NewAttribute {
                is_active: !inactive,
                ..NewAttribute::new(name, data_type)
            };
            print_json(&service.declare_attribute(attribute).await?)
        }
        Commands::Attributes => print_json(&service.list_attributes().await?),
        Commands::Tokenize { .. } | Commands::Check { .. } => {
            anyhow::bail!("离线命令不应在存储上执行")
        }
    }
}

fn parse_context(data: &str) -> Result<EvaluationContext> {
    EvaluationContext::from_json(data).context("--data 必须是 JSON 对象")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
