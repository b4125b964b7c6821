//! PostgreSQL 规则存储
//!
//! 每个会话对应一个数据库事务；会话被丢弃而未提交时事务自动回滚。

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument};

use crate::error::{Result, RuleError};
use crate::models::{Attribute, NewAttribute, NewNode, Node, Rule};
use crate::store::{NodeWriter, RuleStorage, StorageSession, TreeReader};

/// PostgreSQL 规则存储
#[derive(Debug, Clone)]
pub struct PgRuleStorage {
    pool: PgPool,
}

impl PgRuleStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// 事务内的存储会话
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TreeReader for PgSession {
    async fn find_rule(&mut self, rule_id: i64) -> Result<Option<Rule>> {
        let rule = sqlx::query_as::<_, Rule>(
            r#"
            SELECT id, name, description, root_node_id, created_at, updated_at
            FROM rules
            WHERE id = $1
            "#,
        )
        .bind(rule_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(rule)
    }

    async fn find_node(&mut self, node_id: i64) -> Result<Option<Node>> {
        let node = sqlx::query_as::<_, Node>(
            r#"
            SELECT id, kind, operator, payload, rule_id, left_child_id, right_child_id
            FROM nodes
            WHERE id = $1
            "#,
        )
        .bind(node_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(node)
    }
}

#[async_trait]
impl NodeWriter for PgSession {
    async fn insert_node(&mut self, node: NewNode) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO nodes (kind, operator, payload, rule_id, left_child_id, right_child_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(node.kind)
        .bind(&node.operator)
        .bind(&node.payload)
        .bind(node.rule_id)
        .bind(node.left_child_id)
        .bind(node.right_child_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl StorageSession for PgSession {
    async fn insert_rule(&mut self, name: &str, description: Option<&str>) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO rules (name, description)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(description)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| RuleError::from_insert(e, name))
    }

    async fn set_root(&mut self, rule_id: i64, root_node_id: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE rules
            SET root_node_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(rule_id)
        .bind(root_node_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RuleError::RuleNotFound(rule_id));
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RuleStorage for PgRuleStorage {
    type Session = PgSession;

    async fn begin(&self) -> Result<PgSession> {
        let tx = self.pool.begin().await?;
        Ok(PgSession { tx })
    }

    async fn list_rules(&self, skip: i64, limit: i64) -> Result<Vec<Rule>> {
        let rules = sqlx::query_as::<_, Rule>(
            r#"
            SELECT id, name, description, root_node_id, created_at, updated_at
            FROM rules
            ORDER BY id ASC
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(skip.max(0))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rules)
    }

    #[instrument(skip(self))]
    async fn update_rule(
        &self,
        rule_id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Rule>> {
        sqlx::query_as::<_, Rule>(
            r#"
            UPDATE rules
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, root_node_id, created_at, updated_at
            "#,
        )
        .bind(rule_id)
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RuleError::from_insert(e, name.unwrap_or_default()))
    }

    #[instrument(skip(self))]
    async fn delete_rule(&self, rule_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rules WHERE id = $1")
            .bind(rule_id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            info!("规则已删除: {}", rule_id);
        }
        Ok(removed)
    }

    async fn declare_attribute(&self, attribute: NewAttribute) -> Result<Attribute> {
        sqlx::query_as::<_, Attribute>(
            r#"
            INSERT INTO attributes (name, data_type, is_active)
            VALUES ($1, $2, $3)
            RETURNING id, name, data_type, is_active
            "#,
        )
        .bind(&attribute.name)
        .bind(attribute.data_type)
        .bind(attribute.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RuleError::from_insert(e, &attribute.name))
    }

    async fn list_attributes(&self) -> Result<Vec<Attribute>> {
        let attributes = sqlx::query_as::<_, Attribute>(
            r#"
            SELECT id, name, data_type, is_active
            FROM attributes
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(attributes)
    }
}
