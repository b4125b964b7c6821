//! 规则存储
//!
//! 核心流程只依赖这里定义的存储接口：插入并返回 ID、按主键查询、提交事务。
//! `MemoryRuleStorage` 使用 DashMap 提供线程安全的内存实现，写入在提交前缓存在会话内。

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info, instrument};

use crate::error::{Result, RuleError};
use crate::models::{Attribute, NewAttribute, NewNode, Node, Rule};

/// 按主键读取规则与节点
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TreeReader: Send {
    async fn find_rule(&mut self, rule_id: i64) -> Result<Option<Rule>>;
    async fn find_node(&mut self, node_id: i64) -> Result<Option<Node>>;
}

/// 写入节点并返回新分配的 ID
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeWriter: Send {
    async fn insert_node(&mut self, node: NewNode) -> Result<i64>;
}

/// 一次工作单元：成功后调用 `commit`，未提交即丢弃的会话不会留下任何写入
#[async_trait]
pub trait StorageSession: TreeReader + NodeWriter {
    async fn insert_rule(&mut self, name: &str, description: Option<&str>) -> Result<i64>;
    async fn set_root(&mut self, rule_id: i64, root_node_id: i64) -> Result<()>;
    async fn commit(self) -> Result<()>;
}

/// 规则存储
#[async_trait]
pub trait RuleStorage: Send + Sync {
    type Session: StorageSession;

    async fn begin(&self) -> Result<Self::Session>;

    async fn list_rules(&self, skip: i64, limit: i64) -> Result<Vec<Rule>>;

    /// 只更新名称与描述，不触碰规则树
    async fn update_rule(
        &self,
        rule_id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Rule>>;

    /// 删除规则记录，其节点保留
    async fn delete_rule(&self, rule_id: i64) -> Result<bool>;

    async fn declare_attribute(&self, attribute: NewAttribute) -> Result<Attribute>;

    async fn list_attributes(&self) -> Result<Vec<Attribute>>;
}

#[derive(Debug, Default)]
struct MemoryTables {
    rules: DashMap<i64, Rule>,
    nodes: DashMap<i64, Node>,
    attributes: DashMap<i64, Attribute>,
    rule_seq: AtomicI64,
    node_seq: AtomicI64,
    attribute_seq: AtomicI64,
    /// 串行化所有写入，保证提交的原子性
    write_lock: Mutex<()>,
}

impl MemoryTables {
    fn name_taken(&self, name: &str, except: i64) -> bool {
        self.rules
            .iter()
            .any(|entry| entry.id != except && entry.name == name)
    }
}

/// 内存规则存储
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleStorage {
    tables: Arc<MemoryTables>,
}

impl MemoryRuleStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已提交的规则数量
    pub fn rule_count(&self) -> usize {
        self.tables.rules.len()
    }

    /// 已提交的节点数量（包括已删除规则遗留的节点）
    pub fn node_count(&self) -> usize {
        self.tables.nodes.len()
    }

    /// 创建时归属于指定规则的节点
    pub fn nodes_of_rule(&self, rule_id: i64) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .tables
            .nodes
            .iter()
            .filter(|entry| entry.rule_id == rule_id)
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }
}

/// 内存存储会话
#[derive(Debug)]
pub struct MemorySession {
    tables: Arc<MemoryTables>,
    rules: BTreeMap<i64, Rule>,
    nodes: BTreeMap<i64, Node>,
}

#[async_trait]
impl TreeReader for MemorySession {
    async fn find_rule(&mut self, rule_id: i64) -> Result<Option<Rule>> {
        if let Some(rule) = self.rules.get(&rule_id) {
            return Ok(Some(rule.clone()));
        }
        Ok(self.tables.rules.get(&rule_id).map(|r| r.value().clone()))
    }

    async fn find_node(&mut self, node_id: i64) -> Result<Option<Node>> {
        if let Some(node) = self.nodes.get(&node_id) {
            return Ok(Some(node.clone()));
        }
        Ok(self.tables.nodes.get(&node_id).map(|n| n.value().clone()))
    }
}

#[async_trait]
impl NodeWriter for MemorySession {
    async fn insert_node(&mut self, node: NewNode) -> Result<i64> {
        let id = self.tables.node_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.nodes.insert(id, node.with_id(id));
        Ok(id)
    }
}

#[async_trait]
impl StorageSession for MemorySession {
    async fn insert_rule(&mut self, name: &str, description: Option<&str>) -> Result<i64> {
        let pending_conflict = self.rules.values().any(|rule| rule.name == name);
        if pending_conflict || self.tables.name_taken(name, 0) {
            return Err(RuleError::NameConflict(name.to_string()));
        }

        let id = self.tables.rule_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        self.rules.insert(
            id,
            Rule {
                id,
                name: name.to_string(),
                description: description.map(str::to_string),
                root_node_id: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn set_root(&mut self, rule_id: i64, root_node_id: i64) -> Result<()> {
        let mut rule = self
            .find_rule(rule_id)
            .await?
            .ok_or(RuleError::RuleNotFound(rule_id))?;
        rule.root_node_id = Some(root_node_id);
        rule.updated_at = Utc::now();
        self.rules.insert(rule_id, rule);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let _guard = self.tables.write_lock.lock();

        for rule in self.rules.values() {
            if self.tables.name_taken(&rule.name, rule.id) {
                return Err(RuleError::NameConflict(rule.name.clone()));
            }
        }

        debug!(
            rules = self.rules.len(),
            nodes = self.nodes.len(),
            "提交内存会话"
        );
        for (id, node) in self.nodes {
            self.tables.nodes.insert(id, node);
        }
        for (id, rule) in self.rules {
            self.tables.rules.insert(id, rule);
        }
        Ok(())
    }
}

#[async_trait]
impl RuleStorage for MemoryRuleStorage {
    type Session = MemorySession;

    async fn begin(&self) -> Result<MemorySession> {
        Ok(MemorySession {
            tables: Arc::clone(&self.tables),
            rules: BTreeMap::new(),
            nodes: BTreeMap::new(),
        })
    }

    async fn list_rules(&self, skip: i64, limit: i64) -> Result<Vec<Rule>> {
        let mut rules: Vec<Rule> = self
            .tables
            .rules
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        rules.sort_by_key(|rule| rule.id);

        Ok(rules
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    #[instrument(skip(self))]
    async fn update_rule(
        &self,
        rule_id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Rule>> {
        let _guard = self.tables.write_lock.lock();

        if let Some(name) = name {
            if self.tables.name_taken(name, rule_id) {
                return Err(RuleError::NameConflict(name.to_string()));
            }
        }

        let Some(mut rule) = self.tables.rules.get_mut(&rule_id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            rule.name = name.to_string();
        }
        if let Some(description) = description {
            rule.description = Some(description.to_string());
        }
        rule.updated_at = Utc::now();
        Ok(Some(rule.clone()))
    }

    #[instrument(skip(self))]
    async fn delete_rule(&self, rule_id: i64) -> Result<bool> {
        let _guard = self.tables.write_lock.lock();
        let removed = self.tables.rules.remove(&rule_id).is_some();
        if removed {
            info!("规则已删除: {}", rule_id);
        }
        Ok(removed)
    }

    async fn declare_attribute(&self, attribute: NewAttribute) -> Result<Attribute> {
        let _guard = self.tables.write_lock.lock();

        if self
            .tables
            .attributes
            .iter()
            .any(|entry| entry.name == attribute.name)
        {
            return Err(RuleError::NameConflict(attribute.name));
        }

        let id = self.tables.attribute_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let attribute = Attribute {
            id,
            name: attribute.name,
            data_type: attribute.data_type,
            is_active: attribute.is_active,
        };
        self.tables.attributes.insert(id, attribute.clone());
        Ok(attribute)
    }

    async fn list_attributes(&self) -> Result<Vec<Attribute>> {
        let mut attributes: Vec<Attribute> = self
            .tables
            .attributes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        attributes.sort_by_key(|attribute| attribute.id);
        Ok(attributes)
    }
}
