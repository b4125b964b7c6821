//! 规则组合
//!
//! 把多条已有规则按给定顺序用 AND 左结合地连接成一条新规则：
//! `((r1 AND r2) AND r3) ...`。默认直接引用源规则的根节点，不复制子树。

use eligibility_shared::config::CombineStrategy;
use tracing::{debug, info};

use crate::error::{Result, RuleError};
use crate::materializer::Materializer;
use crate::models::{Node, Rule};
use crate::operators::LogicalOperator;
use crate::store::StorageSession;
use crate::tree::RuleTree;

/// 组合来源
enum Source {
    /// 源规则的根节点，按引用嫁接
    Shared(Node),
    /// 源规则的完整树，复制为新节点
    Copied(RuleTree),
}

#[derive(Debug, Clone, Default)]
pub struct Combiner {
    strategy: CombineStrategy,
}

impl Combiner {
    pub fn new(strategy: CombineStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> CombineStrategy {
        self.strategy
    }

    /// 组合规则，返回新规则（已设置根节点，未提交）
    ///
    /// 少于两条规则时报 `InvalidCombination`，任一 ID 不存在时报 `RuleNotFound`；
    /// 失败时新规则不会被写入。同一 ID 可以出现多次。
    pub async fn combine<S: StorageSession + ?Sized>(
        &self,
        session: &mut S,
        rule_ids: &[i64],
        name: &str,
    ) -> Result<Rule> {
        if rule_ids.len() < 2 {
            return Err(RuleError::InvalidCombination(format!(
                "至少需要两条规则，实际 {} 条",
                rule_ids.len()
            )));
        }

        let mut sources = Vec::with_capacity(rule_ids.len());
        for &rule_id in rule_ids {
            let source = match self.strategy {
                CombineStrategy::Share => Source::Shared(Self::root_of(session, rule_id).await?),
                CombineStrategy::DeepCopy => Source::Copied(RuleTree::load(session, rule_id).await?),
            };
            sources.push(source);
        }

        let new_rule_id = session.insert_rule(name, None).await?;

        let root_id = {
            let mut materializer = Materializer::new(session, new_rule_id);

            let mut roots = Vec::with_capacity(sources.len());
            for source in &sources {
                let root = match source {
                    Source::Shared(node) => materializer.graft(node),
                    Source::Copied(tree) => materializer.deep_copy(tree).await?,
                };
                roots.push(root);
            }

            let mut roots = roots.into_iter();
            let mut combined = roots.next().ok_or_else(|| {
                RuleError::InvalidCombination("没有可组合的规则".to_string())
            })?;
            for root in roots {
                combined = materializer
                    .join(LogicalOperator::And, combined, root)
                    .await?;
            }

            debug!(
                rule_id = new_rule_id,
                created = materializer.created(),
                "组合节点已写入"
            );
            combined
        };

        session.set_root(new_rule_id, root_id).await?;
        let rule = session
            .find_rule(new_rule_id)
            .await?
            .ok_or(RuleError::RuleNotFound(new_rule_id))?;

        info!(
            rule_id = rule.id,
            sources = ?rule_ids,
            strategy = ?self.strategy,
            "规则已组合"
        );
        Ok(rule)
    }

    async fn root_of<S: StorageSession + ?Sized>(session: &mut S, rule_id: i64) -> Result<Node> {
        let rule = session
            .find_rule(rule_id)
            .await?
            .ok_or(RuleError::RuleNotFound(rule_id))?;
        let root_id = rule.root_node_id.ok_or_else(|| {
            RuleError::CorruptTree(format!("规则 {} 没有根节点", rule_id))
        })?;
        session.find_node(root_id).await?.ok_or_else(|| {
            RuleError::CorruptTree(format!("规则 {} 的根节点 {} 不存在", rule_id, root_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewNode, NodeKind};
    use crate::store::{MemoryRuleStorage, NodeWriter, RuleStorage, TreeReader};

    async fn seed(storage: &MemoryRuleStorage, name: &str, payload: &str) -> (i64, i64) {
        let mut session = storage.begin().await.unwrap();
        let rule_id = session.insert_rule(name, None).await.unwrap();
        let node_id = session
            .insert_node(NewNode::operand(rule_id, payload))
            .await
            .unwrap();
        session.set_root(rule_id, node_id).await.unwrap();
        session.commit().await.unwrap();
        (rule_id, node_id)
    }

    #[tokio::test]
    async fn test_share_grafts_existing_roots() {
        let storage = MemoryRuleStorage::new();
        let (r1, n1) = seed(&storage, "r1", "age > 30").await;
        let (r2, n2) = seed(&storage, "r2", "department = Sales").await;
        let (r3, n3) = seed(&storage, "r3", "salary > 5000").await;

        let mut session = storage.begin().await.unwrap();
        let combined = Combiner::default()
            .combine(&mut session, &[r1, r2, r3], "combined")
            .await
            .unwrap();
        session.commit().await.unwrap();

        assert!(combined.description.is_none());
        let created = storage.nodes_of_rule(combined.id);
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|n| n.kind == NodeKind::Operator));

        // ((r1 AND r2) AND r3)
        let mut reader = storage.begin().await.unwrap();
        let root = reader
            .find_node(combined.root_node_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        let (left, right) = root.children().unwrap();
        assert_eq!(right, n3);
        let inner = reader.find_node(left).await.unwrap().unwrap();
        assert_eq!(inner.children().unwrap(), (n1, n2));
    }

    #[tokio::test]
    async fn test_deep_copy_creates_private_nodes() {
        let storage = MemoryRuleStorage::new();
        let (r1, _) = seed(&storage, "r1", "age > 30").await;
        let (r2, _) = seed(&storage, "r2", "vip = yes").await;

        let mut session = storage.begin().await.unwrap();
        let combined = Combiner::new(CombineStrategy::DeepCopy)
            .combine(&mut session, &[r1, r2], "copied")
            .await
            .unwrap();
        session.commit().await.unwrap();

        // 两个复制的叶子加一个 AND
        assert_eq!(storage.nodes_of_rule(combined.id).len(), 3);
    }

    #[tokio::test]
    async fn test_too_few_rules() {
        let storage = MemoryRuleStorage::new();
        let (r1, _) = seed(&storage, "r1", "age > 30").await;

        for ids in [vec![], vec![r1]] {
            let mut session = storage.begin().await.unwrap();
            let err = Combiner::default()
                .combine(&mut session, &ids, "bad")
                .await
                .unwrap_err();
            assert!(matches!(err, RuleError::InvalidCombination(_)));
        }
    }

    #[tokio::test]
    async fn test_unknown_rule_writes_nothing() {
        let storage = MemoryRuleStorage::new();
        let (r1, _) = seed(&storage, "r1", "age > 30").await;
        let before = storage.node_count();

        let mut session = storage.begin().await.unwrap();
        let err = Combiner::default()
            .combine(&mut session, &[r1, 404], "bad")
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::RuleNotFound(404)));
        drop(session);

        assert_eq!(storage.rule_count(), 1);
        assert_eq!(storage.node_count(), before);
    }

    #[tokio::test]
    async fn test_duplicate_ids_allowed() {
        let storage = MemoryRuleStorage::new();
        let (r1, n1) = seed(&storage, "r1", "age > 30").await;

        let mut session = storage.begin().await.unwrap();
        let combined = Combiner::default()
            .combine(&mut session, &[r1, r1], "twice")
            .await
            .unwrap();

        let root = session
            .find_node(combined.root_node_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root.children().unwrap(), (n1, n1));
    }
}
