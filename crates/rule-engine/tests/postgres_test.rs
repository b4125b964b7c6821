//! PostgreSQL 存储测试
//!
//! 需要可用的数据库：
//!
//! ```bash
//! ELIGIBILITY_DATABASE__URL=postgres://... cargo test -p eligibility-rule-engine -- --ignored
//! ```

use eligibility_shared::config::DatabaseConfig;
use eligibility_shared::database::Database;
use rule_engine::{
    AttributeType, EvaluationContext, NewAttribute, PgRuleStorage, RuleError, RuleService,
};
use serde_json::json;

async fn service() -> RuleService<PgRuleStorage> {
    let url = std::env::var("ELIGIBILITY_DATABASE__URL")
        .unwrap_or_else(|_| DatabaseConfig::default().url);
    let config = DatabaseConfig {
        url,
        ..DatabaseConfig::default()
    };
    let database = Database::connect(&config).await.unwrap();
    RuleService::new(PgRuleStorage::new(database.pool().clone()))
}

/// 带进程号与时间戳的唯一名称，避免与已有数据冲突
fn unique(prefix: &str) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_postgres_create_combine_evaluate() {
    let service = service().await;

    let r1 = service
        .create("(age > 30) AND (department = Sales)", &unique("pg-r1"), None)
        .await
        .unwrap();
    let r2 = service
        .create("vip = yes", &unique("pg-r2"), Some("vip only"))
        .await
        .unwrap();
    let r3 = service.combine(&[r1.id, r2.id], &unique("pg-r3")).await.unwrap();

    let context = EvaluationContext::from_value(json!({
        "age": 40,
        "department": "Sales",
        "vip": "yes"
    }))
    .unwrap();
    assert!(service.evaluate(r3.id, &context).await.unwrap());

    let detail = service.describe(r3.id).await.unwrap();
    assert_eq!(
        detail.expression,
        "((age > 30 AND department = Sales) AND vip = yes)"
    );

    // 删除源规则后组合规则仍可评估
    service.delete(r1.id).await.unwrap();
    assert!(service.evaluate(r3.id, &context).await.unwrap());
    service.delete(r2.id).await.unwrap();
    service.delete(r3.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_postgres_name_conflict_rolls_back() {
    let service = service().await;
    let name = unique("pg-dup");

    let rule = service.create("a > 1", &name, None).await.unwrap();
    let err = service.create("b > 1", &name, None).await.unwrap_err();
    assert!(matches!(err, RuleError::NameConflict(_)));

    service.delete(rule.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_postgres_stores_long_operator_token() {
    let service = service().await;
    let word = "x".repeat(200);
    let source = format!("(a > 1 {} b < 2)", word);

    let rule = service.create(&source, &unique("pg-long-op"), None).await.unwrap();
    let detail = service.describe(rule.id).await.unwrap();
    assert_eq!(detail.expression, format!("(a > 1 {} b < 2)", word));

    let context = EvaluationContext::from_value(json!({"a": 2, "b": 1})).unwrap();
    assert!(matches!(
        service.evaluate(rule.id, &context).await,
        Err(RuleError::UnsupportedOperator(_))
    ));
    service.delete(rule.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_postgres_attributes() {
    let service = service().await;
    let name = unique("attr");

    let attribute = service
        .declare_attribute(NewAttribute::new(&name, AttributeType::Float))
        .await
        .unwrap();
    assert!(attribute.is_active);
    assert_eq!(attribute.data_type, AttributeType::Float);

    assert!(matches!(
        service
            .declare_attribute(NewAttribute::new(&name, AttributeType::String))
            .await,
        Err(RuleError::NameConflict(_))
    ));
    assert!(service
        .list_attributes()
        .await
        .unwrap()
        .iter()
        .any(|a| a.name == name));
}
