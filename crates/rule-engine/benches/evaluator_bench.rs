//! 规则评估性能基准测试
//!
//! 覆盖单条件评估、规则文本编译、不同规模规则树的求值。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rule_engine::{
    Condition, ConditionEvaluator, EvaluationContext, NewNode, Node, RuleCompiler, RuleExecutor,
    RuleTree,
};
use serde_json::json;
use std::hint::black_box;

fn create_context() -> EvaluationContext {
    EvaluationContext::from_value(json!({
        "age": 35,
        "salary": 52000.5,
        "department": "Sales",
        "vip": true
    }))
    .unwrap()
}

/// 生成 n 个条件用 AND/OR 交替连接的规则文本
fn create_rule_text(conditions: usize) -> String {
    (0..conditions)
        .map(|i| match i % 3 {
            0 => format!("(age > {})", i),
            1 => "(department = Sales)".to_string(),
            _ => format!("(salary < {})", 100_000 + i),
        })
        .enumerate()
        .fold(String::new(), |mut acc, (i, cond)| {
            if i > 0 {
                acc.push_str(if i % 2 == 0 { " OR " } else { " AND " });
            }
            acc.push_str(&cond);
            acc
        })
}

/// 左深的持久化规则树：每个叶子都是同一条件
fn create_tree(conditions: usize) -> RuleTree {
    let mut nodes: Vec<Node> = Vec::with_capacity(conditions * 2);
    let mut next_id = 1;
    let mut root = next_id;
    nodes.push(NewNode::operand(1, "age > 30").with_id(next_id));

    for _ in 1..conditions {
        next_id += 1;
        let leaf = next_id;
        nodes.push(NewNode::operand(1, "department = Sales").with_id(leaf));
        next_id += 1;
        nodes.push(NewNode::operator(1, "AND", root, leaf).with_id(next_id));
        root = next_id;
    }

    RuleTree::from_nodes(1, root, nodes)
}

fn bench_condition(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition");
    let context = create_context();

    for payload in ["age > 30", "salary < 60000", "department = Sales", "vip > 0"] {
        let condition = Condition::from_payload(payload).unwrap();
        group.bench_function(payload, |b| {
            b.iter(|| ConditionEvaluator::evaluate(black_box(&condition), black_box(&context)))
        });
    }

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    // 200 个条件时 OR 链高度约为 100，超过默认上限
    let compiler = RuleCompiler::with_max_depth(256);

    for size in [1, 10, 50, 200] {
        let text = create_rule_text(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| compiler.compile(black_box(text)))
        });
    }

    group.finish();
}

fn bench_execute_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_tree");
    let context = create_context();
    let executor = RuleExecutor::new();

    for size in [1, 10, 100, 1000] {
        let tree = create_tree(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &tree, |b, tree| {
            b.iter(|| executor.execute_tree(black_box(tree), black_box(&context)))
        });
    }

    group.finish();
}

fn bench_trace_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace_overhead");
    let context = create_context();
    let expr = RuleCompiler::new().compile(&create_rule_text(20)).unwrap();

    group.bench_function("without_trace", |b| {
        let executor = RuleExecutor::new();
        b.iter(|| executor.execute_expr(black_box(&expr), black_box(&context)))
    });
    group.bench_function("with_trace", |b| {
        let executor = RuleExecutor::new().with_trace();
        b.iter(|| executor.execute_expr(black_box(&expr), black_box(&context)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_condition,
    bench_compile,
    bench_execute_tree,
    bench_trace_overhead
);
criterion_main!(benches);
