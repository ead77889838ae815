use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use tapline_proxy::exchange::InterceptedExchange;
use tapline_proxy::matching::{OperationKey, UrlMatcher, UrlMatcherSet};
use tapline_proxy::mocks::{MockMatchingEngine, MockRule, RuleSet, StaticRuleSource};

fn create_rules(count: usize) -> Vec<MockRule> {
    (0..count)
        .map(|i| {
            serde_json::from_value(json!({
                "request": {"url": format!("https://api.test/v1.0/endpoint{i}/*")},
                "response": {"statusCode": 200, "body": {"id": i}}
            }))
            .unwrap()
        })
        .collect()
}

fn engine(count: usize) -> MockMatchingEngine {
    let rules = RuleSet::new(create_rules(count), ".").unwrap();
    MockMatchingEngine::new(Arc::new(StaticRuleSource::new(rules)))
}

fn bench_url_matcher(c: &mut Criterion) {
    let mut group = c.benchmark_group("url_matcher");
    group.throughput(Throughput::Elements(1));

    let literal = UrlMatcher::compile("https://api.test/v1.0/me").unwrap();
    let wildcard = UrlMatcher::compile("https://api.test/v1.0/users/*/messages").unwrap();
    let url = "https://api.test/v1.0/users/42/messages";

    group.bench_function("literal", |b| {
        b.iter(|| literal.matches(black_box("https://api.test/v1.0/me")))
    });
    group.bench_function("wildcard", |b| b.iter(|| wildcard.matches(black_box(url))));

    let watch = UrlMatcherSet::compile(&[
        "https://api.test/*",
        "https://other.test/*",
        "!https://api.test/beta/*",
    ])
    .unwrap();
    group.bench_function("watch_set", |b| b.iter(|| watch.matches(black_box(url))));

    group.bench_function("operation_key", |b| {
        b.iter(|| OperationKey::from_url(black_box("GET"), black_box(url)))
    });

    group.finish();
}

fn bench_rule_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_selection");

    for rule_count in [10, 100, 1000].iter() {
        let engine = engine(*rule_count);
        group.throughput(Throughput::Elements(1));

        let first = InterceptedExchange::new("GET", "https://api.test/v1.0/endpoint0/x");
        group.bench_with_input(
            BenchmarkId::new("match_first", rule_count),
            rule_count,
            |b, _| b.iter(|| engine.evaluate(black_box(first.request()))),
        );

        let last = InterceptedExchange::new(
            "GET",
            format!("https://api.test/v1.0/endpoint{}/x", rule_count - 1),
        );
        group.bench_with_input(
            BenchmarkId::new("match_last", rule_count),
            rule_count,
            |b, _| b.iter(|| engine.evaluate(black_box(last.request()))),
        );

        let none = InterceptedExchange::new("GET", "https://api.test/not/found");
        group.bench_with_input(
            BenchmarkId::new("match_none", rule_count),
            rule_count,
            |b, _| b.iter(|| engine.evaluate(black_box(none.request()))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_url_matcher, bench_rule_selection);
criterion_main!(benches);
