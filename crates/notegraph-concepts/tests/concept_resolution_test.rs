//! Extraction followed by registry and dictionary resolution, with mock
//! backends and in-memory stores.

use std::sync::Arc;

use chrono::Utc;

use notegraph_concepts::{
    record_matches, to_concept_match, ConceptExtractor, ConceptMatcher, ConceptRegistry,
};
use notegraph_core::{
    ConceptDictionary, ConceptStore, ExtractionConfig, ExtractionOptions, ExtractionSource,
    MatchType, RegistryConfig, SkipRules,
};
use notegraph_db::MemoryConceptStore;
use notegraph_inference::mock::{HashingEmbedder, ScriptedGenerator};

const KAFKA_NOTE: &str = "# Kafka consumers\n\nKafka guarantees at-least-once delivery, so \
    consumers will occasionally process the same message twice. Every handler has to tolerate \
    duplicates without changing the outcome.";

const ORDER_NOTE: &str = "# 订单服务\n\n支付回调可能重复到达，订单服务必须保证接口的幂等性，\
    同一个请求无论执行多少次，结果都必须相同。我们通过唯一请求号和状态机来实现这一点，\
    并在数据库层面增加唯一约束，防止重复扣款和重复发货。\
    这是支付系统中最重要的约束之一。";

#[tokio::test]
async fn test_two_notes_resolve_to_one_registered_concept() {
    let generator = ScriptedGenerator::new()
        .with_reply(
            r#"{"concepts":[{"name":"Idempotency","confidence":0.9,"reason":"Repeated requests must produce the same result"}]}"#,
        )
        .with_reply(
            r#"{"concepts":[{"name":"idempotence","confidence":0.85,"reason":"Repeated requests must produce the same results"},{"name":"State Mach"#,
        );
    let extractor = ConceptExtractor::new(
        Arc::new(generator),
        ExtractionConfig::default(),
        SkipRules::default(),
    )
    .unwrap();
    let store = Arc::new(MemoryConceptStore::new());
    let registry = ConceptRegistry::new(
        store.clone(),
        Arc::new(HashingEmbedder::new(512)),
        RegistryConfig::default(),
    )
    .unwrap();

    let mut resolved = Vec::new();
    for (title, note) in [("kafka", KAFKA_NOTE), ("order", ORDER_NOTE)] {
        let outcome = extractor
            .extract(note, Some(title), &ExtractionOptions::default())
            .await;
        assert_eq!(outcome.source, ExtractionSource::Ai);
        for concept in &outcome.concepts {
            let m = registry
                .register_or_match(&concept.name, &concept.reason)
                .await
                .unwrap();
            resolved.push(to_concept_match(concept, &m));
        }
    }

    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0].match_type, MatchType::New);
    assert_eq!(resolved[1].match_type, MatchType::Alias);
    assert!(resolved.iter().all(|m| m.matched_concept == "Idempotency"));

    let record = store.get_concept("Idempotency").await.unwrap().unwrap();
    assert_eq!(record.usage_count, 2);
    assert_eq!(record.link, "[[concepts/Idempotency]]");
}

#[tokio::test]
async fn test_dictionary_path_reuses_known_concepts() {
    let generator = ScriptedGenerator::new()
        .with_reply(r#"["Idempotency"]"#)
        .with_reply(r#"["idempotency", "Payment Callback"]"#);
    let extractor = ConceptExtractor::new(
        Arc::new(generator.clone()),
        ExtractionConfig::default(),
        SkipRules::default(),
    )
    .unwrap();
    let matcher = ConceptMatcher::new();
    let mut dictionary = ConceptDictionary::new();

    let first = extractor
        .extract(KAFKA_NOTE, Some("kafka"), &ExtractionOptions::default())
        .await;
    let matches = matcher.match_concepts(&dictionary, &first.concepts);
    record_matches(&mut dictionary, &matches, &[], Utc::now());

    let options = ExtractionOptions {
        existing_concepts: dictionary.names(),
        ..Default::default()
    };
    let second = extractor.extract(ORDER_NOTE, Some("order"), &options).await;
    let matches = matcher.match_concepts(&dictionary, &second.concepts);
    assert_eq!(matches[0].match_type, MatchType::Exact);
    assert_eq!(matches[1].match_type, MatchType::New);
    record_matches(&mut dictionary, &matches, &[], Utc::now());

    assert_eq!(dictionary.get("Idempotency").unwrap().note_count, 2);
    assert_eq!(dictionary.get("Payment Callback").unwrap().note_count, 1);
    assert!(generator.calls()[1].prompt.contains("Idempotency"));
}
