//! End-to-end enumeration runs against the simulated marketplace.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use listings_crawler::sinks::jsonl::DATASET_FILE;
use listings_crawler::{
    ApiEndpoints, BudgetSnapshot, CrawlInput, DetailOptions, EnumerationConfig, FileStateStore,
    JsonlSink, MemorySink, MockMarketplace, Orchestrator, PriceRange, Query, RunState,
    RunSummary, StateStore, WorkKind, WorkUnit,
};
use url::Url;

fn endpoints() -> ApiEndpoints {
    ApiEndpoints::new(Url::parse("https://api.test/v2/").unwrap(), "test-key").unwrap()
}

fn options() -> DetailOptions {
    DetailOptions {
        include_reviews: false,
        location_query: Some("Lisbon, Portugal".into()),
        ..Default::default()
    }
}

fn query(min: u32, max: u32) -> Query {
    Query::new("Lisbon, Portugal", PriceRange::new(min, max).unwrap(), "en-US")
}

async fn crawl(
    market: Arc<MockMarketplace>,
    config: EnumerationConfig,
    range: (u32, u32),
) -> (RunSummary, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Orchestrator::new(market, endpoints(), sink.clone(), config, options());
    orchestrator
        .seed(vec![WorkUnit::pivot(query(range.0, range.1))])
        .await
        .unwrap();
    let summary = Arc::new(orchestrator).run().await.unwrap();
    (summary, sink)
}

fn emitted_ids(sink: &MemorySink) -> Vec<String> {
    sink.listings().into_iter().map(|l| l.airbnb_id).collect()
}

fn assert_unique(ids: &[String]) {
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len(), "listing emitted more than once");
}

#[tokio::test]
async fn test_overflowing_range_is_split_once_and_fully_enumerated() {
    let market = Arc::new(MockMarketplace::new(300).with_spread(1, 450, 0, 1000));
    let (summary, sink) = crawl(market.clone(), EnumerationConfig::default().with_workers(8), (0, 1000)).await;

    assert_eq!(summary.splits, 1);
    assert_eq!(summary.emitted, 450);
    assert_eq!(summary.undercount_ranges, 0);
    assert_eq!(summary.failed_units, 0);

    let ids = emitted_ids(&sink);
    assert_eq!(ids.len(), 450);
    assert_unique(&ids);

    let searches = market.search_calls();
    assert!(searches.contains(&(0, 1000, 0)));
    assert!(searches.contains(&(0, 500, 0)));
    assert!(searches.contains(&(501, 1000, 0)));
}

#[tokio::test]
async fn test_single_price_overflow_reports_undercount() {
    let market = Arc::new(MockMarketplace::new(300).with_listings_at(1, 310, 50));
    let (summary, sink) = crawl(market.clone(), EnumerationConfig::default().with_workers(4), (50, 50)).await;

    assert_eq!(summary.splits, 0);
    assert_eq!(summary.undercount_ranges, 1);
    assert_eq!(summary.undercount_listings, 10);
    assert_eq!(summary.emitted, 300);
    assert_eq!(sink.listings().len(), 300);

    // Six pages, never deeper.
    let offsets: Vec<u32> = market.search_calls().iter().map(|(_, _, offset)| *offset).collect();
    assert_eq!(offsets.len(), 6);
    assert!(offsets.iter().all(|offset| *offset <= 250));
}

#[tokio::test]
async fn test_budget_stops_run_without_overshoot() {
    let market = Arc::new(MockMarketplace::new(300).with_spread(1, 600, 0, 1000));
    let config = EnumerationConfig::default()
        .with_workers(10)
        .with_max_listings(100);
    let (summary, sink) = crawl(market, config, (0, 1000)).await;

    assert!(summary.aborted);
    assert_eq!(summary.emitted, 100);
    let ids = emitted_ids(&sink);
    assert_eq!(ids.len(), 100);
    assert_unique(&ids);
}

#[tokio::test]
async fn test_always_failing_detail_yields_one_failed_record() {
    let market = Arc::new(
        MockMarketplace::new(300)
            .with_spread(1, 20, 0, 100)
            .with_broken_detail(7),
    );
    let (summary, sink) = crawl(market.clone(), EnumerationConfig::default().with_workers(4), (0, 100)).await;

    assert_eq!(summary.failed_units, 1);
    assert_eq!(summary.emitted, 19);

    let failed = sink.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 3);
    assert!(matches!(
        &failed[0].unit.kind,
        WorkKind::DetailFetch { listing, .. } if listing.id == "7"
    ));

    let attempts = market.detail_calls().iter().filter(|id| **id == 7).count();
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn test_flaky_detail_recovers_within_retries() {
    let market = Arc::new(
        MockMarketplace::new(300)
            .with_spread(1, 20, 0, 100)
            .with_flaky_detail(3, 2),
    );
    let (summary, sink) = crawl(market, EnumerationConfig::default().with_workers(4), (0, 100)).await;

    assert_eq!(summary.failed_units, 0);
    assert_eq!(summary.emitted, 20);
    assert!(sink.failed().is_empty());
}

#[tokio::test]
async fn test_listing_seen_by_two_leaves_is_emitted_once() {
    let market = Arc::new(
        MockMarketplace::new(300)
            .with_spread(1, 400, 0, 1000)
            .with_listing(9999, 100)
            .with_listing(9999, 900),
    );
    let (summary, sink) = crawl(market, EnumerationConfig::default().with_workers(6), (0, 1000)).await;

    assert_eq!(summary.splits, 1);
    assert_eq!(summary.emitted, 401);
    assert_eq!(summary.duplicates_skipped, 1);

    let ids = emitted_ids(&sink);
    assert_unique(&ids);
    assert!(ids.contains(&"9999".to_string()));
}

#[tokio::test]
async fn test_unavailable_listing_is_skipped_silently() {
    let market = Arc::new(
        MockMarketplace::new(300)
            .with_spread(1, 10, 0, 100)
            .with_unavailable(4),
    );
    let (summary, sink) = crawl(market.clone(), EnumerationConfig::default().with_workers(2), (0, 100)).await;

    assert_eq!(summary.unavailable, 1);
    assert_eq!(summary.failed_units, 0);
    assert_eq!(summary.emitted, 9);
    assert!(sink.failed().is_empty());
    assert_eq!(market.detail_calls().iter().filter(|id| **id == 4).count(), 1);
}

#[tokio::test]
async fn test_resume_continues_budget_and_skips_seen_listings() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStateStore::new(dir.path().join("state.json")));
    store
        .save(&RunState {
            budget: BudgetSnapshot {
                max_allowed: Some(10),
                emitted_count: 5,
                aborted: false,
            },
            pending: vec![WorkUnit::pivot(query(0, 100))],
            seen_listings: (1..=5).map(|id| id.to_string()).collect(),
            failed_units: 0,
            saved_at: Utc::now(),
        })
        .await
        .unwrap();

    let market = Arc::new(MockMarketplace::new(300).with_listings_at(1, 20, 50));
    let sink = Arc::new(MemorySink::new());
    let mut orchestrator = Orchestrator::new(
        market,
        endpoints(),
        sink.clone(),
        EnumerationConfig::default().with_workers(3).with_max_listings(10),
        options(),
    )
    .with_state_store(store.clone());

    assert!(orchestrator.resume().await.unwrap());
    let summary = Arc::new(orchestrator).run().await.unwrap();

    assert_eq!(summary.emitted, 10);
    assert!(summary.aborted);
    assert_eq!(summary.duplicates_skipped, 5);

    let ids = emitted_ids(&sink);
    assert_eq!(ids.len(), 5);
    assert!(ids.iter().all(|id| id.parse::<u64>().unwrap() > 5));

    let saved = store.load().await.unwrap().unwrap();
    assert_eq!(saved.budget.emitted_count, 10);
    assert!(saved.budget.aborted);
}

#[tokio::test]
async fn test_resume_of_spent_budget_emits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStateStore::new(dir.path().join("state.json")));
    store
        .save(&RunState {
            budget: BudgetSnapshot {
                max_allowed: Some(5),
                emitted_count: 5,
                aborted: true,
            },
            pending: vec![WorkUnit::pivot(query(0, 100))],
            seen_listings: Vec::new(),
            failed_units: 0,
            saved_at: Utc::now(),
        })
        .await
        .unwrap();

    let market = Arc::new(MockMarketplace::new(300).with_listings_at(1, 20, 50));
    let sink = Arc::new(MemorySink::new());
    let mut orchestrator = Orchestrator::new(
        market.clone(),
        endpoints(),
        sink.clone(),
        EnumerationConfig::default().with_max_listings(5),
        options(),
    )
    .with_state_store(store);

    assert!(orchestrator.resume().await.unwrap());
    let summary = Arc::new(orchestrator).run().await.unwrap();

    assert!(summary.aborted);
    assert!(sink.records().is_empty());
    assert!(market.search_calls().is_empty());
}

#[tokio::test]
async fn test_input_driven_run_writes_jsonl_dataset() {
    let input: CrawlInput = serde_json::from_value(serde_json::json!({
        "startUrls": [
            {"url": "https://www.airbnb.com/rooms/11"},
            {"url": "https://www.airbnb.com/rooms/12?check_in=2024-09-01&check_out=2024-09-03"},
            {"url": "https://www.airbnb.com/rooms/11"}
        ],
        "includeReviews": false,
        "maxConcurrency": 2
    }))
    .unwrap();
    input.validate().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(JsonlSink::open(dir.path()).await.unwrap());
    let market = Arc::new(MockMarketplace::new(300).with_listing(11, 10).with_listing(12, 20));

    let orchestrator = Orchestrator::new(
        market.clone(),
        endpoints(),
        sink,
        input.to_enumeration_config(),
        input.to_detail_options().unwrap(),
    );
    orchestrator.seed(input.seed_units().unwrap()).await.unwrap();
    let summary = Arc::new(orchestrator).run().await.unwrap();

    assert_eq!(summary.emitted, 2);
    assert!(market.search_calls().is_empty());

    let contents = std::fs::read_to_string(dir.path().join(DATASET_FILE)).unwrap();
    let records: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["recordType"] == "listing"));
    let mut ids: Vec<&str> = records.iter().map(|r| r["airbnbId"].as_str().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, vec!["11", "12"]);
}
