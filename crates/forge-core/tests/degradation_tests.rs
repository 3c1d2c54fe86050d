use forge_artifact::{CancellationToken, InMemoryDurableStore};
use forge_core::{
    PipelineConfig, StageStatus, AUDIENCE_DEFINITION, DEFAULT_TITLE, MARKET_ANALYSIS,
    VISION_ANALYSIS,
};
use forge_test_utils::{
    actions, events, pipeline, request_with_images, FailingTool, HangingTool, ScriptedTool,
    StubTools,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_group_timeout_cancels_slow_stage_only() {
    let tools = StubTools::new();
    let registry = tools.registry();
    let vision = HangingTool::new();
    registry.register(VISION_ANALYSIS, vision.clone());
    let config = PipelineConfig::default().with_group_timeout(Duration::from_secs(5));
    let (pipeline, memory) = pipeline(config, registry, Arc::new(InMemoryDurableStore::new()));

    let outcome = pipeline
        .generate(request_with_images(2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(vision.started(), 1);
    assert_eq!(outcome.degraded, vec!["VisionAnalysis"]);
    assert_eq!(outcome.report.cancelled, 1);
    assert!(outcome.report.elapsed_of("VisionAnalysis").unwrap() >= 5_000);

    // search finished inside the group, so scraping still happened
    assert_eq!(tools.scrape.call_count(), 1);
    // downstream stages saw the empty substitute
    assert_eq!(tools.market.calls()[0]["vision"], json!({}));
    // content refinement still supplies the title
    assert_eq!(outcome.draft.title, "Ceramic Table Lamp with Linen Shade");

    let actions = actions(&memory).await;
    assert!(actions.contains(&"Cancelled_VisionAnalysis".to_string()));
    assert!(actions.contains(&"Completed_ReverseImageSearch".to_string()));
    assert!(!actions.contains(&"Completed_VisionAnalysis".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_second_group_timeout_keeps_first_group_results() {
    let tools = StubTools::new();
    let registry = tools.registry();
    registry.register(AUDIENCE_DEFINITION, HangingTool::new());
    let config = PipelineConfig::default().with_group_timeout(Duration::from_secs(30));
    let (pipeline, _memory) = pipeline(config, registry, Arc::new(InMemoryDurableStore::new()));

    let outcome = pipeline
        .generate(request_with_images(1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.degraded, vec!["AudienceDefinition"]);
    assert!(outcome.draft.audience.is_empty());
    assert_eq!(outcome.draft.title, "Ceramic Table Lamp with Linen Shade");
    assert!(outcome.draft.tags.iter().all(|t| t != "bedside lamp"));
}

#[tokio::test(start_paused = true)]
async fn test_run_cancelled_mid_flight_completes_with_defaults() {
    let tools = StubTools::new();
    let registry = tools.registry();
    registry.register(VISION_ANALYSIS, HangingTool::new());
    let (pipeline, memory) = pipeline(
        PipelineConfig::default(),
        registry,
        Arc::new(InMemoryDurableStore::new()),
    );

    let cancel = CancellationToken::new();
    let _timer = cancel.cancel_after(Duration::from_secs(1));
    let outcome = pipeline
        .generate(request_with_images(2), &cancel)
        .await
        .unwrap();

    // every stage after the cancellation point degraded; search had already finished
    assert_eq!(
        outcome.degraded,
        vec![
            "VisionAnalysis",
            "WebScrape",
            "MarketAnalysis",
            "AudienceDefinition",
            "ContentRefinement",
        ]
    );
    assert_eq!(outcome.draft.title, DEFAULT_TITLE);
    assert_eq!(outcome.draft.images.len(), 2);
    assert_eq!(tools.market.call_count(), 0);
    assert_eq!(tools.content.call_count(), 0);

    // cancelled stages still log their start and exactly one terminal event
    let actions = actions(&memory).await;
    for stage in ["MarketAnalysis", "ContentRefinement"] {
        assert!(actions.contains(&format!("Started_{stage}")));
        assert!(actions.contains(&format!("Cancelled_{stage}")));
    }
    assert_eq!(actions.last().unwrap(), "CompleteProductGeneration");
}

#[tokio::test]
async fn test_failed_market_analysis_falls_back_to_scraped_prices() {
    let tools = StubTools::new().with_content(json!({}));
    let registry = tools.registry();
    registry.register(MARKET_ANALYSIS, FailingTool::new("quota exceeded"));
    let (pipeline, memory) = pipeline(
        PipelineConfig::default(),
        registry,
        Arc::new(InMemoryDurableStore::new()),
    );

    let outcome = pipeline
        .generate(request_with_images(1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.degraded, vec!["MarketAnalysis"]);
    assert_eq!(outcome.report.errored, 1);
    // average of the two scraped prices
    assert!((outcome.draft.price - 54.0).abs() < f64::EPSILON);
    assert_eq!(outcome.draft.currency, "USD");

    let record = outcome
        .journal
        .iter()
        .find(|r| r.name == "MarketAnalysis")
        .unwrap();
    assert_eq!(record.status, StageStatus::Errored);
    assert!(record.error.as_deref().unwrap().contains("quota exceeded"));

    let events = events(&memory).await;
    let errored = events
        .iter()
        .find(|e| e.action == "Errored_MarketAnalysis")
        .unwrap();
    assert!(errored.data["error"].as_str().unwrap().contains("quota exceeded"));
    assert!(actions(&memory)
        .await
        .contains(&"CompleteProductGeneration".to_string()));
}

#[tokio::test]
async fn test_opaque_stage_output_is_passed_on_but_not_assembled() {
    let tools = StubTools::new().with_content(json!("Great lamp, buy it"));
    let (pipeline, _memory) = pipeline(
        PipelineConfig::default(),
        tools.registry(),
        Arc::new(InMemoryDurableStore::new()),
    );

    let outcome = pipeline
        .generate(request_with_images(1), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.is_degraded());
    // vision supplies the title when refined content has no usable shape
    assert_eq!(outcome.draft.title, "Ceramic Table Lamp");
    assert!((outcome.draft.price - 52.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_stage_summaries_are_bounded() {
    let tools = StubTools::new().with_content(json!({}));
    let registry = tools.registry();
    let long = "x".repeat(5_000);
    registry.register(VISION_ANALYSIS, ScriptedTool::new(json!({ "description": long })));
    let mut config = PipelineConfig::default();
    config.summary_limit_chars = 100;
    let (pipeline, memory) = pipeline(config, registry, Arc::new(InMemoryDurableStore::new()));

    let outcome = pipeline
        .generate(request_with_images(1), &CancellationToken::new())
        .await
        .unwrap();

    // the tool's full output still reaches assembly
    assert_eq!(outcome.draft.description.len(), 5_000);

    let events = events(&memory).await;
    let completed = events
        .iter()
        .find(|e| e.action == "Completed_VisionAnalysis")
        .unwrap();
    let summary = completed.data["output"].as_str().unwrap();
    assert!(summary.len() <= 100 + "...".len());
    assert!(summary.ends_with("..."));
}
