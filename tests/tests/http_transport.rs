//! Tests for the reqwest transports against an in-process backend.
//!
//! Data flow under test:
//! HttpSink / HttpExperimentBackend → axum router on 127.0.0.1:0

use axum::http::StatusCode;
use chrono::Utc;
use client::{ClientConfig, ExperimentClient, PageConfig, PageSignal};
use delivery::{DeliveryConfig, EventPipeline, EventSink, HttpSink};
use engine_core::error::TransportErrorCode;
use engine_core::{
    Assignment, Error, FileStorage, IdentityStore, ManualClock, StaticPageContext, StaticProbe,
    Storage, TrackedEvent,
};
use experiments::{AssignmentStore, ExperimentBackendConfig, ExperimentSource, HttpExperimentBackend};
use integration_tests::{backend::TestBackend, fixtures};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn delivery_config(backend: &TestBackend) -> DeliveryConfig {
    DeliveryConfig {
        endpoint: backend.base_url.clone(),
        ..Default::default()
    }
}

fn backend_config(backend: &TestBackend) -> ExperimentBackendConfig {
    ExperimentBackendConfig {
        endpoint: backend.base_url.clone(),
        ..Default::default()
    }
}

fn pipeline_over(sink: HttpSink) -> EventPipeline {
    let clock = Arc::new(ManualClock::default());
    let identity = Arc::new(IdentityStore::new(
        Arc::new(engine_core::MemoryStorage::new()),
        clock.clone(),
        Arc::new(StaticProbe(fixtures::device("http-visitor"))),
    ));
    let page = Arc::new(StaticPageContext::new(fixtures::page("/checkout")));
    EventPipeline::builder(Arc::new(sink), identity, page)
        .clock(clock)
        .build()
}

#[tokio::test]
async fn test_sink_posts_camel_case_json() {
    let backend = TestBackend::start().await;
    let pipeline = pipeline_over(HttpSink::new(&delivery_config(&backend)).unwrap());

    pipeline
        .track(
            TrackedEvent::new("conversion")
                .category("experiment")
                .action("purchase")
                .value(99.5)
                .property("sku", "A-1"),
        )
        .await;

    let events = backend.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.event_type, "conversion");
    assert_eq!(event.event_action.as_deref(), Some("purchase"));
    assert_eq!(event.event_value, Some(99.5));
    assert_eq!(event.page_path, "/checkout");
    assert_eq!(event.properties["sku"], "A-1");
    assert_eq!(event.session_id, pipeline.identity().session_id());
}

#[tokio::test]
async fn test_sink_reports_bad_status() {
    let backend = TestBackend::start().await;
    backend.fail_events_with(StatusCode::SERVICE_UNAVAILABLE);
    let sink = HttpSink::new(&delivery_config(&backend)).unwrap();

    let pipeline = pipeline_over(sink.clone());
    let event = engine_core::EnrichedEvent::new(
        TrackedEvent::new("page_view"),
        engine_core::EventContext {
            session_id: pipeline.identity().session_id(),
            fingerprint: pipeline.identity().fingerprint(),
            user_id: None,
            page: fixtures::page("/"),
            device: Default::default(),
            location: Default::default(),
        },
        Utc::now(),
    );

    let err = sink.deliver(&event).await.unwrap_err();
    assert_eq!(err.error_code(), Some(TransportErrorCode::BadStatus.code()));
    assert!(matches!(
        err,
        Error::Transport {
            status: Some(503),
            ..
        }
    ));

    // Through the pipeline the same failure is swallowed.
    pipeline.track(TrackedEvent::new("page_view")).await;
    assert!(backend.events().is_empty());
    assert_eq!(pipeline.inflight(), 0);
}

#[tokio::test]
async fn test_sink_reports_unreachable_endpoint() {
    let backend = TestBackend::start().await;
    let unreachable = backend.base_url.clone();
    drop(backend);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sink = HttpSink::new(&DeliveryConfig {
        endpoint: unreachable,
        request_timeout_ms: 500,
        ..Default::default()
    })
    .unwrap();
    let pipeline = pipeline_over(sink);

    // Must settle without panicking or hanging.
    tokio::time::timeout(WAIT, pipeline.track(TrackedEvent::new("page_view")))
        .await
        .expect("delivery settled");
    assert_eq!(pipeline.inflight(), 0);
}

#[tokio::test]
async fn test_beacon_arrives_without_waiting() {
    let backend = TestBackend::start().await;
    let pipeline = pipeline_over(HttpSink::new(&delivery_config(&backend)).unwrap());

    pipeline.track_on_unload(TrackedEvent::new("page_exit").property("timeOnPage", 1200));

    let events = backend.wait_for_events(1, WAIT).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "page_exit");
    assert_eq!(events[0].properties["timeOnPage"], 1200);
}

#[tokio::test]
async fn test_backend_lists_running_experiments() {
    let backend = TestBackend::start().await;
    let mut paused = fixtures::experiment("exp-old", "old-test", &[("a", 100.0)]);
    paused.status = engine_core::ExperimentStatus::Paused;
    backend.set_experiments(&[fixtures::hero_cta(), paused]);

    let http = HttpExperimentBackend::new(&backend_config(&backend)).unwrap();
    let experiments = http.running_experiments().await.unwrap();

    assert_eq!(experiments.len(), 1);
    assert_eq!(experiments[0], fixtures::hero_cta());
}

#[tokio::test]
async fn test_backend_accepts_wrapped_payload() {
    let backend = TestBackend::start().await;
    backend.set_experiments_body(json!({ "experiments": [fixtures::hero_cta()] }));

    let http = HttpExperimentBackend::new(&backend_config(&backend)).unwrap();
    let experiments = http.running_experiments().await.unwrap();
    assert_eq!(experiments[0].name, "hero-cta");
}

#[tokio::test]
async fn test_backend_rejects_malformed_payload() {
    let backend = TestBackend::start().await;
    backend.set_experiments_body(json!({ "error": "maintenance" }));

    let http = HttpExperimentBackend::new(&backend_config(&backend)).unwrap();
    let err = http.running_experiments().await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));
}

#[tokio::test]
async fn test_assignment_round_trip() {
    let backend = TestBackend::start().await;
    let http = HttpExperimentBackend::new(&backend_config(&backend)).unwrap();

    assert!(http.find("exp-hero", "fp-1").await.unwrap().is_none());

    let assignment = Assignment::new("exp-hero", "exp-hero-control", "sess-1", "fp-1", None, Utc::now());
    http.save(&assignment).await.unwrap();

    let found = http.find("exp-hero", "fp-1").await.unwrap();
    assert_eq!(found, Some(assignment));
    assert!(http.find("exp-hero", "fp-2").await.unwrap().is_none());
}

fn client_config(backend: &TestBackend, path: &str) -> ClientConfig {
    ClientConfig {
        api_base_url: backend.base_url.clone(),
        page: PageConfig {
            url: format!("https://shop.example.com{}", path),
            title: "Shop".into(),
            referrer: None,
            locale: Some("en".into()),
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_client_against_http_backend() {
    let backend = TestBackend::start().await;
    backend.set_experiments(&[fixtures::hero_cta()]);

    let client = ExperimentClient::from_config(
        &client_config(&backend, "/"),
        Arc::new(StaticProbe(fixtures::device("e2e"))),
    )
    .unwrap();
    client.initialize().await;

    let variant = client.get_variant("hero-cta").await.expect("assigned");
    client
        .track_conversion("hero-cta", "signup", Some(1.0), None)
        .await;
    client.handle(PageSignal::BeforeUnload).await;

    let events = backend.wait_for_events(4, WAIT).await;
    let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["page_view", "exposure", "conversion", "page_exit"]);

    let assignments = backend.assignments();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].variant_id, variant.id);
    assert_eq!(assignments[0].fingerprint, client.fingerprint());
}

#[tokio::test]
async fn test_client_restores_assignment_from_backend() {
    let backend = TestBackend::start().await;
    let mut gated = fixtures::hero_cta();
    gated.traffic_allocation_percent = 0.0;
    backend.set_experiments(&[gated]);

    let config = client_config(&backend, "/");
    let probe = Arc::new(StaticProbe(fixtures::device("returning")));
    let client = ExperimentClient::from_config(&config, probe).unwrap();

    // Zero allocation would exclude a new visitor; a stored assignment wins.
    backend.seed_assignment(Assignment::new(
        "exp-hero",
        "exp-hero-variant-b",
        "old-session",
        client.fingerprint(),
        None,
        Utc::now(),
    ));
    client.initialize().await;

    assert_eq!(client.get_variant_name("hero-cta"), None);
    let variant = client.get_variant("hero-cta").await.expect("restored");
    assert_eq!(variant.name, "variant-b");
    assert_eq!(backend.assignments()[0].exposure_count, 2);
}

#[tokio::test]
async fn test_file_storage_keeps_session_between_clients() {
    let backend = TestBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig {
        storage_path: Some(dir.path().join("identity.json")),
        ..client_config(&backend, "/")
    };
    let probe = Arc::new(StaticProbe(fixtures::device("file")));

    let first = ExperimentClient::from_config(&config, probe.clone()).unwrap();
    first.initialize().await;
    let session = first.session_id();

    let second = ExperimentClient::from_config(&config, probe).unwrap();
    second.initialize().await;
    assert_eq!(second.session_id(), session);

    let storage = FileStorage::new(dir.path().join("identity.json"));
    assert!(storage.get(engine_core::SESSION_STORAGE_KEY).unwrap().is_some());
}
