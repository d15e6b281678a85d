//! Batch-level tests: ordering, bounded concurrency, isolation, failures.

mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{slug, Harness, MockMedia, MockResearch, MockSession};
use quill_pipeline::{
    generate_keywords, load_work_items, write_keywords, write_results, PipelineEvent,
    PromptBook, Scheduler,
};
use quill_types::{ItemStatus, SessionId, WorkItem};

fn items(keywords: &[&str]) -> Vec<WorkItem> {
    keywords
        .iter()
        .enumerate()
        .map(|(id, k)| WorkItem::new(id, *k))
        .collect()
}

// ---------------------------------------------------------------------------
// Test 1: M items in, M rows out, input order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_yields_one_row_per_item_in_order() {
    let h = Harness::new(
        MockSession::with_images().empty_outline_on("beta"),
        MockResearch::default(),
        MockMedia::default(),
    );
    let batch = items(&["alpha", "beta", "gamma", "delta", "epsilon"]);

    let results = Scheduler::new(2).run(&h.runner, batch).await.unwrap();

    let keywords: Vec<_> = results.iter().map(|r| r.keyword.as_str()).collect();
    assert_eq!(keywords, vec!["alpha", "beta", "gamma", "delta", "epsilon"]);
    assert_eq!(results[1].status, ItemStatus::Failed);
    assert!(results
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .all(|(_, r)| r.status == ItemStatus::Succeeded));

    // written file mirrors the results
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("articles.csv");
    write_results(&path, &results).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 5);
    assert_eq!(&rows[0][0], "alpha");
    assert_eq!(&rows[0][3], "Yes");
    assert_eq!(&rows[1][0], "beta");
    assert_eq!(&rows[1][1], "");
    assert_eq!(&rows[1][2], "");
    assert_eq!(&rows[1][3], "Failed");
    assert_eq!(&rows[4][2], "Article about epsilon.");
}

// ---------------------------------------------------------------------------
// Test 2: never more than N items in flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrency_bound_is_respected() {
    let h = Harness::new(
        MockSession::with_images().with_latency(Duration::from_millis(3)),
        MockResearch::default(),
        MockMedia::default(),
    );
    let mut rx = h.events.subscribe();
    let keywords: Vec<String> = (0..12).map(|i| format!("keyword {i}")).collect();
    let batch: Vec<WorkItem> = keywords
        .iter()
        .enumerate()
        .map(|(id, k)| WorkItem::new(id, k.as_str()))
        .collect();

    let results = Scheduler::new(3).run(&h.runner, batch).await.unwrap();
    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|r| r.is_success()));

    let mut active = 0usize;
    let mut peak = 0usize;
    let mut started = 0usize;
    while let Ok(event) = rx.try_recv() {
        match event {
            PipelineEvent::ItemStarted { .. } => {
                active += 1;
                started += 1;
                peak = peak.max(active);
            }
            PipelineEvent::ItemCompleted { .. } | PipelineEvent::ItemFailed { .. } => {
                active -= 1;
            }
            _ => {}
        }
    }
    assert_eq!(started, 12);
    assert_eq!(active, 0);
    assert!(peak <= 3, "peak concurrency was {peak}");
    assert!(peak >= 1);
}

// ---------------------------------------------------------------------------
// Test 3: items interleaved on one runner keep their own artifacts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_items_do_not_share_artifacts() {
    let h = Harness::new(
        MockSession::with_images().with_latency(Duration::from_millis(2)),
        MockResearch::default(),
        MockMedia::default(),
    );
    let keywords = ["solar panels", "heat pumps"];

    let results = Scheduler::new(2).run(&h.runner, items(&keywords)).await.unwrap();

    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(h.session.sessions_created.load(Ordering::SeqCst), 2);
    assert_eq!(h.media.uploads.load(Ordering::SeqCst), 6);

    // group every posted prompt by the session it went to
    let mut by_session: HashMap<SessionId, Vec<String>> = HashMap::new();
    for (session, prompt) in h.session.posts.lock().unwrap().iter() {
        by_session.entry(session.clone()).or_default().push(prompt.clone());
    }
    assert_eq!(by_session.len(), 2);

    for prompts in by_session.values() {
        let outline = prompts
            .iter()
            .find(|p| p.starts_with("Create a concise outline"))
            .expect("each session gets an outline prompt");
        let compose = prompts
            .iter()
            .find(|p| p.starts_with("Write a detailed"))
            .expect("each session gets a compose prompt");

        let (own, other) = if outline.contains("\"solar panels\"") {
            (slug(keywords[0]), slug(keywords[1]))
        } else {
            (slug(keywords[1]), slug(keywords[0]))
        };
        let own_media = format!("https://media.example/{own}/");
        let own_links = format!("https://shop.example/{own}/");
        for prompt in [outline, compose] {
            assert_eq!(prompt.matches(&own_media).count(), 3, "{prompt}");
            assert!(prompt.contains(&own_links), "{prompt}");
            assert!(!prompt.contains(&format!("/{other}/")), "{prompt}");
        }
    }

    // each row carries only its own keyword
    for result in &results {
        let other = keywords.iter().find(|k| **k != result.keyword).unwrap();
        assert!(result.outline.contains(&result.keyword));
        assert!(!result.outline.contains(other));
        assert!(!result.article.contains(other));
    }
}

// ---------------------------------------------------------------------------
// Test 4: a stuck item fails alone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timeout_fails_only_that_item() {
    let h = Harness::new(
        MockSession::with_images().stuck_on("beta"),
        MockResearch::default(),
        MockMedia::default(),
    );

    let results = Scheduler::new(3)
        .run(&h.runner, items(&["alpha", "beta", "gamma"]))
        .await
        .unwrap();

    assert_eq!(results[0].status, ItemStatus::Succeeded);
    assert_eq!(results[1].status, ItemStatus::Failed);
    assert!(results[1]
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("terminal state"));
    assert_eq!(results[2].status, ItemStatus::Succeeded);
}

// ---------------------------------------------------------------------------
// Test 5: a panicking runner is recorded as failed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panicking_item_is_recorded_as_failed() {
    let h = Harness::new(
        MockSession::with_images(),
        MockResearch::default().panicking_on("beta"),
        MockMedia::default(),
    );

    let results = Scheduler::new(2)
        .run(&h.runner, items(&["alpha", "beta", "gamma"]))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[1].keyword, "beta");
    assert_eq!(results[1].status, ItemStatus::Failed);
    assert!(results[1].outline.is_empty());
    assert!(results[0].is_success());
    assert!(results[2].is_success());
}

// ---------------------------------------------------------------------------
// Test 6: batch events bracket the run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_events_report_totals() {
    let h = Harness::new(
        MockSession::with_images().empty_outline_on("beta"),
        MockResearch::default(),
        MockMedia::default(),
    );
    let mut rx = h.events.subscribe();

    Scheduler::new(5)
        .run(&h.runner, items(&["alpha", "beta"]))
        .await
        .unwrap();

    let mut first = None;
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        if first.is_none() {
            first = Some(event.clone());
        }
        last = Some(event);
    }
    assert!(matches!(
        first,
        Some(PipelineEvent::BatchStarted { total: 2, concurrency: 5 })
    ));
    assert!(matches!(
        last,
        Some(PipelineEvent::BatchCompleted { succeeded: 1, failed: 1, .. })
    ));
}

// ---------------------------------------------------------------------------
// Test 7: empty batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_batch_produces_no_rows() {
    let h = Harness::standard();
    let results = Scheduler::default().run(&h.runner, Vec::new()).await.unwrap();
    assert!(results.is_empty());
}

// ---------------------------------------------------------------------------
// Test 8: generated keywords feed a batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generated_keywords_round_trip_into_batch() {
    let h = Harness::standard();
    let sleeper = common::RecordingSleeper::default();

    let keywords = generate_keywords(
        &*h.session,
        h.runner.settings(),
        &PromptBook::default(),
        &sleeper,
        3,
    )
    .await
    .unwrap();
    assert_eq!(keywords, vec!["solar panels", "heat pumps", "roof tiles"]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keywords.csv");
    write_keywords(&path, &keywords).unwrap();
    let batch = load_work_items(&path).unwrap();

    let results = Scheduler::new(3).run(&h.runner, batch).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.is_success()));
}
