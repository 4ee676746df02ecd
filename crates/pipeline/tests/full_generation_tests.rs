mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use relay_core::error::CoreError;
use relay_core::status::FullGenerationStatus;
use relay_core::variant::{ExecutionMode, VariantSelection};
use relay_pipeline::service::{FullGenerationRequest, FullGenerationView};

use common::*;

fn request(variants: &str, mode: ExecutionMode, wait: bool) -> FullGenerationRequest {
    FullGenerationRequest {
        prompt: "a red fox --ar 16:9".into(),
        variants: variants.parse().unwrap(),
        mode,
        wait,
    }
}

async fn wait_for_record(h: &Harness, credential: &str, id: &str) -> FullGenerationView {
    for _ in 0..600 {
        let view = h.service.get_full_generation(credential, id).await.unwrap();
        if view.status.is_terminal() {
            return view;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("full generation {id} did not finish");
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_partial_upscale_failure_still_completes() {
    let h = harness().await;
    h.backend.set_interaction_rule(|token| {
        if token.contains("::3::") {
            status(404)
        } else {
            status(204)
        }
    });

    let started = h
        .service
        .generate_full(USER_KEY, request("all", ExecutionMode::Sequential, false))
        .await
        .unwrap();
    assert_eq!(started.status, FullGenerationStatus::Generating);

    let view = wait_for_record(&h, USER_KEY, &started.full_generation_id).await;
    assert_eq!(view.status, FullGenerationStatus::Completed);

    let indices: Vec<u8> = view.upscaled.iter().map(|o| o.variant_index.get()).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    assert!(!view.upscaled[2].success);
    assert!(view.upscaled[2].error.as_deref().unwrap().contains("404"));
    assert!(view.upscaled[0].image.as_ref().unwrap().url.contains("upscaled_1_"));

    let stats = view.stats.unwrap();
    assert_eq!(stats.total_images, 4);
    assert_eq!(stats.successful_upscales, 3);
    assert_eq!(stats.failed_upscales, 1);
    assert_eq!(h.usage(USER_KEY).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_mode_fills_one_slot_per_variant() {
    let h = harness().await;
    let started = h
        .service
        .generate_full(USER_KEY, request("4,2,2,1", ExecutionMode::Concurrent, false))
        .await
        .unwrap();
    assert_eq!(started.variants, VariantSelection::from_raw(&[1, 2, 4]).unwrap());

    let view = wait_for_record(&h, USER_KEY, &started.full_generation_id).await;
    let indices: Vec<u8> = view.upscaled.iter().map(|o| o.variant_index.get()).collect();
    assert_eq!(indices, vec![1, 2, 4]);
    assert!(view.upscaled.iter().all(|o| o.success));
    assert_eq!(view.stats.unwrap().total_images, 4);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_slots_hold_when_later_variant_finishes_first() {
    let h = harness().await;
    h.backend.delay_reply(1, Duration::from_secs(20));

    let view = h
        .service
        .generate_full(USER_KEY, request("all", ExecutionMode::Concurrent, true))
        .await
        .unwrap();
    assert_eq!(view.status, FullGenerationStatus::Completed);

    let seen = h.backend.replies_seen();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen.last(), Some(&1));
    assert_ne!(seen.first(), Some(&1));

    let indices: Vec<u8> = view.upscaled.iter().map(|o| o.variant_index.get()).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    for outcome in &view.upscaled {
        let url = &outcome.image.as_ref().unwrap().url;
        assert!(url.contains(&format!("upscaled_{}_", outcome.variant_index.get())));
    }
    assert!(view.upscaled[0].finished_at >= view.upscaled[3].finished_at);
    assert_eq!(view.stats.unwrap().successful_upscales, 4);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_rejected_variant_keeps_its_slot() {
    let h = harness().await;
    h.backend.set_interaction_rule(|token| {
        if token.contains("::2::") {
            status(404)
        } else {
            status(204)
        }
    });

    let view = h
        .service
        .generate_full(USER_KEY, request("all", ExecutionMode::Concurrent, true))
        .await
        .unwrap();
    assert_eq!(view.status, FullGenerationStatus::Completed);

    let indices: Vec<u8> = view.upscaled.iter().map(|o| o.variant_index.get()).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    assert!(!view.upscaled[1].success);
    assert!(view.upscaled[1].image.is_none());
    assert!(view.upscaled[1].error.as_deref().unwrap().contains("404"));
    for i in [0, 2, 3] {
        let outcome = &view.upscaled[i];
        assert!(outcome.success);
        let url = &outcome.image.as_ref().unwrap().url;
        assert!(url.contains(&format!("upscaled_{}_", outcome.variant_index.get())));
    }

    let stats = view.stats.unwrap();
    assert_eq!(stats.total_images, 4);
    assert_eq!(stats.successful_upscales, 3);
    assert_eq!(stats.failed_upscales, 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_variants_completes_with_original_only() {
    let h = harness().await;
    let view = h
        .service
        .generate_full(USER_KEY, request("none", ExecutionMode::Sequential, true))
        .await
        .unwrap();

    assert_eq!(view.status, FullGenerationStatus::Completed);
    assert!(view.upscaled.is_empty());
    assert_eq!(view.original.unwrap().url, permanent_url());
    assert_eq!(view.stats.unwrap().total_images, 1);
    assert_eq!(h.backend.interaction_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_generation_failure_fails_record() {
    let h = harness().await;
    h.backend.script_generation(GenerationScript {
        failure: Some("Invalid parameter".into()),
        ..Default::default()
    });

    let view = h
        .service
        .generate_full(USER_KEY, request("all", ExecutionMode::Sequential, true))
        .await
        .unwrap();

    assert_eq!(view.status, FullGenerationStatus::Failed);
    assert!(view.error.as_deref().unwrap().contains("Invalid parameter"));
    assert!(view.upscaled.is_empty());
    assert_eq!(h.backend.interaction_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.usage(USER_KEY).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_returns_finished_record() {
    let h = harness().await;
    let view = h
        .service
        .generate_full(USER_KEY, request("1,2", ExecutionMode::Sequential, true))
        .await
        .unwrap();

    assert_eq!(view.status, FullGenerationStatus::Completed);
    assert_eq!(view.upscaled.len(), 2);
    assert!(view.completed_at.is_some());
    assert!(view.progress.is_none());

    let history = h.store.history_for(USER_KEY).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action(), "generation");
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_live_progress_while_generating() {
    let h = harness().await;
    let started = h
        .service
        .generate_full(USER_KEY, request("1", ExecutionMode::Sequential, false))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    let view = h
        .service
        .get_full_generation(USER_KEY, &started.full_generation_id)
        .await
        .unwrap();
    assert_eq!(view.status, FullGenerationStatus::Generating);
    assert_eq!(view.progress, Some(10));
}

#[tokio::test(start_paused = true)]
async fn test_foreign_record_is_forbidden() {
    let h = harness().await;
    let started = h
        .service
        .generate_full(USER_KEY, request("none", ExecutionMode::Sequential, false))
        .await
        .unwrap();

    assert_matches!(
        h.service.get_full_generation(OTHER_KEY, &started.full_generation_id).await,
        Err(CoreError::Forbidden(_))
    );
    assert!(h
        .service
        .get_full_generation(ADMIN_KEY, &started.full_generation_id)
        .await
        .is_ok());
    assert_matches!(
        h.service.get_full_generation(USER_KEY, "fg_missing").await,
        Err(CoreError::NotFound { entity: "full_generation", .. })
    );
}

#[tokio::test(start_paused = true)]
async fn test_list_full_generations_newest_first() {
    let h = harness().await;
    let first = h
        .service
        .generate_full(USER_KEY, request("none", ExecutionMode::Sequential, true))
        .await
        .unwrap();
    let second = h
        .service
        .generate_full(USER_KEY, request("none", ExecutionMode::Sequential, true))
        .await
        .unwrap();
    h.service
        .generate_full(OTHER_KEY, request("none", ExecutionMode::Sequential, true))
        .await
        .unwrap();

    let listed = h.service.list_full_generations(USER_KEY, None).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].full_generation_id, second.full_generation_id);
    assert_eq!(listed[1].full_generation_id, first.full_generation_id);
    assert_eq!(listed[0].total_images, 1);

    let limited = h.service.list_full_generations(USER_KEY, Some(1)).await.unwrap();
    assert_eq!(limited.len(), 1);
}
