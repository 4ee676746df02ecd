mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use relay_core::account::Account;
use relay_core::error::CoreError;
use relay_core::records::HistoryEntry;
use relay_core::status::TaskStatus;
use relay_pipeline::config::PipelineConfig;

use common::*;

// ---------------------------------------------------------------------------
// Authentication and quota
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_unknown_or_empty_credential_is_unauthorized() {
    let h = harness().await;
    assert_matches!(h.service.generate("", "a red fox").await, Err(CoreError::Unauthorized(_)));
    assert_matches!(h.service.generate("nope", "a red fox").await, Err(CoreError::Unauthorized(_)));
    assert_eq!(h.backend.network_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_blocked_account_is_forbidden() {
    let h = harness().await;
    h.store
        .insert_account(Account {
            blocked: true,
            ..account("mj_blocked", 10)
        })
        .await;

    assert_matches!(
        h.service.generate("mj_blocked", "a red fox").await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(h.service.list_tasks("mj_blocked").await, Err(CoreError::Forbidden(_)));
}

#[tokio::test(start_paused = true)]
async fn test_empty_prompt_is_rejected_before_submission() {
    let h = harness().await;
    assert_matches!(h.service.generate(USER_KEY, "   ").await, Err(CoreError::Validation(_)));
    assert!(h.service.list_tasks(USER_KEY).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_quota_exceeded_after_limit_reached() {
    let h = harness().await;
    h.store.insert_account(account("mj_single", 1)).await;

    let first = h.service.generate("mj_single", "a red fox").await.unwrap();
    h.wait_for_task("mj_single", &first.task_id).await;
    assert_eq!(h.usage("mj_single").await, 1);

    let err = h.service.generate("mj_single", "a blue fox").await.unwrap_err();
    assert_matches!(err, CoreError::QuotaExceeded { limit: 1, used: 1 });
    assert_eq!(err.to_body().kind, "QUOTA_EXCEEDED");
    assert_eq!(h.backend.generation_calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Generation lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_generate_returns_pending_before_any_usage() {
    let h = harness().await;
    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();

    assert_eq!(response.status, TaskStatus::Pending);
    assert_eq!(h.usage(USER_KEY).await, 0);

    let view = h.wait_for_task(USER_KEY, &response.task_id).await;
    assert_eq!(view.status, TaskStatus::Completed);
    assert_eq!(view.progress, Some(100));
    assert_eq!(view.image_url, Some(permanent_url()));
    assert_eq!(view.content_hash.as_deref(), Some(HASH));
    assert_eq!(h.usage(USER_KEY).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_visible_while_processing() {
    let h = harness().await;
    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    let view = h.service.get_task(USER_KEY, &response.task_id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Processing);
    assert_eq!(view.progress, Some(10));
}

#[tokio::test(start_paused = true)]
async fn test_ephemeral_result_is_promoted() {
    let h = harness().await;
    h.backend.script_generation(GenerationScript {
        ephemeral: true,
        ..Default::default()
    });
    h.backend.queue_fetches([FetchStep::Ephemeral, FetchStep::Ephemeral]);

    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();
    let view = h.wait_for_task(USER_KEY, &response.task_id).await;

    assert_eq!(view.status, TaskStatus::Completed);
    assert_eq!(view.image_url, Some(permanent_url()));
    assert_eq!(h.backend.fetch_message_calls.load(Ordering::SeqCst), 3);

    let history = h.store.history_for(USER_KEY).await;
    assert_eq!(history.len(), 1);
    assert_matches!(
        &history[0],
        HistoryEntry::Generation { image_url, .. } if *image_url == permanent_url()
    );
}

#[tokio::test(start_paused = true)]
async fn test_resolution_budget_keeps_ephemeral_url() {
    let backend = FakeBackend::new();
    backend.script_generation(GenerationScript {
        ephemeral: true,
        ..Default::default()
    });
    backend.set_fetch_default(FetchStep::Ephemeral);
    let config = PipelineConfig {
        resolution_budget: Duration::from_secs(5),
        ..PipelineConfig::default()
    };
    let h = harness_with(backend, config).await;

    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();
    let view = h.wait_for_task(USER_KEY, &response.task_id).await;

    assert_eq!(view.status, TaskStatus::Completed);
    assert_eq!(view.image_url, Some(ephemeral_url()));
    assert_eq!(view.content_hash.as_deref(), Some(HASH));
    assert!(h.backend.fetch_message_calls.load(Ordering::SeqCst) <= 3);
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_is_recorded_verbatim() {
    let h = harness().await;
    h.backend.script_generation(GenerationScript {
        failure: Some("Banned prompt detected".into()),
        ..Default::default()
    });

    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();
    let view = h.wait_for_task(USER_KEY, &response.task_id).await;

    assert_eq!(view.status, TaskStatus::Failed);
    assert!(view.error.as_deref().unwrap().contains("Banned prompt detected"));
    assert!(view.image_url.is_none());
    assert_eq!(h.usage(USER_KEY).await, 0);
    assert!(h.store.history_for(USER_KEY).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_terminal_task_ignores_late_progress() {
    let h = harness().await;
    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();
    h.wait_for_task(USER_KEY, &response.task_id).await;

    let registry = h.service.registry();
    assert!(!registry.update_progress(&response.task_id, 5).await);
    assert_matches!(
        registry.fail(&response.task_id, "late").await,
        Err(CoreError::Conflict(_))
    );

    let view = h.service.get_task(USER_KEY, &response.task_id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Completed);
    assert_eq!(view.progress, Some(100));
}

#[tokio::test(start_paused = true)]
async fn test_admin_usage_is_not_counted() {
    let h = harness().await;
    let response = h.service.generate(ADMIN_KEY, "a red fox").await.unwrap();
    h.wait_for_task(ADMIN_KEY, &response.task_id).await;

    assert_eq!(h.usage(ADMIN_KEY).await, 0);
}

// ---------------------------------------------------------------------------
// Visibility
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_foreign_task_is_forbidden_for_users_visible_to_admins() {
    let h = harness().await;
    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();

    assert_matches!(
        h.service.get_task(OTHER_KEY, &response.task_id).await,
        Err(CoreError::Forbidden(_))
    );
    assert!(h.service.get_task(ADMIN_KEY, &response.task_id).await.is_ok());
    assert_matches!(
        h.service.get_task(USER_KEY, "missing").await,
        Err(CoreError::NotFound { entity: "task", .. })
    );
}

#[tokio::test(start_paused = true)]
async fn test_list_tasks_is_scoped() {
    let h = harness().await;
    h.service.generate(USER_KEY, "a red fox").await.unwrap();
    h.service.generate(USER_KEY, "a blue fox").await.unwrap();
    h.service.generate(OTHER_KEY, "a green fox").await.unwrap();

    assert_eq!(h.service.list_tasks(USER_KEY).await.unwrap().len(), 2);
    assert_eq!(h.service.list_tasks(OTHER_KEY).await.unwrap().len(), 1);
    assert_eq!(h.service.list_tasks(ADMIN_KEY).await.unwrap().len(), 3);
}

// ---------------------------------------------------------------------------
// Upscale
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_upscale_completed_task() {
    let h = harness().await;
    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();
    let task = h.wait_for_task(USER_KEY, &response.task_id).await;

    let view = h.service.upscale(USER_KEY, &response.task_id, 2).await.unwrap();
    assert_eq!(view.variant_index.get(), 2);
    assert!(view.image_url.contains("upscaled_2_"));
    assert_eq!(view.source_task_id, response.task_id);

    let history = h.store.history_for(USER_KEY).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].action(), "upscale");
    assert_eq!(history[1].task_id(), task.task_id);
    assert_matches!(
        &history[1],
        HistoryEntry::Upscale { source_message_id, external_message_id, .. }
            if Some(source_message_id) == task.external_message_id.as_ref()
                && source_message_id != external_message_id
    );
}

#[tokio::test(start_paused = true)]
async fn test_upscale_pending_task_is_conflict() {
    let h = harness().await;
    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();

    assert_matches!(
        h.service.upscale(USER_KEY, &response.task_id, 1).await,
        Err(CoreError::Conflict(_))
    );
    assert_eq!(h.backend.interaction_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_upscale_rejects_out_of_range_index() {
    let h = harness().await;
    assert_matches!(h.service.upscale(USER_KEY, "task", 5).await, Err(CoreError::Validation(_)));
    assert_matches!(h.service.upscale(USER_KEY, "task", 0).await, Err(CoreError::Validation(_)));
}

#[tokio::test(start_paused = true)]
async fn test_upscale_falls_back_to_history_after_eviction() {
    let h = harness().await;
    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();
    let task = h.wait_for_task(USER_KEY, &response.task_id).await;

    let evicted = h
        .service
        .registry()
        .evict_expired(Utc::now() + chrono::Duration::hours(1))
        .await;
    assert_eq!(evicted, 1);

    let by_task = h.service.upscale(USER_KEY, &response.task_id, 1).await.unwrap();
    assert!(by_task.image_url.contains("upscaled_1_"));

    let message_id = task.external_message_id.unwrap();
    let by_message = h.service.upscale(USER_KEY, &message_id, 3).await.unwrap();
    assert!(by_message.image_url.contains("upscaled_3_"));
}

#[tokio::test(start_paused = true)]
async fn test_upscale_unknown_generation_is_not_found() {
    let h = harness().await;
    assert_matches!(
        h.service.upscale(USER_KEY, "never-existed", 1).await,
        Err(CoreError::NotFound { entity: "generation", .. })
    );
}

#[tokio::test(start_paused = true)]
async fn test_upscale_other_users_task_is_forbidden() {
    let h = harness().await;
    let response = h.service.generate(USER_KEY, "a red fox").await.unwrap();
    h.wait_for_task(USER_KEY, &response.task_id).await;

    assert_matches!(
        h.service.upscale(OTHER_KEY, &response.task_id, 1).await,
        Err(CoreError::Forbidden(_))
    );
}
