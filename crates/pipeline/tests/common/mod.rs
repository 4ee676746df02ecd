#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use relay_core::account::{Account, AccountRole};
use relay_core::snowflake;
use relay_core::status::TaskStatus;
use relay_db::MemoryStore;
use relay_discord::api::InteractionResponse;
use relay_discord::backend::{BackendClient, BackendError, GeneratedImage, ProgressSender};
use relay_discord::messages::Message;
use relay_pipeline::config::PipelineConfig;
use relay_pipeline::service::{RelayService, TaskView};

pub const BOT: &str = "936929561302675456";
pub const HASH: &str = "0f4c6d1e-2b3a-4c5d-8e9f-a0b1c2d3e4f5";
pub const USER_KEY: &str = "mj_user_key";
pub const OTHER_KEY: &str = "mj_other_key";
pub const ADMIN_KEY: &str = "mj_admin_key";

pub fn permanent_url() -> String {
    format!("https://cdn.discordapp.com/attachments/100/200/user_grid_{HASH}.png")
}

pub fn ephemeral_url() -> String {
    format!(
        "https://cdn.discordapp.com/ephemeral-attachments/100/200/user_grid_{HASH}.png?ex=1"
    )
}

/// A snowflake created `age` ago.
pub fn message_id_aged(age: chrono::Duration) -> String {
    snowflake::from_timestamp(Utc::now() - age)
}

pub fn fresh_message_id() -> String {
    message_id_aged(chrono::Duration::zero())
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub fn account(credential: &str, limit: i32) -> Account {
    Account {
        credential: credential.into(),
        label: format!("{credential}@example.com"),
        server_id: "100".into(),
        channel_id: "200".into(),
        token: "user-token".into(),
        monthly_limit: limit,
        usage_count: 0,
        role: AccountRole::User,
        blocked: false,
        usage_reset_at: Utc::now(),
    }
}

pub fn admin_account() -> Account {
    Account {
        role: AccountRole::Admin,
        monthly_limit: 0,
        ..account(ADMIN_KEY, 0)
    }
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

/// What a single `fetch_message` call returns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FetchStep {
    Ephemeral,
    Permanent,
    Missing,
    Error,
}

/// How `submit_generation` behaves.
#[derive(Debug, Clone)]
pub struct GenerationScript {
    pub progress: Vec<u8>,
    pub delay: Duration,
    pub ephemeral: bool,
    pub backend_hash: bool,
    pub failure: Option<String>,
}

impl Default for GenerationScript {
    fn default() -> Self {
        Self {
            progress: vec![10, 45, 90],
            delay: Duration::from_secs(5),
            ephemeral: false,
            backend_hash: true,
            failure: None,
        }
    }
}

type InteractionRule = Box<dyn Fn(&str) -> InteractionResponse + Send + Sync>;

/// Scripted backend that records every call.
pub struct FakeBackend {
    pub generation: Mutex<GenerationScript>,
    /// Responses popped in order before `interaction_rule` applies.
    pub interaction_queue: Mutex<VecDeque<InteractionResponse>>,
    pub interaction_rule: Mutex<InteractionRule>,
    pub fetch_queue: Mutex<VecDeque<FetchStep>>,
    pub fetch_default: Mutex<FetchStep>,
    /// Whether accepted upscales produce a reply in recent messages.
    pub replies_enabled: AtomicBool,
    /// How long after acceptance a variant's reply becomes visible.
    pub reply_delays: Mutex<HashMap<u8, Duration>>,

    pub generation_calls: AtomicUsize,
    pub interaction_calls: AtomicUsize,
    pub fetch_message_calls: AtomicUsize,
    pub recent_calls: AtomicUsize,

    /// Every custom id submitted, in order.
    pub submitted_tokens: Mutex<Vec<String>>,
    /// Variants in the order their replies first became visible.
    pub reply_order: Mutex<Vec<u8>>,
    /// `(source message id, variant, accepted at)` for each accepted upscale.
    accepted: Mutex<Vec<(String, u8, Instant)>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            generation: Mutex::new(GenerationScript::default()),
            interaction_queue: Mutex::new(VecDeque::new()),
            interaction_rule: Mutex::new(Box::new(|_| status(204))),
            fetch_queue: Mutex::new(VecDeque::new()),
            fetch_default: Mutex::new(FetchStep::Permanent),
            replies_enabled: AtomicBool::new(true),
            reply_delays: Mutex::new(HashMap::new()),
            generation_calls: AtomicUsize::new(0),
            interaction_calls: AtomicUsize::new(0),
            fetch_message_calls: AtomicUsize::new(0),
            recent_calls: AtomicUsize::new(0),
            submitted_tokens: Mutex::new(Vec::new()),
            reply_order: Mutex::new(Vec::new()),
            accepted: Mutex::new(Vec::new()),
        }
    }
}

pub fn status(code: u16) -> InteractionResponse {
    InteractionResponse {
        status: code,
        body: String::new(),
        retry_after: None,
    }
}

pub fn rate_limited(after: Duration) -> InteractionResponse {
    InteractionResponse {
        status: 429,
        body: r#"{"message": "You are being rate limited."}"#.into(),
        retry_after: Some(after),
    }
}

/// Variant index encoded in `MJ::JOB::<op>::<index>::<hash>...`.
fn token_variant(token: &str) -> Option<u8> {
    token.split("::").nth(3).and_then(|s| s.parse().ok())
}

fn message(id: &str, content: &str, url: &str, reference: Option<&str>) -> Message {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "channel_id": "200",
        "author": { "id": BOT, "username": "Midjourney Bot", "bot": true },
        "content": content,
        "attachments": [{ "url": url }],
        "components": [{
            "type": 1,
            "components": [{ "type": 2, "custom_id": format!("MJ::JOB::variation::1::{HASH}") }]
        }],
        "message_reference": reference.map(|r| serde_json::json!({ "message_id": r })),
    }))
    .expect("valid message json")
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_generation(&self, script: GenerationScript) {
        *self.generation.lock().unwrap() = script;
    }

    pub fn queue_interactions(&self, responses: impl IntoIterator<Item = InteractionResponse>) {
        self.interaction_queue.lock().unwrap().extend(responses);
    }

    pub fn set_interaction_rule(
        &self,
        rule: impl Fn(&str) -> InteractionResponse + Send + Sync + 'static,
    ) {
        *self.interaction_rule.lock().unwrap() = Box::new(rule);
    }

    /// Hold back the reply for `variant` until `delay` after acceptance.
    pub fn delay_reply(&self, variant: u8, delay: Duration) {
        self.reply_delays.lock().unwrap().insert(variant, delay);
    }

    pub fn replies_seen(&self) -> Vec<u8> {
        self.reply_order.lock().unwrap().clone()
    }

    pub fn queue_fetches(&self, steps: impl IntoIterator<Item = FetchStep>) {
        self.fetch_queue.lock().unwrap().extend(steps);
    }

    pub fn set_fetch_default(&self, step: FetchStep) {
        *self.fetch_default.lock().unwrap() = step;
    }

    pub fn tokens(&self) -> Vec<String> {
        self.submitted_tokens.lock().unwrap().clone()
    }

    pub fn network_calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
            + self.interaction_calls.load(Ordering::SeqCst)
            + self.fetch_message_calls.load(Ordering::SeqCst)
            + self.recent_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    fn application_id(&self) -> &str {
        BOT
    }

    async fn submit_generation(
        &self,
        _account: &Account,
        _prompt: &str,
        progress: ProgressSender,
    ) -> Result<GeneratedImage, BackendError> {
        self.generation_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.generation.lock().unwrap().clone();

        let steps = script.progress.len().max(1) as u32;
        for percent in &script.progress {
            tokio::time::sleep(script.delay / steps).await;
            let _ = progress.send(*percent);
        }
        if script.progress.is_empty() {
            tokio::time::sleep(script.delay).await;
        }

        if let Some(error) = script.failure {
            return Err(BackendError::Api { status: 400, body: error });
        }
        Ok(GeneratedImage {
            message_id: fresh_message_id(),
            url: if script.ephemeral { ephemeral_url() } else { permanent_url() },
            content_hash: script.backend_hash.then(|| HASH.to_string()),
            flags: 0,
        })
    }

    async fn submit_interaction(
        &self,
        _account: &Account,
        custom_id: &str,
        message_id: &str,
    ) -> Result<InteractionResponse, BackendError> {
        self.interaction_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted_tokens.lock().unwrap().push(custom_id.to_string());

        let queued = self.interaction_queue.lock().unwrap().pop_front();
        let response = match queued {
            Some(response) => response,
            None => (self.interaction_rule.lock().unwrap())(custom_id),
        };
        if (200..300).contains(&response.status) {
            if let Some(variant) = token_variant(custom_id) {
                self.accepted
                    .lock()
                    .unwrap()
                    .push((message_id.to_string(), variant, Instant::now()));
            }
        }
        Ok(response)
    }

    async fn fetch_recent_messages(
        &self,
        _account: &Account,
        _limit: u8,
    ) -> Result<Vec<Message>, BackendError> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);
        if !self.replies_enabled.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        let delays = self.reply_delays.lock().unwrap().clone();
        let visible: Vec<(String, u8)> = self
            .accepted
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, variant, at)| {
                at.elapsed() >= delays.get(variant).copied().unwrap_or_default()
            })
            .map(|(source, variant, _)| (source.clone(), *variant))
            .collect();

        let mut seen = self.reply_order.lock().unwrap();
        for (_, variant) in &visible {
            if !seen.contains(variant) {
                seen.push(*variant);
            }
        }

        Ok(visible
            .iter()
            .rev()
            .map(|(source, variant)| {
                let id = source.parse::<u64>().unwrap_or(0) + 1000 + u64::from(*variant);
                let url = format!(
                    "https://cdn.discordapp.com/attachments/100/200/upscaled_{variant}_{HASH}.png"
                );
                let content = format!("**a red fox** - Image #{variant} <@1>");
                message(&id.to_string(), &content, &url, Some(source))
            })
            .collect())
    }

    async fn fetch_message(
        &self,
        _account: &Account,
        message_id: &str,
    ) -> Result<Option<Message>, BackendError> {
        self.fetch_message_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.fetch_queue.lock().unwrap().pop_front();
        let step = queued.unwrap_or(*self.fetch_default.lock().unwrap());
        let grid = |url: String| message(message_id, "**a red fox** - <@1>", &url, None);
        match step {
            FetchStep::Ephemeral => Ok(Some(grid(ephemeral_url()))),
            FetchStep::Permanent => Ok(Some(grid(permanent_url()))),
            FetchStep::Missing => Ok(None),
            FetchStep::Error => Err(BackendError::Transport("connection reset".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub store: Arc<MemoryStore>,
    pub service: RelayService,
}

/// Service over `backend` with a user (limit 10), a second user, and an
/// admin account.
pub async fn harness_with(backend: Arc<FakeBackend>, config: PipelineConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account(USER_KEY, 10)).await;
    store.insert_account(account(OTHER_KEY, 10)).await;
    store.insert_account(admin_account()).await;

    let service = RelayService::new(backend.clone(), store.clone(), store.clone(), config);
    Harness { backend, store, service }
}

pub async fn harness() -> Harness {
    harness_with(FakeBackend::new(), PipelineConfig::default()).await
}

impl Harness {
    pub async fn usage(&self, credential: &str) -> i32 {
        use relay_core::store::AccountStore;
        self.store.lookup(credential).await.unwrap().unwrap().usage_count
    }

    /// Poll the task until it is terminal (virtual time).
    pub async fn wait_for_task(&self, credential: &str, task_id: &str) -> TaskView {
        for _ in 0..600 {
            let view = self.service.get_task(credential, task_id).await.unwrap();
            if matches!(view.status, TaskStatus::Completed | TaskStatus::Failed) {
                return view;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("task {task_id} did not finish");
    }
}
