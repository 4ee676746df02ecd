//! Command dispatch onto the relay service.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use relay_core::error::CoreError;
use relay_pipeline::service::{FullGenerationRequest, RelayService, TaskView};

use crate::cli::{join_prompt, Command, ShellLine};

/// How often `generate` re-reads its task while following it.
const FOLLOW_INTERVAL: Duration = Duration::from_secs(2);

/// Runs commands as one caller.
pub struct Relay {
    service: RelayService,
    credential: String,
}

impl Relay {
    pub fn new(service: RelayService, credential: impl Into<String>) -> Self {
        Self {
            service,
            credential: credential.into(),
        }
    }

    /// Run one command and render its result as JSON.
    pub async fn dispatch(&self, command: Command) -> Result<Value, CoreError> {
        let credential = self.credential.as_str();
        match command {
            Command::Generate { prompt } => {
                let started = self.service.generate(credential, &join_prompt(&prompt)).await?;
                tracing::info!(task_id = %started.task_id, "Following generation");
                let task = self.follow(&started.task_id).await?;
                Ok(to_json(&task))
            }
            Command::Status { task_id } => {
                Ok(to_json(&self.service.get_task(credential, &task_id).await?))
            }
            Command::Tasks => Ok(to_json(&self.service.list_tasks(credential).await?)),
            Command::Upscale { task, index } => {
                Ok(to_json(&self.service.upscale(credential, &task, index).await?))
            }
            Command::Full {
                variants,
                mode,
                wait,
                prompt,
            } => {
                let request = FullGenerationRequest {
                    prompt: join_prompt(&prompt),
                    variants,
                    mode,
                    wait,
                };
                Ok(to_json(&self.service.generate_full(credential, request).await?))
            }
            Command::Show { id } => {
                Ok(to_json(&self.service.get_full_generation(credential, &id).await?))
            }
            Command::List { limit } => {
                let listed = self.service.list_full_generations(credential, limit).await?;
                Ok(to_json(&listed))
            }
            Command::Shell => Err(CoreError::Validation("shell cannot be nested".into())),
        }
    }

    /// Poll a task until it is terminal, logging progress changes.
    async fn follow(&self, task_id: &str) -> Result<TaskView, CoreError> {
        let mut last_progress = None;
        loop {
            let task = self.service.get_task(&self.credential, task_id).await?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            if task.progress != last_progress {
                tracing::info!(
                    task_id,
                    status = task.status.as_str(),
                    progress = ?task.progress,
                    "Generation progress",
                );
                last_progress = task.progress;
            }
            tokio::time::sleep(FOLLOW_INTERVAL).await;
        }
    }

    /// Read commands from stdin until EOF, printing one JSON document per
    /// line. Errors are printed and the loop continues.
    pub async fn run_shell(&self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "exit" | "quit") {
                break;
            }
            match ShellLine::parse_line(line) {
                Ok(command) => println!("{}", render(self.dispatch(command).await)),
                Err(e) => eprintln!("{e}"),
            }
        }
        Ok(())
    }
}

/// Render a command result, mapping errors to their caller-facing body.
pub fn render(result: Result<Value, CoreError>) -> String {
    let value = match result {
        Ok(value) => value,
        Err(e) => json!({ "error": e.to_body() }),
    };
    serde_json::to_string_pretty(&value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}
