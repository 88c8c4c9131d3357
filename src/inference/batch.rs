//! Batch answer generation over a question set
//!
//! Each question is answered independently. Questions fan out over a fixed
//! number of concurrent workers and every answer is appended to the answer
//! file as soon as it is ready, so the file order follows completion order.

use crate::core::provider::ModelRuntime;
use crate::inference::converse::{CompletionSettings, chat_completion};
use crate::models::bedrock::TokenUsage;
use anyhow::{Context, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::{info, warn};

/// Question record: an id plus one or more user turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: Value,
    pub turns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: usize,
    pub turns: Vec<String>,
}

/// Answer record appended to the answer file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: Value,
    pub answer_id: String,
    pub model_id: String,
    pub use_rag: bool,
    pub choices: Vec<Choice>,
    pub tstamp: f64,
    pub latency: f64,
    pub in_token: u64,
    pub out_token: u64,
    pub total_token: u64,
}

/// Read a JSONL question file, skipping blank lines
pub async fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to read question file {}", path.display()))?;
    let mut lines = LinesStream::new(BufReader::new(file).lines()).enumerate();

    let mut questions = Vec::new();
    while let Some((index, line)) = lines.next().await {
        let line = line.with_context(|| format!("Failed to read question file {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let question = serde_json::from_str(&line)
            .with_context(|| format!("Invalid question on line {}", index + 1))?;
        questions.push(question);
    }
    Ok(questions)
}

/// Answer one question `num_choices` times
///
/// Turns accumulate: the prompt for turn `j` is the concatenation of turns
/// `0..=j`. Latency and token counters cover the last choice only.
pub async fn answer_question(
    runtime: &dyn ModelRuntime,
    model_label: &str,
    model_id: &str,
    question: &Question,
    num_choices: usize,
    settings: &CompletionSettings,
) -> Answer {
    let mut choices = Vec::with_capacity(num_choices);
    let mut latency = Duration::ZERO;
    let mut usage = TokenUsage::default();

    for index in 0..num_choices {
        let mut conversation = String::new();
        let mut turns = Vec::with_capacity(question.turns.len());
        latency = Duration::ZERO;
        usage = TokenUsage::default();

        for turn in &question.turns {
            conversation.push_str(turn);
            let completion = chat_completion(runtime, model_id, &conversation, settings).await;
            if completion.is_error() {
                warn!("Question {} got no answer for a turn", question.question_id);
            }
            latency += completion.latency;
            usage += completion.usage;
            turns.push(completion.text);
        }

        choices.push(Choice { index, turns });
    }

    let tstamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    Answer {
        question_id: question.question_id.clone(),
        answer_id: uuid::Uuid::new_v4().simple().to_string(),
        model_id: model_label.to_string(),
        use_rag: false,
        choices,
        tstamp,
        latency: latency.as_secs_f64(),
        in_token: usage.input_tokens,
        out_token: usage.output_tokens,
        total_token: usage.total_tokens,
    }
}

/// Options of a batch run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Name recorded in each answer
    pub model_label: String,
    /// Model id sent to the runtime
    pub model_id: String,
    pub num_choices: usize,
    pub workers: usize,
    pub settings: CompletionSettings,
}

/// Answer every question and append the results to `answer_file`
///
/// Returns the number of answers written.
pub async fn run_batch(
    runtime: Arc<dyn ModelRuntime>,
    questions: Vec<Question>,
    answer_file: &Path,
    options: &BatchOptions,
) -> Result<usize> {
    if let Some(parent) = answer_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(answer_file)
        .await
        .with_context(|| format!("Failed to open {}", answer_file.display()))?;

    let total = questions.len();
    info!(
        "Answering {} question(s) with {} using {} worker(s); output to {}",
        total,
        options.model_id,
        options.workers,
        answer_file.display()
    );

    let mut answers = futures::stream::iter(questions)
        .map(|question| {
            let runtime = runtime.clone();
            async move {
                answer_question(
                    runtime.as_ref(),
                    &options.model_label,
                    &options.model_id,
                    &question,
                    options.num_choices,
                    &options.settings,
                )
                .await
            }
        })
        .buffer_unordered(options.workers.max(1));

    let mut written = 0;
    while let Some(answer) = answers.next().await {
        let mut line = serde_json::to_string(&answer)?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", answer_file.display()))?;
        written += 1;
        info!("Answered {}/{} (question {})", written, total, answer.question_id);
    }
    file.flush().await?;

    Ok(written)
}
