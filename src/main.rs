//! Bedrock workbench
//!
//! Command-line tooling around Amazon Bedrock: dataset validation and
//! conversion, fine-tuning jobs, batch and single-prompt inference, image
//! and video generation, agents, knowledge bases, guardrails, and an HTTP
//! host for agent action groups.

mod agents;
mod api;
mod conversion;
mod core;
mod inference;
mod jobs;
mod knowledge;
mod models;
mod storage;
mod validation;

use crate::agents::actions::customer_service::{CustomerService, InMemoryShoeStore};
use crate::agents::actions::{ActionRouter, restaurant_booking};
use crate::agents::runtime::{invoke_agent, text_with_parents};
use crate::agents::tools::{ToolBox, run_tool_loop};
use crate::api::endpoints::{AppState, create_router};
use crate::core::client::BedrockClient;
use crate::core::client_cache::ClientCache;
use crate::core::config::{API_KEY_ENV, Config};
use crate::core::logging::init_logging;
use crate::inference::batch::{BatchOptions, load_questions, run_batch};
use crate::inference::converse::{CompletionSettings, chat_completion};
use crate::inference::guardrail::{GuardrailSource, apply_guardrail, converse_with_guardrail};
use crate::inference::image::{ImageGenerationConfig, TextToImageRequest, generate_images, save_image};
use crate::jobs::customization::FineTuneJob;
use crate::jobs::poller::Poller;
use crate::knowledge::base;
use crate::models::bedrock::GuardrailConfig;
use crate::storage::{HttpObjectStore, LocalObjectStore, ObjectStore};
use crate::validation::{DatasetValidator, ModelRegistry};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "bedrock-workbench", version, about = "Amazon Bedrock workbench")]
struct Cli {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a fine-tuning dataset for a model
    Validate {
        #[arg(long)]
        model: String,
        #[arg(long)]
        train: PathBuf,
        #[arg(long)]
        validation: Option<PathBuf>,
    },
    /// Convert datasets between formats
    #[command(subcommand)]
    Convert(ConvertCommand),
    /// Fine-tuning jobs
    #[command(subcommand)]
    Finetune(FinetuneCommand),
    /// Buy provisioned throughput for a model
    Provision {
        #[arg(long)]
        model_id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 1)]
        units: u32,
    },
    /// List foundation models
    Models,
    /// Answer a question file with a model
    Answer {
        /// Model alias from the config file, or a model id
        #[arg(long)]
        model: String,
        #[arg(long)]
        questions: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 1)]
        num_choices: usize,
        /// Defaults to the configured worker count
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Send one prompt and print the completion
    Prompt {
        #[arg(long)]
        model: Option<String>,
        prompt: String,
    },
    /// Answer with prompt-based tool use over the table-booking functions
    Tools {
        #[arg(long)]
        model: Option<String>,
        /// Model turns allowed before giving up
        #[arg(long, default_value_t = 5)]
        max_turns: usize,
        input: String,
    },
    /// Generate images from a text prompt
    Image {
        #[arg(long, default_value = "amazon.nova-canvas-v1:0")]
        model: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        negative: Option<String>,
        #[arg(long, default_value_t = 1)]
        count: u32,
        #[arg(long, default_value_t = 0)]
        seed: u32,
        #[arg(long, default_value = "images")]
        output_dir: PathBuf,
    },
    /// Video generation jobs
    #[command(subcommand)]
    Video(VideoCommand),
    /// Ask a Bedrock agent a question
    Agent {
        #[arg(long)]
        agent_id: String,
        #[arg(long)]
        alias_id: String,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        trace: bool,
        input: String,
    },
    /// Knowledge bases
    #[command(subcommand)]
    Kb(KbCommand),
    /// Check text against a guardrail
    Guardrail {
        #[arg(long)]
        id: String,
        #[arg(long, default_value = "DRAFT")]
        version: String,
        /// Screen the text as model output instead of user input
        #[arg(long)]
        output: bool,
        /// Run the text through this model with the guardrail attached
        #[arg(long)]
        model: Option<String>,
        text: String,
    },
    /// Serve the action-group handlers over HTTP
    Serve {
        /// JSON seed (customers, inventory, orders) for the shoe store
        #[arg(long)]
        shoe_store: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConvertCommand {
    /// JSON array file to JSON Lines
    JsonToJsonl { input: PathBuf, output: PathBuf },
    /// Prompt/completion JSONL to conversation JSONL
    PromptCompletion {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value = "prompt")]
        prompt_column: String,
        #[arg(long, default_value = "completion")]
        completion_column: String,
        #[arg(long)]
        system: Option<String>,
    },
}

#[derive(Subcommand)]
enum FinetuneCommand {
    /// Submit a fine-tuning job
    Submit {
        #[arg(long)]
        job_name: String,
        #[arg(long)]
        model_name: String,
        #[arg(long)]
        train_uri: String,
        #[arg(long)]
        validation_uri: Option<String>,
        #[arg(long)]
        output_uri: String,
        /// Defaults to the configured base model
        #[arg(long)]
        base_model: Option<String>,
        /// Defaults to the configured role
        #[arg(long)]
        role_arn: Option<String>,
        /// Wait for the job to finish
        #[arg(long)]
        wait: bool,
    },
    /// Print a job's status
    Status { job_arn: String },
    /// Wait until a job finishes
    Wait { job_arn: String },
}

#[derive(Subcommand)]
enum VideoCommand {
    /// Start a text-to-video job
    Submit {
        #[arg(long, default_value = "amazon.nova-reel-v1:0")]
        model: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        output_uri: String,
        #[arg(long, default_value_t = 6)]
        duration: u32,
        #[arg(long, default_value_t = 0)]
        seed: u32,
        /// Local folder for the job record
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Wait until one job completes or fails
    Wait { invocation_arn: String },
    /// Save finished jobs and follow running ones until they finish
    Monitor {
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Only jobs submitted after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Read job outputs from a local mirror of the output buckets
        #[arg(long)]
        bucket_root: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum KbCommand {
    /// Create (or reuse) a knowledge base and ingest its data source
    Sync {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        role_arn: String,
        #[arg(long)]
        collection_arn: String,
        #[arg(long)]
        index_name: String,
        #[arg(long)]
        bucket: String,
        #[arg(long, default_value = base::DEFAULT_EMBEDDING_MODEL)]
        embedding_model: String,
    },
    /// Vector search over a knowledge base
    Retrieve {
        #[arg(long)]
        kb_id: String,
        #[arg(long, default_value_t = 5)]
        results: u32,
        query: String,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration Error: {e:#}");
            std::process::exit(1);
        }
    };

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    if let Err(e) = run(cli.command, config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn remote_client(config: &Config) -> Result<Arc<BedrockClient>> {
    if !config.validate_api_key() {
        bail!("No Bedrock API key configured (set aws.api_key or {API_KEY_ENV})");
    }
    ClientCache::global().client(config).await
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Validate {
            model,
            train,
            validation,
        } => validate(&model, &train, validation.as_deref()),
        Command::Convert(command) => convert(command),
        Command::Finetune(command) => finetune(command, &config).await,
        Command::Provision {
            model_id,
            name,
            units,
        } => {
            let client = remote_client(&config).await?;
            let arn =
                jobs::customization::create_provisioned_throughput(&client, &model_id, &name, units)
                    .await?;
            println!("{arn}");
            Ok(())
        }
        Command::Models => {
            let client = remote_client(&config).await?;
            for model in jobs::customization::list_foundation_models(&client).await? {
                println!(
                    "{}\t{}\t{}",
                    model.model_id,
                    model.provider_name.unwrap_or_default(),
                    model.customizations_supported.join(",")
                );
            }
            Ok(())
        }
        Command::Answer {
            model,
            questions,
            output,
            num_choices,
            workers,
        } => {
            let client = Arc::new(remote_client(&config).await?.with_max_retries(0));
            let questions = load_questions(&questions).await?;
            let options = BatchOptions {
                model_id: config.resolve_model(&model),
                model_label: model,
                num_choices: num_choices.max(1),
                workers: workers.unwrap_or(config.workers),
                settings: CompletionSettings::from_config(&config),
            };
            let written = run_batch(client, questions, &output, &options).await?;
            info!("Wrote {} answer(s) to {}", written, output.display());
            Ok(())
        }
        Command::Prompt { model, prompt } => {
            let client = remote_client(&config).await?.with_max_retries(0);
            let cache = ClientCache::global();
            cache
                .set_model_id(model.as_deref().map(|m| config.resolve_model(m)).as_deref())
                .await;
            let model_id = cache.model_id().await;

            let completion = chat_completion(
                &client,
                &model_id,
                &prompt,
                &CompletionSettings::from_config(&config),
            )
            .await;
            if completion.is_error() {
                bail!("Every attempt to call {model_id} failed");
            }
            println!("{}", completion.text);
            info!(
                "{} ms, {} input / {} output tokens",
                completion.latency.as_millis(),
                completion.usage.input_tokens,
                completion.usage.output_tokens
            );
            Ok(())
        }
        Command::Tools {
            model,
            max_turns,
            input,
        } => {
            let client = remote_client(&config).await?;
            let cache = ClientCache::global();
            cache
                .set_model_id(model.as_deref().map(|m| config.resolve_model(m)).as_deref())
                .await;
            let model_id = cache.model_id().await;

            let toolbox = ToolBox::new(ActionRouter::with_defaults()).with_group(
                restaurant_booking::ACTION_GROUP,
                restaurant_booking::tool_descriptions(),
            );
            let answer = run_tool_loop(
                client.as_ref(),
                &model_id,
                &toolbox,
                &input,
                &CompletionSettings::from_config(&config),
                max_turns.max(1),
            )
            .await?;
            println!("{answer}");
            Ok(())
        }
        Command::Image {
            model,
            prompt,
            negative,
            count,
            seed,
            output_dir,
        } => {
            let client = remote_client(&config).await?;
            let mut request = TextToImageRequest::new(
                prompt,
                ImageGenerationConfig {
                    number_of_images: count.max(1),
                    seed,
                    ..Default::default()
                },
            );
            if let Some(negative) = negative {
                request = request.with_negative_text(negative);
            }

            let images = generate_images(client.as_ref(), &model, &request).await?;
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;
            for (index, image) in images.iter().enumerate() {
                let path = output_dir.join(format!("image_{index}.png"));
                save_image(image, &path)?;
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Video(command) => video(command, &config).await,
        Command::Agent {
            agent_id,
            alias_id,
            session_id,
            trace,
            input,
        } => {
            let client = remote_client(&config).await?;
            let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let answer =
                invoke_agent(&client, &agent_id, &alias_id, &session_id, &input, trace, None)
                    .await?;
            if trace {
                for found in answer.traces.iter().flat_map(text_with_parents) {
                    println!("[{}] {}", found.parents.join(" > "), found.text);
                }
            }
            println!("{}", answer.text);
            info!("Session {}", session_id);
            Ok(())
        }
        Command::Kb(command) => kb(command, &config).await,
        Command::Guardrail {
            id,
            version,
            output,
            model,
            text,
        } => {
            let client = remote_client(&config).await?;
            match model {
                Some(model) => {
                    let guardrail = GuardrailConfig {
                        guardrail_identifier: id,
                        guardrail_version: version,
                        trace: Some("enabled".to_string()),
                    };
                    let (response, intervened) = converse_with_guardrail(
                        client.as_ref(),
                        &config.resolve_model(&model),
                        &text,
                        guardrail,
                    )
                    .await?;
                    println!("{}", response.text());
                    if intervened {
                        warn!("Guardrail intervened");
                    }
                }
                None => {
                    let source = if output {
                        GuardrailSource::Output
                    } else {
                        GuardrailSource::Input
                    };
                    let verdict = apply_guardrail(&client, &id, &version, source, &text).await?;
                    println!("{}", verdict.action);
                    for line in &verdict.outputs {
                        println!("{line}");
                    }
                    if verdict.intervened() {
                        warn!("Guardrail intervened");
                    }
                }
            }
            Ok(())
        }
        Command::Serve { shoe_store } => serve(config, shoe_store.as_deref()).await,
    }
}

fn validate(model: &str, train: &Path, validation: Option<&Path>) -> Result<()> {
    let validator = DatasetValidator::for_model(model)?;
    let report = validator.validate_pair(train, validation)?;

    if report.passed() {
        println!("Validation passed for {}", model);
        return Ok(());
    }
    for error in report.all_errors() {
        println!("{error}");
    }
    bail!(
        "Validation failed for {}. Supported models: {}",
        model,
        ModelRegistry::names().join(", ")
    )
}

fn convert(command: ConvertCommand) -> Result<()> {
    let written = match command {
        ConvertCommand::JsonToJsonl { input, output } => {
            conversion::json_to_jsonl(&input, &output)?
        }
        ConvertCommand::PromptCompletion {
            input,
            output,
            prompt_column,
            completion_column,
            system,
        } => conversion::prompt_completion_to_converse(
            &input,
            &output,
            &prompt_column,
            &completion_column,
            system.as_deref(),
        )?,
    };
    info!("Wrote {} record(s)", written);
    Ok(())
}

async fn finetune(command: FinetuneCommand, config: &Config) -> Result<()> {
    let client = remote_client(config).await?;
    let poller = Poller::from_config(config);

    match command {
        FinetuneCommand::Submit {
            job_name,
            model_name,
            train_uri,
            validation_uri,
            output_uri,
            base_model,
            role_arn,
            wait,
        } => {
            let role_arn = role_arn
                .or_else(|| config.role_arn.clone())
                .context("No role ARN given (pass --role-arn or set finetune.role_arn)")?;
            let job = FineTuneJob {
                job_name,
                custom_model_name: model_name,
                role_arn,
                base_model: base_model.unwrap_or_else(|| config.base_model.clone()),
                training_s3_uri: train_uri,
                validation_s3_uri: validation_uri,
                output_s3_uri: output_uri,
                hyper_parameters: config.hyper_parameters.clone(),
            };
            let arn = jobs::customization::submit(&client, &job).await?;
            println!("{arn}");
            if wait {
                let done = jobs::customization::wait(&client, &arn, &poller).await?;
                println!("{}", done.status.as_str());
            }
        }
        FinetuneCommand::Status { job_arn } => {
            let job = jobs::customization::status(&client, &job_arn).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        FinetuneCommand::Wait { job_arn } => {
            let job = jobs::customization::wait(&client, &job_arn, &poller).await?;
            println!("{}", job.status.as_str());
        }
    }
    Ok(())
}

async fn video(command: VideoCommand, config: &Config) -> Result<()> {
    let client = remote_client(config).await?;

    match command {
        VideoCommand::Submit {
            model,
            prompt,
            output_uri,
            duration,
            seed,
            output_dir,
        } => {
            let input = jobs::async_invoke::text_to_video_input(&prompt, duration, seed);
            let arn =
                jobs::async_invoke::start(&client, &model, input.clone(), &output_uri).await?;
            jobs::async_invoke::save_invocation_info(&client, &arn, &input, &output_dir).await?;
            println!("{arn}");
        }
        VideoCommand::Wait { invocation_arn } => {
            let job =
                jobs::async_invoke::wait(&client, &invocation_arn, &Poller::from_config(config))
                    .await?;
            println!("{}", job.status.as_str());
            if let Some(message) = &job.failure_message {
                warn!("{}", message);
            }
        }
        VideoCommand::Monitor {
            output_dir,
            since,
            bucket_root,
        } => {
            let store: Box<dyn ObjectStore> = match bucket_root {
                Some(root) => Box::new(LocalObjectStore::new(root)),
                None => Box::new(HttpObjectStore::from_config(config)?),
            };
            let summary = jobs::async_invoke::monitor_and_download(
                &client,
                store.as_ref(),
                &output_dir,
                since,
                Duration::from_secs(config.poll_interval_secs),
            )
            .await?;
            info!(
                "Monitoring complete: {} completed, {} failed",
                summary.completed, summary.failed
            );
        }
    }
    Ok(())
}

async fn kb(command: KbCommand, config: &Config) -> Result<()> {
    let client = remote_client(config).await?;

    match command {
        KbCommand::Sync {
            name,
            description,
            role_arn,
            collection_arn,
            index_name,
            bucket,
            embedding_model,
        } => {
            let spec = base::KnowledgeBaseSpec {
                name,
                description,
                role_arn,
                collection_arn,
                index_name,
                bucket_name: bucket,
                embedding_model: ClientCache::global()
                    .embeddings_model_id(Some(embedding_model.as_str()))
                    .await,
            };
            let handle = base::create_or_retrieve(&client, &spec, &config.region).await?;
            let job = base::synchronize(
                &client,
                &handle.knowledge_base_id,
                &handle.data_source_id,
                &Poller::from_config(config),
            )
            .await?;
            println!(
                "{}\t{}\t{}",
                handle.knowledge_base_id, handle.data_source_id, job.ingestion_job_id
            );
        }
        KbCommand::Retrieve {
            kb_id,
            results,
            query,
        } => {
            for result in base::retrieve(&client, &kb_id, &query, results).await? {
                println!(
                    "[{:.3}] {}",
                    result.score.unwrap_or_default(),
                    result.content.text
                );
            }
        }
    }
    Ok(())
}

async fn serve(config: Config, shoe_store: Option<&Path>) -> Result<()> {
    let config = Arc::new(config);
    let mut router = ActionRouter::with_defaults();
    if let Some(path) = shoe_store {
        let store = InMemoryShoeStore::from_file(path)
            .await
            .with_context(|| format!("Failed to load shoe store from {}", path.display()))?;
        router = router.register(Arc::new(CustomerService::new(Arc::new(store))));
    }
    let router = Arc::new(router);
    print_startup_banner(&config, &router);

    let app = create_router(AppState {
        config: config.clone(),
        router,
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Print startup banner with configuration
fn print_startup_banner(config: &Config, router: &ActionRouter) {
    println!("🚀 Bedrock action-group host v1.0.0");
    println!("✅ Configuration loaded successfully");
    println!("   Region: {}", config.region);
    println!("   Action groups: {}", router.groups().join(", "));
    println!("   Server: {}:{}", config.host, config.port);
    println!();
}
