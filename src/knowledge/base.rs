//! Knowledge-base lifecycle and retrieval
//!
//! Knowledge bases are looked up by name and reused when present. Creating
//! one assumes the OpenSearch Serverless collection, its vector index and
//! the execution role already exist.

use crate::core::client::{BedrockClient, Service};
use crate::core::constants::VALID_EMBEDDING_MODELS;
use crate::core::provider::BedrockError;
use crate::jobs::poller::{JobStatus, PollError, Poller};
use crate::models::knowledge::{
    ChunkingConfiguration, CreateDataSourceRequest, CreateKnowledgeBaseRequest, DataSource,
    DataSourceConfiguration, DataSourceEnvelope, DataSourceSummary, FieldMapping,
    FixedSizeChunkingConfiguration, IngestionJob, IngestionJobEnvelope, IngestionStatus,
    KnowledgeBase, KnowledgeBaseConfiguration, KnowledgeBaseEnvelope, KnowledgeBaseSummary,
    ListDataSourcesResponse, ListKnowledgeBasesResponse, ListRequest,
    OpenSearchServerlessConfiguration, RetrievalConfiguration, RetrievalQuery, RetrievalResult,
    RetrieveRequest, RetrieveResponse, S3DataSourceConfiguration, StorageConfiguration,
    VectorIngestionConfiguration, VectorKnowledgeBaseConfiguration, VectorSearchConfiguration,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

const KNOWLEDGE_BASES: &str = "knowledgebases";
const DATA_SOURCES: &str = "datasources";
const INGESTION_JOBS: &str = "ingestionjobs";
const PAGE_SIZE: u32 = 100;

const CHUNK_MAX_TOKENS: u32 = 512;
const CHUNK_OVERLAP_PERCENTAGE: u32 = 20;

pub const DEFAULT_EMBEDDING_MODEL: &str = "amazon.titan-embed-text-v2:0";

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error(transparent)]
    Bedrock(#[from] BedrockError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("Invalid embedding model {model}. Your embedding model should be one of {valid:?}")]
    InvalidEmbeddingModel {
        model: String,
        valid: Vec<&'static str>,
    },

    #[error("Knowledge base {0} has no data source")]
    NoDataSource(String),

    #[error("Ingestion job {job_id} ended {status:?}: {reasons:?}")]
    IngestionFailed {
        job_id: String,
        status: IngestionStatus,
        reasons: Vec<String>,
    },
}

impl JobStatus for IngestionJob {
    fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            IngestionStatus::Complete | IngestionStatus::Failed | IngestionStatus::Stopped
        )
    }

    fn label(&self) -> String {
        format!("{:?}", self.status)
    }
}

/// What to create when no knowledge base of this name exists
#[derive(Debug, Clone)]
pub struct KnowledgeBaseSpec {
    pub name: String,
    pub description: Option<String>,
    pub role_arn: String,
    pub collection_arn: String,
    pub index_name: String,
    pub bucket_name: String,
    pub embedding_model: String,
}

/// Identifiers of a ready knowledge base and its data source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseHandle {
    pub knowledge_base_id: String,
    pub data_source_id: String,
}

fn list_request(next_token: Option<String>) -> ListRequest {
    ListRequest {
        max_results: PAGE_SIZE,
        next_token,
    }
}

/// First knowledge base called `name`
pub async fn find_by_name(
    client: &BedrockClient,
    name: &str,
) -> Result<Option<KnowledgeBaseSummary>, BedrockError> {
    let mut next_token = None;
    loop {
        let page: ListKnowledgeBasesResponse = client
            .post_json(Service::Agent, &[KNOWLEDGE_BASES, ""], &list_request(next_token))
            .await?;

        if let Some(found) = page
            .knowledge_base_summaries
            .into_iter()
            .find(|summary| summary.name == name)
        {
            return Ok(Some(found));
        }
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => return Ok(None),
        }
    }
}

pub async fn data_sources(
    client: &BedrockClient,
    knowledge_base_id: &str,
) -> Result<Vec<DataSourceSummary>, BedrockError> {
    let mut sources = Vec::new();
    let mut next_token = None;
    loop {
        let page: ListDataSourcesResponse = client
            .post_json(
                Service::Agent,
                &[KNOWLEDGE_BASES, knowledge_base_id, DATA_SOURCES, ""],
                &list_request(next_token),
            )
            .await?;
        sources.extend(page.data_source_summaries);
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => return Ok(sources),
        }
    }
}

pub fn embedding_model_arn(region: &str, model: &str) -> String {
    format!("arn:aws:bedrock:{region}::foundation-model/{model}")
}

fn knowledge_base_request(spec: &KnowledgeBaseSpec, region: &str) -> CreateKnowledgeBaseRequest {
    CreateKnowledgeBaseRequest {
        name: spec.name.clone(),
        description: spec.description.clone(),
        role_arn: spec.role_arn.clone(),
        knowledge_base_configuration: KnowledgeBaseConfiguration {
            kb_type: "VECTOR".to_string(),
            vector_knowledge_base_configuration: VectorKnowledgeBaseConfiguration {
                embedding_model_arn: embedding_model_arn(region, &spec.embedding_model),
            },
        },
        storage_configuration: StorageConfiguration {
            storage_type: "OPENSEARCH_SERVERLESS".to_string(),
            opensearch_serverless_configuration: OpenSearchServerlessConfiguration {
                collection_arn: spec.collection_arn.clone(),
                vector_index_name: spec.index_name.clone(),
                field_mapping: FieldMapping {
                    vector_field: "vector".to_string(),
                    text_field: "text".to_string(),
                    metadata_field: "text-metadata".to_string(),
                },
            },
        },
    }
}

fn data_source_request(spec: &KnowledgeBaseSpec) -> CreateDataSourceRequest {
    CreateDataSourceRequest {
        name: spec.name.clone(),
        description: spec.description.clone(),
        data_deletion_policy: "RETAIN".to_string(),
        data_source_configuration: DataSourceConfiguration {
            source_type: "S3".to_string(),
            s3_configuration: S3DataSourceConfiguration {
                bucket_arn: format!("arn:aws:s3:::{}", spec.bucket_name),
            },
        },
        vector_ingestion_configuration: VectorIngestionConfiguration {
            chunking_configuration: ChunkingConfiguration {
                chunking_strategy: "FIXED_SIZE".to_string(),
                fixed_size_chunking_configuration: FixedSizeChunkingConfiguration {
                    max_tokens: CHUNK_MAX_TOKENS,
                    overlap_percentage: CHUNK_OVERLAP_PERCENTAGE,
                },
            },
        },
    }
}

async fn create_knowledge_base(
    client: &BedrockClient,
    spec: &KnowledgeBaseSpec,
    region: &str,
) -> Result<KnowledgeBase, KnowledgeError> {
    let request = knowledge_base_request(spec, region);
    match client
        .put_json::<_, KnowledgeBaseEnvelope>(Service::Agent, &[KNOWLEDGE_BASES, ""], &request)
        .await
    {
        Ok(created) => Ok(created.knowledge_base),
        Err(BedrockError::Conflict(message)) => {
            warn!("Knowledge base {} already exists: {}", spec.name, message);
            let summary = find_by_name(client, &spec.name)
                .await?
                .ok_or(BedrockError::Conflict(message))?;
            let existing: KnowledgeBaseEnvelope = client
                .get_json(Service::Agent, &[KNOWLEDGE_BASES, &summary.knowledge_base_id], &[])
                .await?;
            Ok(existing.knowledge_base)
        }
        Err(e) => Err(e.into()),
    }
}

async fn create_data_source(
    client: &BedrockClient,
    knowledge_base_id: &str,
    spec: &KnowledgeBaseSpec,
) -> Result<DataSource, KnowledgeError> {
    let request = data_source_request(spec);
    match client
        .put_json::<_, DataSourceEnvelope>(
            Service::Agent,
            &[KNOWLEDGE_BASES, knowledge_base_id, DATA_SOURCES, ""],
            &request,
        )
        .await
    {
        Ok(created) => Ok(created.data_source),
        Err(BedrockError::Conflict(_)) => {
            let first = data_sources(client, knowledge_base_id)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| KnowledgeError::NoDataSource(knowledge_base_id.to_string()))?;
            let existing: DataSourceEnvelope = client
                .get_json(
                    Service::Agent,
                    &[KNOWLEDGE_BASES, knowledge_base_id, DATA_SOURCES, &first.data_source_id],
                    &[],
                )
                .await?;
            Ok(existing.data_source)
        }
        Err(e) => Err(e.into()),
    }
}

/// Reuse the knowledge base named in `spec`, or create it with an S3 data source
pub async fn create_or_retrieve(
    client: &BedrockClient,
    spec: &KnowledgeBaseSpec,
    region: &str,
) -> Result<KnowledgeBaseHandle, KnowledgeError> {
    if let Some(existing) = find_by_name(client, &spec.name).await? {
        let data_source = data_sources(client, &existing.knowledge_base_id)
            .await?
            .into_iter()
            .find(|source| source.knowledge_base_id == existing.knowledge_base_id)
            .ok_or_else(|| KnowledgeError::NoDataSource(existing.knowledge_base_id.clone()))?;

        info!(
            "Knowledge Base {} already exists (id {}, data source {})",
            spec.name, existing.knowledge_base_id, data_source.data_source_id
        );
        return Ok(KnowledgeBaseHandle {
            knowledge_base_id: existing.knowledge_base_id,
            data_source_id: data_source.data_source_id,
        });
    }

    if !VALID_EMBEDDING_MODELS.contains(&spec.embedding_model.as_str()) {
        return Err(KnowledgeError::InvalidEmbeddingModel {
            model: spec.embedding_model.clone(),
            valid: VALID_EMBEDDING_MODELS.to_vec(),
        });
    }

    info!("Creating knowledge base {}", spec.name);
    let knowledge_base = create_knowledge_base(client, spec, region).await?;
    let data_source = create_data_source(client, &knowledge_base.knowledge_base_id, spec).await?;

    Ok(KnowledgeBaseHandle {
        knowledge_base_id: knowledge_base.knowledge_base_id,
        data_source_id: data_source.data_source_id,
    })
}

#[derive(Serialize)]
struct StartIngestionRequest {}

pub async fn ingestion_job(
    client: &BedrockClient,
    knowledge_base_id: &str,
    data_source_id: &str,
    job_id: &str,
) -> Result<IngestionJob, BedrockError> {
    let envelope: IngestionJobEnvelope = client
        .get_json(
            Service::Agent,
            &[KNOWLEDGE_BASES, knowledge_base_id, DATA_SOURCES, data_source_id, INGESTION_JOBS, job_id],
            &[],
        )
        .await?;
    Ok(envelope.ingestion_job)
}

/// Ingest the data source into the knowledge base and wait for completion
pub async fn synchronize(
    client: &BedrockClient,
    knowledge_base_id: &str,
    data_source_id: &str,
    poller: &Poller,
) -> Result<IngestionJob, KnowledgeError> {
    let started: IngestionJobEnvelope = client
        .put_json(
            Service::Agent,
            &[KNOWLEDGE_BASES, knowledge_base_id, DATA_SOURCES, data_source_id, INGESTION_JOBS, ""],
            &StartIngestionRequest {},
        )
        .await?;
    let job_id = started.ingestion_job.ingestion_job_id;
    info!("Started ingestion job {} for {}", job_id, knowledge_base_id);

    let id = job_id.as_str();
    let job = poller
        .poll_until(id, || ingestion_job(client, knowledge_base_id, data_source_id, id))
        .await?;

    if job.status != IngestionStatus::Complete {
        return Err(KnowledgeError::IngestionFailed {
            job_id,
            status: job.status,
            reasons: job.failure_reasons,
        });
    }
    Ok(job)
}

/// Vector search over a knowledge base
pub async fn retrieve(
    client: &BedrockClient,
    knowledge_base_id: &str,
    query: &str,
    number_of_results: u32,
) -> Result<Vec<RetrievalResult>, BedrockError> {
    let request = RetrieveRequest {
        retrieval_query: RetrievalQuery {
            text: query.to_string(),
        },
        retrieval_configuration: RetrievalConfiguration {
            vector_search_configuration: VectorSearchConfiguration { number_of_results },
        },
    };

    let response: RetrieveResponse = client
        .post_json(
            Service::AgentRuntime,
            &[KNOWLEDGE_BASES, knowledge_base_id, "retrieve"],
            &request,
        )
        .await?;
    Ok(response.retrieval_results)
}
