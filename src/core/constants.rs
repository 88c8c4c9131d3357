//! Constants for dataset keys, roles, job states and service limits
//!
//! String constants shared by the dataset validators, converters and the
//! remote job helpers.

/// Message role constants
pub mod role {
    /// User role identifier
    pub const USER: &str = "user";

    /// Assistant role identifier
    pub const ASSISTANT: &str = "assistant";

    /// Roles accepted in training records
    pub const SUPPORTED: [&str; 2] = [USER, ASSISTANT];
}

/// Keys used in training records
pub mod keys {
    pub const PROMPT: &str = "prompt";
    pub const COMPLETION: &str = "completion";
    pub const SCHEMA_VERSION: &str = "schemaVersion";
    pub const SYSTEM: &str = "system";
    pub const MESSAGES: &str = "messages";
    pub const ROLE: &str = "role";
    pub const CONTENT: &str = "content";
    pub const TEXT: &str = "text";
    pub const IMAGE: &str = "image";
    pub const VIDEO: &str = "video";
    pub const FORMAT: &str = "format";
    pub const SOURCE: &str = "source";
    pub const S3_LOCATION: &str = "s3Location";
    pub const URI: &str = "uri";
    pub const BUCKET_OWNER: &str = "bucketOwner";
}

/// Conversation schema version written by the converters
pub const CONVERSATION_SCHEMA_VERSION: &str = "bedrock-conversation-2024";

/// Dataset limits enforced before upload
pub mod limits {
    /// Minimum number of lines in a chat-format file
    pub const MIN_LINES: usize = 32;

    /// Maximum number of training records
    pub const MAX_TRAIN_RECORDS: usize = 10_000;

    /// Maximum number of validation records
    pub const MAX_VALIDATION_RECORDS: usize = 1_000;

    /// Maximum combined lines across training and validation files
    pub const MAX_TOTAL_LINES: usize = 10_000;

    /// Per-record token budget
    pub const MAX_TOKENS: usize = 32_000;

    /// Characters per token used for estimation
    pub const CHARS_PER_TOKEN: usize = 3;

    /// Maximum training file size in GB
    pub const MAX_TRAINING_SIZE_GB: f64 = 10.0;

    /// Maximum validation file size in GB
    pub const MAX_VALIDATION_SIZE_GB: f64 = 1.0;

    /// Keywords that must not appear in chat-format content
    pub const RESERVED_KEYWORDS: [&str; 2] = ["\nHuman:", "\nAssistant:"];
}

/// Remote job status values
pub mod status {
    pub const IN_PROGRESS: &str = "InProgress";
    pub const COMPLETED: &str = "Completed";
    pub const FAILED: &str = "Failed";
    pub const STOPPING: &str = "Stopping";
    pub const STOPPED: &str = "Stopped";
}

/// Output written by inference helpers when every attempt failed
pub const API_ERROR_OUTPUT: &str = "$ERROR$";

/// Embedding models accepted for knowledge-base creation
pub const VALID_EMBEDDING_MODELS: [&str; 4] = [
    "cohere.embed-multilingual-v3",
    "cohere.embed-english-v3",
    "amazon.titan-embed-text-v1",
    "amazon.titan-embed-text-v2:0",
];
