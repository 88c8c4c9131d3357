//! Registry of customizable models and the dataset format each expects

/// Modalities a model accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Text,
    Multimodal,
}

/// Training record format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    /// `bedrock-conversation-2024` records with content blocks
    Converse,
    /// `{prompt, completion}` pairs
    PromptCompletion,
    /// `{system, messages[{role, content}]}` with plain-string content
    Chat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: &'static str,
    pub model_type: ModelType,
    pub input_type: InputType,
}

const MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "llama3-1-8b",
        model_type: ModelType::Text,
        input_type: InputType::PromptCompletion,
    },
    ModelSpec {
        name: "llama3-1-70b",
        model_type: ModelType::Text,
        input_type: InputType::PromptCompletion,
    },
    ModelSpec {
        name: "llama3-2-1b",
        model_type: ModelType::Text,
        input_type: InputType::Converse,
    },
    ModelSpec {
        name: "llama3-2-3b",
        model_type: ModelType::Text,
        input_type: InputType::Converse,
    },
    ModelSpec {
        name: "llama3-2-11b",
        model_type: ModelType::Multimodal,
        input_type: InputType::Converse,
    },
    ModelSpec {
        name: "llama3-2-90b",
        model_type: ModelType::Multimodal,
        input_type: InputType::Converse,
    },
    ModelSpec {
        name: "nova-micro",
        model_type: ModelType::Text,
        input_type: InputType::Converse,
    },
    ModelSpec {
        name: "nova-lite",
        model_type: ModelType::Multimodal,
        input_type: InputType::Converse,
    },
    ModelSpec {
        name: "nova-pro",
        model_type: ModelType::Multimodal,
        input_type: InputType::Converse,
    },
    ModelSpec {
        name: "claude-3-haiku",
        model_type: ModelType::Text,
        input_type: InputType::Chat,
    },
];

/// Lookup of model specs by name
pub struct ModelRegistry;

impl ModelRegistry {
    pub fn get(name: &str) -> Option<&'static ModelSpec> {
        MODELS.iter().find(|spec| spec.name == name)
    }

    pub fn names() -> Vec<&'static str> {
        MODELS.iter().map(|spec| spec.name).collect()
    }
}
