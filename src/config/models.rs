//! Model catalog: aliases, default and backup models, fallback lookup.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Default model for chat and generation.
pub const DEFAULT_CHAT_MODEL: &str = "deepseek-r1:1.5b";

/// Backup used when no tier matches a failed chat/generate model.
pub const BACKUP_CHAT_MODEL: &str = "qwen2.5:0.5b-Instruct";

/// Default embedding model. Shares the chat model for semantic consistency.
pub const DEFAULT_EMBEDDING_MODEL: &str = DEFAULT_CHAT_MODEL;

/// Backup used when no tier matches a failed embedding model.
pub const BACKUP_EMBEDDING_MODEL: &str = BACKUP_CHAT_MODEL;

/// The kind of logical operation a model is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Chat,
    Generate,
    Embedding,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Chat => "chat",
            OperationKind::Generate => "generate",
            OperationKind::Embedding => "embedding",
        }
    }

    /// Parse a task description ("chat", "completion", "embed", ...).
    pub fn from_task(task: &str) -> Option<Self> {
        match task.to_lowercase().as_str() {
            "chat" | "conversation" => Some(OperationKind::Chat),
            "generate" | "completion" | "code" | "programming" => Some(OperationKind::Generate),
            "embed" | "embedding" => Some(OperationKind::Embedding),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size class of a recommended model tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSize {
    Small,
    Medium,
}

impl ModelSize {
    /// Unknown sizes fall back to `Medium`.
    pub fn parse(size: &str) -> Self {
        match size.to_lowercase().as_str() {
            "small" => ModelSize::Small,
            _ => ModelSize::Medium,
        }
    }
}

/// Recommended models for one size class, ordered by preference.
#[derive(Debug)]
pub struct ModelTier {
    pub size: ModelSize,
    pub chat: &'static [&'static str],
    pub completion: &'static [&'static str],
    pub embedding: &'static [&'static str],
}

impl ModelTier {
    pub fn models_for(&self, kind: OperationKind) -> &'static [&'static str] {
        match kind {
            OperationKind::Chat => self.chat,
            OperationKind::Generate => self.completion,
            OperationKind::Embedding => self.embedding,
        }
    }
}

/// Recommended tiers, searched in order by the fallback lookup.
pub static RECOMMENDED_MODELS: &[ModelTier] = &[
    ModelTier {
        size: ModelSize::Small,
        chat: &["qwen2.5:0.5b-instruct", "deepseek-r1:1.5b"],
        completion: &["qwen2.5:0.5b", "deepseek-r1:1.5b"],
        embedding: &["qwen2.5:0.5b", "deepseek-r1:1.5b"],
    },
    ModelTier {
        size: ModelSize::Medium,
        chat: &["qwen2.5:7b-instruct", "deepseek-r1:7b"],
        completion: &["qwen2.5:7b", "deepseek-r1:7b"],
        embedding: &["qwen2.5:0.5b", "deepseek-r1:1.5b"],
    },
];

/// Short human-friendly names mapped to full model identifiers.
/// Keys are lowercase; lookups lowercase the requested name first.
pub static MODEL_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // Generics
    m.insert("default", DEFAULT_CHAT_MODEL);
    m.insert("small", "deepseek-r1:1.5b");
    m.insert("medium", "qwen2.5:7b-instruct");

    // Specific types
    m.insert("embed", "nomic-embed-text");
    m.insert("embedding", "nomic-embed-text");
    m.insert("code", "codellama:7b");
    m.insert("python", "codellama:7b-python");

    // Name variations
    m.insert("deepseek-small", "deepseek-r1:1.5b");
    m.insert("deepseek-medium", "deepseek-r1:7b");
    m.insert("deepseek-large", "deepseek-r1:32b");
    m.insert("qwen-small", "qwen2.5:0.5b-instruct");
    m.insert("qwen-medium", "qwen2.5:7b-instruct");
    m.insert("qwen-large", "qwen2.5:32b-instruct");

    m
});

/// Resolve a built-in alias. Unknown names are returned unchanged.
pub fn resolve_model_alias(name: &str) -> String {
    MODEL_ALIASES
        .get(name.to_lowercase().as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Model family, i.e. the name without its `:tag`.
fn family(model: &str) -> &str {
    model.split(':').next().unwrap_or(model)
}

/// Built-in fallback lookup for a failed model.
///
/// Searches the recommended tiers for one whose models share a family with
/// `model` and returns the first model of that tier that is not `model`
/// itself. Falls back to the hardcoded backup for `kind`.
pub fn fallback_model(model: &str, kind: OperationKind) -> &'static str {
    for tier in RECOMMENDED_MODELS {
        let models = tier.models_for(kind);
        if models.iter().any(|m| model.starts_with(family(m))) {
            if let Some(candidate) = models.iter().find(|m| !m.eq_ignore_ascii_case(model)) {
                return candidate;
            }
        }
    }

    match kind {
        OperationKind::Embedding => BACKUP_EMBEDDING_MODEL,
        OperationKind::Chat | OperationKind::Generate => BACKUP_CHAT_MODEL,
    }
}

/// Recommend a model for a task description and size preference.
pub fn recommend_model(task: &str, size: &str) -> &'static str {
    let size = ModelSize::parse(size);
    let task_lower = task.to_lowercase();
    if task_lower == "code" || task_lower == "programming" {
        return match size {
            ModelSize::Small => "deepseek-r1:1.5b",
            ModelSize::Medium => "codellama:7b-python",
        };
    }

    let kind = OperationKind::from_task(task).unwrap_or(OperationKind::Chat);
    RECOMMENDED_MODELS
        .iter()
        .find(|tier| tier.size == size)
        .and_then(|tier| tier.models_for(kind).first().copied())
        .unwrap_or(match kind {
            OperationKind::Embedding => DEFAULT_EMBEDDING_MODEL,
            _ => DEFAULT_CHAT_MODEL,
        })
}

/// Immutable per-client model catalog.
///
/// Layers caller-supplied aliases and fallback overrides on top of the
/// built-in tables.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    aliases: HashMap<String, String>,
    fallbacks: HashMap<(String, OperationKind), String>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an alias. The alias is matched case-insensitively.
    pub fn with_alias(mut self, alias: impl Into<String>, model: impl Into<String>) -> Self {
        self.aliases.insert(alias.into().to_lowercase(), model.into());
        self
    }

    /// Pin the substitute used when `model` fails for `kind`.
    pub fn with_fallback(
        mut self,
        model: impl Into<String>,
        kind: OperationKind,
        substitute: impl Into<String>,
    ) -> Self {
        self.fallbacks.insert((model.into(), kind), substitute.into());
        self
    }

    /// Single-step alias lookup with identity fallback.
    pub fn resolve(&self, name: &str) -> String {
        match self.aliases.get(&name.to_lowercase()) {
            Some(model) => model.clone(),
            None => resolve_model_alias(name),
        }
    }

    /// Deterministic substitute for `(model, kind)`.
    pub fn fallback_for(&self, model: &str, kind: OperationKind) -> String {
        self.fallbacks
            .get(&(model.to_string(), kind))
            .cloned()
            .unwrap_or_else(|| fallback_model(model, kind).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_alias() {
        assert_eq!(resolve_model_alias("qwen-small"), "qwen2.5:0.5b-instruct");
        assert_eq!(resolve_model_alias("Embed"), "nomic-embed-text");
        assert_eq!(resolve_model_alias("llama3:8b"), "llama3:8b");
    }

    #[test]
    fn test_alias_is_replaced_only_once() {
        // "small" is itself a built-in alias but is not looked up again.
        let catalog = ModelCatalog::new().with_alias("tiny", "small");
        assert_eq!(catalog.resolve("tiny"), "small");
        assert_eq!(catalog.resolve("default"), DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn test_custom_alias_overrides_builtin() {
        let catalog = ModelCatalog::new().with_alias("Small", "phi3:mini");
        assert_eq!(catalog.resolve("small"), "phi3:mini");
        assert_eq!(catalog.resolve("unknown-model"), "unknown-model");
    }

    #[test]
    fn test_fallback_model_by_family() {
        assert_eq!(
            fallback_model("deepseek-r1:1.5b", OperationKind::Chat),
            "qwen2.5:0.5b-instruct"
        );
        // First model of the tier is the failed one, so the next is used.
        assert_eq!(
            fallback_model("qwen2.5:0.5b-instruct", OperationKind::Chat),
            "deepseek-r1:1.5b"
        );
    }

    #[test]
    fn test_fallback_model_default_backup() {
        assert_eq!(fallback_model("llama3:8b", OperationKind::Chat), BACKUP_CHAT_MODEL);
        assert_eq!(
            fallback_model("nomic-embed-text", OperationKind::Embedding),
            BACKUP_EMBEDDING_MODEL
        );
    }

    #[test]
    fn test_fallback_override() {
        let catalog = ModelCatalog::new().with_fallback("X", OperationKind::Chat, "Y");
        assert_eq!(catalog.fallback_for("X", OperationKind::Chat), "Y");
        assert_eq!(catalog.fallback_for("X", OperationKind::Embedding), BACKUP_EMBEDDING_MODEL);
    }

    #[test]
    fn test_recommend_model() {
        assert_eq!(recommend_model("chat", "small"), "qwen2.5:0.5b-instruct");
        assert_eq!(recommend_model("embedding", "medium"), "qwen2.5:0.5b");
        assert_eq!(recommend_model("code", "medium"), "codellama:7b-python");
        assert_eq!(recommend_model("completion", "huge"), "qwen2.5:7b");
    }
}
