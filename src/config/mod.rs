//! Model catalog configuration.

mod models;

pub use models::{
    fallback_model, recommend_model, resolve_model_alias, ModelCatalog, ModelSize, ModelTier,
    OperationKind, BACKUP_CHAT_MODEL, BACKUP_EMBEDDING_MODEL, DEFAULT_CHAT_MODEL,
    DEFAULT_EMBEDDING_MODEL, MODEL_ALIASES, RECOMMENDED_MODELS,
};
