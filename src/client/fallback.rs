//! Model fallback for one logical call.
//!
//! A call starts in `Primary` with the caller's model. If that fails with
//! ModelNotFound or a server error, a substitute model is looked up and the
//! call is re-issued once (`Substituted`). If the substitute fails too, the
//! call ends in `Exhausted` and the caller gets the primary's error, which
//! is the one that explains the root cause.

use std::future::Future;

use super::config::ClientConfig;
use super::error::{OllamaError, Result};
use crate::config::{ModelCatalog, OperationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    Primary,
    Substituted,
    Exhausted,
}

/// A substitution about to be made. Consumed immediately, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackDecision {
    pub attempted_model: String,
    pub substitute_model: String,
    pub operation_kind: OperationKind,
}

/// Fallback state of one logical call.
#[derive(Debug)]
pub struct Fallback<'a> {
    catalog: &'a ModelCatalog,
    enabled: bool,
    model: String,
    kind: OperationKind,
    state: FallbackState,
}

impl<'a> Fallback<'a> {
    pub fn new(config: &'a ClientConfig, model: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            catalog: &config.catalog,
            enabled: config.fallback_enabled,
            model: model.into(),
            kind,
            state: FallbackState::Primary,
        }
    }

    pub fn state(&self) -> FallbackState {
        self.state
    }

    /// Handle the error of the current attempt.
    ///
    /// Returns a decision only for the first qualifying primary failure with
    /// a substitute distinct from the primary model.
    pub fn on_error(&mut self, err: &OllamaError) -> Option<FallbackDecision> {
        if self.state != FallbackState::Primary || !self.enabled || !err.is_fallback_candidate() {
            self.state = FallbackState::Exhausted;
            return None;
        }

        let substitute = self.catalog.fallback_for(&self.model, self.kind);
        if substitute == self.model {
            self.state = FallbackState::Exhausted;
            return None;
        }

        self.state = FallbackState::Substituted;
        Some(FallbackDecision {
            attempted_model: self.model.clone(),
            substitute_model: substitute,
            operation_kind: self.kind,
        })
    }
}

fn log_substitution(decision: &FallbackDecision, err: &OllamaError) {
    tracing::warn!(
        from = %decision.attempted_model,
        to = %decision.substitute_model,
        operation = %decision.operation_kind,
        error = %err,
        "falling back to substitute model"
    );
}

fn log_exhausted(decision: &FallbackDecision, err: &OllamaError) {
    tracing::debug!(
        substitute = %decision.substitute_model,
        error = %err,
        "substitute model failed, returning primary error"
    );
}

/// Run `call` with the primary model, substituting at most once.
pub(crate) async fn run_with_fallback<T, F, Fut>(
    config: &ClientConfig,
    model: String,
    kind: OperationKind,
    call: F,
) -> Result<T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut fallback = Fallback::new(config, model.clone(), kind);
    let original = match call(model).await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let Some(decision) = fallback.on_error(&original) else {
        return Err(original);
    };
    log_substitution(&decision, &original);

    match call(decision.substitute_model.clone()).await {
        Ok(value) => Ok(value),
        Err(e) => {
            fallback.on_error(&e);
            log_exhausted(&decision, &e);
            Err(original)
        }
    }
}

/// Blocking counterpart of [`run_with_fallback`].
pub(crate) fn run_with_fallback_blocking<T, F>(
    config: &ClientConfig,
    model: String,
    kind: OperationKind,
    call: F,
) -> Result<T>
where
    F: Fn(String) -> Result<T>,
{
    let mut fallback = Fallback::new(config, model.clone(), kind);
    let original = match call(model) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let Some(decision) = fallback.on_error(&original) else {
        return Err(original);
    };
    log_substitution(&decision, &original);

    match call(decision.substitute_model.clone()) {
        Ok(value) => Ok(value),
        Err(e) => {
            fallback.on_error(&e);
            log_exhausted(&decision, &e);
            Err(original)
        }
    }
}
