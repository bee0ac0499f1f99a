//! Helpers shared by the controllers

use crate::errors::{AppError, Result, ValidationErrorExt};
use crate::graph::EntityId;
use crate::validation::{Params, RuleSet};

/// Run a rule set, mapping any violation to the endpoint's fixed message
pub fn validate(params: &Params, rules: &RuleSet, message: &str) -> Result<()> {
    rules.validate(params).map_validation_err(message)
}

/// Parse an identifier parameter; malformed ids resolve to nothing
pub fn entity_id(params: &Params, key: &str) -> Option<EntityId> {
    params.get(key).and_then(|raw| EntityId::parse(raw).ok())
}

/// Run CPU-heavy work (password hashing) off the async workers
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Blocking task panicked: {e}")))?
        .map_err(AppError::Internal)
}
