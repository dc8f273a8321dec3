/// EXECUTE_PROPERTY, EXECUTE_VALIDATE_AUTH and EXTRACT_PIECE_METADATA
///
/// Editor-time operations: they call piece contracts directly and never run the
/// flow executor.

use crate::context::FlowExecutorContext;
use crate::error::EngineError;
use crate::operations::to_response;
use crate::pieces::{split_auth, AuthValidation, PropertyContext, PropertyKind};
use crate::runtime::EngineServices;
use crate::services::ScopedStore;
use crate::variables::process_and_validate;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePropertyInput {
    pub piece_name: String,
    /// Action owning the prop (exclusive with `trigger_name`)
    #[serde(default)]
    pub action_name: Option<String>,
    #[serde(default)]
    pub trigger_name: Option<String>,
    pub property_name: String,
    /// Current (unresolved) values of the step's props
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub flow_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteValidateAuthInput {
    pub piece_name: String,
    pub auth: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractPieceMetadataInput {
    pub piece_name: String,
}

pub async fn execute_property(input: ExecutePropertyInput, services: &EngineServices) -> Result<Value, EngineError> {
    let resolved = services
        .variables()
        .resolve(&input.input, &FlowExecutorContext::empty())
        .await?;
    let mut props = resolved.resolved;
    let auth = split_auth(&mut props);
    let ctx = PropertyContext {
        props,
        auth,
        store: ScopedStore::new(services.store.clone(), input.flow_id.clone()),
    };

    tracing::debug!("🔽 Loading options for {}.{}", input.piece_name, input.property_name);

    let options = match (&input.action_name, &input.trigger_name) {
        (Some(action_name), _) => {
            services
                .pieces
                .action(&input.piece_name, action_name)?
                .options(&input.property_name, ctx)
                .await?
        }
        (None, Some(trigger_name)) => {
            services
                .pieces
                .trigger(&input.piece_name, trigger_name)?
                .options(&input.property_name, ctx)
                .await?
        }
        (None, None) => {
            return Err(EngineError::InvalidInput(
                "EXECUTE_PROPERTY requires actionName or triggerName".to_string(),
            ))
        }
    };
    to_response(&options)
}

pub async fn execute_validate_auth(input: ExecuteValidateAuthInput, services: &EngineServices) -> Result<Value, EngineError> {
    let piece = services.pieces.piece(&input.piece_name)?;
    let auth = piece.auth.as_ref().ok_or_else(|| {
        EngineError::InvalidInput(format!("Piece '{}' does not declare authentication", input.piece_name))
    })?;

    let resolved = services
        .variables()
        .resolve(&input.auth, &FlowExecutorContext::empty())
        .await?
        .resolved;

    // Structured auth is checked against its own prop schema first
    if let PropertyKind::CustomAuth { props } = &auth.definition.kind {
        let (_, errors) = process_and_validate(props, &resolved);
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(|(name, error)| format!("{}: {}", name, error))
                .collect::<Vec<_>>()
                .join(", ");
            return to_response(&AuthValidation::invalid(message));
        }
    }

    let validation = match &auth.validator {
        Some(validator) => validator.validate(&resolved).await,
        None => AuthValidation::valid(),
    };
    tracing::info!("🔐 Auth validation for {}: valid={}", input.piece_name, validation.valid);
    to_response(&validation)
}

pub fn extract_piece_metadata(input: ExtractPieceMetadataInput, services: &EngineServices) -> Result<Value, EngineError> {
    let piece = services.pieces.piece(&input.piece_name)?;
    to_response(&piece.metadata())
}
