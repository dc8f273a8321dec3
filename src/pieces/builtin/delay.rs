/// Delay piece
///
/// Short delays (under one minute) sleep inside the invocation. Longer delays
/// pause the run with DELAY metadata; the worker resumes it once the time has
/// passed and the re-executed step completes immediately.

use crate::pieces::{
    ActionContext, ActionHandler, DropdownOption, DropdownState, Piece, PropertyDefinition, PropertyKind, PropertyMap,
};
use crate::runtime::constants::ExecutionType;
use crate::runtime::hooks::{ActionOutcome, PauseMetadata};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Delays at or above this many seconds pause the run
const IN_PROCESS_LIMIT_SECS: f64 = 60.0;

pub fn piece() -> Piece {
    Piece::new("delay", "Delay", "0.1.0")
        .description("Wait before continuing the flow")
        .action(DelayFor)
}

pub struct DelayFor;

fn unit_seconds(unit: &str) -> Option<f64> {
    match unit {
        "SECONDS" => Some(1.0),
        "MINUTES" => Some(60.0),
        "HOURS" => Some(3_600.0),
        "DAYS" => Some(86_400.0),
        _ => None,
    }
}

#[async_trait]
impl ActionHandler for DelayFor {
    fn name(&self) -> &'static str {
        "delay_for"
    }

    fn display_name(&self) -> &'static str {
        "Delay for"
    }

    fn description(&self) -> &'static str {
        "Delay the next steps for a fixed amount of time"
    }

    fn props(&self) -> PropertyMap {
        let units = ["SECONDS", "MINUTES", "HOURS", "DAYS"]
            .iter()
            .map(|u| DropdownOption::new(u, json!(u)))
            .collect();

        let mut props = PropertyMap::new();
        props.insert(
            "unit".into(),
            PropertyDefinition::new("Unit", PropertyKind::StaticDropdown { options: DropdownState::new(units) })
                .default_value(json!("SECONDS")),
        );
        props.insert("delayFor".into(), PropertyDefinition::new("Delay for", PropertyKind::Number).required());
        props
    }

    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        if ctx.run.execution_type == ExecutionType::Resume {
            return Ok(ActionOutcome::output(json!({ "success": true })));
        }

        let amount = ctx
            .props
            .get("delayFor")
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow::anyhow!("Delay is missing 'delayFor'"))?;
        if amount < 0.0 {
            return Err(anyhow::anyhow!("Delay must not be negative"));
        }
        let unit = ctx.props.get("unit").and_then(Value::as_str).unwrap_or("SECONDS");
        let factor = unit_seconds(unit).ok_or_else(|| anyhow::anyhow!("Unknown delay unit: {}", unit))?;
        let seconds = amount * factor;

        if ctx.run.test_mode {
            return Ok(ActionOutcome::output(json!({ "success": true })));
        }

        if seconds < IN_PROCESS_LIMIT_SECS {
            tracing::debug!("⏳ Sleeping for {}s", seconds);
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            return Ok(ActionOutcome::output(json!({ "success": true })));
        }

        let resume_date_time = chrono::Utc::now() + chrono::Duration::milliseconds((seconds * 1000.0) as i64);
        tracing::info!("⏸️ Pausing run until {}", resume_date_time.to_rfc3339());
        Ok(ActionOutcome::pause(
            json!({ "resumeDateTime": resume_date_time.to_rfc3339() }),
            PauseMetadata::Delay { resume_date_time },
        ))
    }
}
