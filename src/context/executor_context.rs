/// Flow executor context
///
/// Immutable accumulator of a run's progress. Every transition consumes the
/// current value and returns a new one; the step maps are `Arc`-shared and only
/// copied when another context still references them, so earlier snapshots never
/// observe later writes.

use crate::context::path::StepExecutionPath;
use crate::context::step_output::{StepMap, StepOutput, StepStatus};
use crate::error::EngineError;
use crate::runtime::hooks::{PauseMetadata, StopResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Run classification while executing and after the chain ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Running,
    Paused,
    Succeeded,
    Failed,
}

/// Step that made the run fail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedStep {
    pub name: String,
    pub display_name: String,
    pub message: Value,
}

/// Extra information attached to a verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictResponse {
    #[serde(rename_all = "camelCase")]
    Stopped { stop_response: StopResponse },
    #[serde(rename_all = "camelCase")]
    Paused { pause_metadata: PauseMetadata },
    #[serde(rename_all = "camelCase")]
    Failed { failed_step: FailedStep },
}

/// External status of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    Paused,
    Stopped,
}

/// Output record produced once per invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    pub status: ExecutionStatus,
    pub steps: StepMap,
    pub tasks: u32,
    pub tags: Vec<String>,
    /// Run duration in milliseconds
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_metadata: Option<PauseMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_response: Option<StopResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailedStep>,
}

/// Execution state threaded through every step executor
#[derive(Debug, Clone)]
pub struct FlowExecutorContext {
    tasks: u32,
    tags: Arc<BTreeSet<String>>,
    steps: Arc<StepMap>,
    current_state: Arc<Map<String, Value>>,
    current_path: StepExecutionPath,
    verdict: Verdict,
    verdict_response: Option<VerdictResponse>,
    duration: u64,
}

impl Default for FlowExecutorContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl FlowExecutorContext {
    /// Context at the start of a run
    pub fn empty() -> Self {
        Self {
            tasks: 0,
            tags: Arc::new(BTreeSet::new()),
            steps: Arc::new(StepMap::new()),
            current_state: Arc::new(Map::new()),
            current_path: StepExecutionPath::empty(),
            verdict: Verdict::Running,
            verdict_response: None,
            duration: 0,
        }
    }

    /// Rebuild a context from a previous invocation's recorded state (RESUME)
    ///
    /// The template state is recomputed from the step maps: root steps first,
    /// then for every loop the latest iteration, recursively.
    pub fn from_previous_run(steps: StepMap, tags: Vec<String>, tasks: u32) -> Self {
        let mut current_state = Map::new();
        flatten_state(&steps, &mut current_state);
        Self {
            tasks,
            tags: Arc::new(tags.into_iter().collect()),
            steps: Arc::new(steps),
            current_state: Arc::new(current_state),
            ..Self::empty()
        }
    }

    pub fn tasks(&self) -> u32 {
        self.tasks
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.iter().cloned().collect()
    }

    /// Root step map
    pub fn steps(&self) -> &StepMap {
        &self.steps
    }

    /// Flattened `name → output` view used for templating
    pub fn current_state(&self) -> &Map<String, Value> {
        &self.current_state
    }

    pub fn current_path(&self) -> &StepExecutionPath {
        &self.current_path
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn verdict_response(&self) -> Option<&VerdictResponse> {
        self.verdict_response.as_ref()
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Step output at the current path, if recorded
    pub fn get_step_output(&self, step_name: &str) -> Option<&StepOutput> {
        map_at_path(&self.steps, &self.current_path)
            .ok()
            .and_then(|map| map.get(step_name))
    }

    /// True if the step already ran at the current path and is not waiting on a resume
    pub fn is_completed(&self, step_name: &str) -> bool {
        self.get_step_output(step_name)
            .is_some_and(|step| step.status != StepStatus::Paused)
    }

    /// Write a step output into the map addressed by the current path
    ///
    /// Fails if any hop of the path is missing or is not a loop output.
    pub fn upsert_step(self, step_name: &str, output: StepOutput) -> Result<Self, EngineError> {
        let mut next = self;
        {
            let steps = Arc::make_mut(&mut next.steps);
            let target = map_at_path_mut(steps, &next.current_path)?;
            if let Some(value) = output.state_value() {
                Arc::make_mut(&mut next.current_state).insert(step_name.to_string(), value);
            }
            target.insert(step_name.to_string(), output);
        }
        Ok(next)
    }

    /// Remove root-level step outputs (used to re-run a region of the graph)
    pub fn remove_root_steps(self, step_names: &[String]) -> Self {
        let mut next = self;
        let steps = Arc::make_mut(&mut next.steps);
        let state = Arc::make_mut(&mut next.current_state);
        for name in step_names {
            steps.shift_remove(name);
            state.remove(name);
        }
        next
    }

    pub fn add_tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self;
        let set = Arc::make_mut(&mut next.tags);
        set.extend(tags.into_iter().map(Into::into));
        next
    }

    pub fn increase_task(self) -> Self {
        Self {
            tasks: self.tasks + 1,
            ..self
        }
    }

    pub fn set_current_path(self, path: StepExecutionPath) -> Self {
        Self {
            current_path: path,
            ..self
        }
    }

    pub fn set_verdict(self, verdict: Verdict, response: Option<VerdictResponse>) -> Self {
        Self {
            verdict,
            verdict_response: response,
            ..self
        }
    }

    pub fn set_duration(self, duration: u64) -> Self {
        Self { duration, ..self }
    }

    /// Map the internal verdict onto the external result
    pub fn to_execution_output(&self) -> Result<ExecutionOutput, EngineError> {
        let mut output = ExecutionOutput {
            status: ExecutionStatus::Succeeded,
            steps: (*self.steps).clone(),
            tasks: self.tasks,
            tags: self.tags(),
            duration: self.duration,
            pause_metadata: None,
            stop_response: None,
            error: None,
        };

        match self.verdict {
            Verdict::Failed => {
                output.status = ExecutionStatus::Failed;
                if let Some(VerdictResponse::Failed { failed_step }) = &self.verdict_response {
                    output.error = Some(failed_step.clone());
                }
            }
            Verdict::Paused => match &self.verdict_response {
                Some(VerdictResponse::Paused { pause_metadata }) => {
                    output.status = ExecutionStatus::Paused;
                    output.pause_metadata = Some(pause_metadata.clone());
                }
                _ => return Err(EngineError::MissingPauseMetadata),
            },
            Verdict::Running | Verdict::Succeeded => {
                if let Some(VerdictResponse::Stopped { stop_response }) = &self.verdict_response {
                    output.status = ExecutionStatus::Stopped;
                    output.stop_response = Some(stop_response.clone());
                }
            }
        }

        Ok(output)
    }
}

/// Walk the path down to the addressed step map
pub(crate) fn map_at_path<'a>(root: &'a StepMap, path: &StepExecutionPath) -> Result<&'a StepMap, EngineError> {
    let mut current = root;
    for segment in path.segments() {
        let step = current.get(&segment.step_name).ok_or_else(|| {
            EngineError::CorruptedPath(format!("step '{}' is missing at {}", segment.step_name, path))
        })?;
        let loop_output = step.loop_output().ok_or_else(|| {
            EngineError::CorruptedPath(format!("step '{}' is not a loop output at {}", segment.step_name, path))
        })?;
        current = loop_output.iterations.get(segment.iteration).ok_or_else(|| {
            EngineError::CorruptedPath(format!(
                "iteration {} of '{}' does not exist at {}",
                segment.iteration, segment.step_name, path
            ))
        })?;
    }
    Ok(current)
}

fn map_at_path_mut<'a>(root: &'a mut StepMap, path: &StepExecutionPath) -> Result<&'a mut StepMap, EngineError> {
    let mut current = root;
    for segment in path.segments() {
        let step = current.get_mut(&segment.step_name).ok_or_else(|| {
            EngineError::CorruptedPath(format!("step '{}' is missing at {}", segment.step_name, path))
        })?;
        let loop_output = step.loop_output_mut().ok_or_else(|| {
            EngineError::CorruptedPath(format!("step '{}' is not a loop output at {}", segment.step_name, path))
        })?;
        current = loop_output.iterations.get_mut(segment.iteration).ok_or_else(|| {
            EngineError::CorruptedPath(format!(
                "iteration {} of '{}' does not exist at {}",
                segment.iteration, segment.step_name, path
            ))
        })?;
    }
    Ok(current)
}

fn flatten_state(steps: &StepMap, state: &mut Map<String, Value>) {
    for (name, step) in steps {
        if let Some(value) = step.state_value() {
            state.insert(name.clone(), value);
        }
        if let Some(last) = step.loop_output().and_then(|lp| lp.iterations.last()) {
            flatten_state(last, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::ActionKind;
    use serde_json::json;

    fn succeeded(output: Value) -> StepOutput {
        StepOutput::new(ActionKind::Piece, StepStatus::Succeeded, json!({})).with_output(output)
    }

    fn with_loop_iteration(ctx: FlowExecutorContext, loop_name: &str) -> FlowExecutorContext {
        let mut lp = ctx
            .get_step_output(loop_name)
            .cloned()
            .unwrap_or_else(|| StepOutput::new_loop(json!({})));
        lp.loop_output_mut().unwrap().iterations.push(StepMap::new());
        ctx.upsert_step(loop_name, lp).unwrap()
    }

    #[test]
    fn transitions_do_not_touch_earlier_snapshots() {
        let start = FlowExecutorContext::empty();
        let snapshot = start.clone();
        let next = start
            .upsert_step("a", succeeded(json!(1)))
            .unwrap()
            .increase_task()
            .add_tags(["x"]);

        assert!(snapshot.steps().is_empty());
        assert_eq!(snapshot.tasks(), 0);
        assert!(snapshot.tags().is_empty());
        assert_eq!(next.steps().len(), 1);
        assert_eq!(next.tasks(), 1);
        assert_eq!(next.current_state()["a"], json!(1));
    }

    #[test]
    fn upsert_writes_into_the_addressed_iteration() {
        let ctx = with_loop_iteration(FlowExecutorContext::empty(), "loop");
        let ctx = ctx.set_current_path(StepExecutionPath::empty().loop_iteration("loop", 0));
        let ctx = ctx.upsert_step("inner", succeeded(json!("hi"))).unwrap();

        assert!(ctx.is_completed("inner"));
        assert!(!ctx.steps().contains_key("inner"));
        let lp = ctx.steps()["loop"].loop_output().unwrap();
        assert_eq!(lp.iterations[0]["inner"].plain_output(), Some(&json!("hi")));

        let back = ctx.set_current_path(StepExecutionPath::empty());
        assert!(!back.is_completed("inner"));
    }

    #[test]
    fn corrupted_paths_fail_loudly() {
        let ctx = FlowExecutorContext::empty()
            .upsert_step("plain", succeeded(json!(1)))
            .unwrap();

        let missing = ctx
            .clone()
            .set_current_path(StepExecutionPath::empty().loop_iteration("ghost", 0))
            .upsert_step("x", succeeded(json!(1)));
        assert!(matches!(missing, Err(EngineError::CorruptedPath(_))));

        let not_a_loop = ctx
            .clone()
            .set_current_path(StepExecutionPath::empty().loop_iteration("plain", 0))
            .upsert_step("x", succeeded(json!(1)));
        assert!(matches!(not_a_loop, Err(EngineError::CorruptedPath(_))));

        let out_of_range = with_loop_iteration(ctx, "loop")
            .set_current_path(StepExecutionPath::empty().loop_iteration("loop", 3))
            .upsert_step("x", succeeded(json!(1)));
        assert!(matches!(out_of_range, Err(EngineError::CorruptedPath(_))));
    }

    #[test]
    fn paused_steps_are_not_completed() {
        let paused = StepOutput::new(ActionKind::Piece, StepStatus::Paused, json!({}));
        let ctx = FlowExecutorContext::empty().upsert_step("wait", paused).unwrap();
        assert!(!ctx.is_completed("wait"));
        assert!(!ctx.is_completed("unknown"));
    }

    #[test]
    fn execution_output_mapping() {
        let base = FlowExecutorContext::empty();

        let running = base.clone().to_execution_output().unwrap();
        assert_eq!(running.status, ExecutionStatus::Succeeded);

        let stopped = base
            .clone()
            .set_verdict(
                Verdict::Succeeded,
                Some(VerdictResponse::Stopped {
                    stop_response: StopResponse::new(200, json!({"hello": "world"})),
                }),
            )
            .to_execution_output()
            .unwrap();
        assert_eq!(stopped.status, ExecutionStatus::Stopped);
        assert_eq!(stopped.stop_response.unwrap().body, json!({"hello": "world"}));

        let failed = base.clone().set_verdict(Verdict::Failed, None).to_execution_output().unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);

        let broken_pause = base.clone().set_verdict(Verdict::Paused, None).to_execution_output();
        assert!(matches!(broken_pause, Err(EngineError::MissingPauseMetadata)));
    }

    #[test]
    fn execution_output_is_pure() {
        let ctx = FlowExecutorContext::empty()
            .upsert_step("a", succeeded(json!({"k": 1})))
            .unwrap()
            .add_tags(["t"])
            .increase_task()
            .set_duration(12);
        assert_eq!(ctx.to_execution_output().unwrap(), ctx.to_execution_output().unwrap());
    }

    #[test]
    fn previous_run_state_is_flattened() {
        let ctx = with_loop_iteration(FlowExecutorContext::empty(), "loop");
        let ctx = with_loop_iteration(ctx, "loop")
            .set_current_path(StepExecutionPath::empty().loop_iteration("loop", 1))
            .upsert_step("inner", succeeded(json!("second")))
            .unwrap();

        let rebuilt = FlowExecutorContext::from_previous_run(ctx.steps().clone(), vec!["t".into()], 3);
        assert_eq!(rebuilt.current_state()["inner"], json!("second"));
        assert!(rebuilt.current_state().contains_key("loop"));
        assert_eq!(rebuilt.tasks(), 3);
        assert_eq!(rebuilt.current_path(), &StepExecutionPath::empty());
    }
}
