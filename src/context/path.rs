/// Step-execution path
///
/// Locates a step's output inside nested loop iterations. The path
/// `[(loop_a, 2), (loop_b, 0)]` means "iteration 2 of loop_a, then iteration 0
/// of loop_b". An empty path is the top level.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One `(loop step name, iteration index)` hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSegment {
    pub step_name: String,
    pub iteration: usize,
}

/// Ordered sequence of loop hops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepExecutionPath {
    segments: Vec<PathSegment>,
}

impl StepExecutionPath {
    /// Top-level path
    pub fn empty() -> Self {
        Self::default()
    }

    /// New path extended with one more loop iteration
    pub fn loop_iteration(&self, step_name: &str, iteration: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment {
            step_name: step_name.to_string(),
            iteration,
        });
        Self { segments }
    }

    /// New path without its innermost hop
    pub fn remove_last(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for StepExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        let rendered: Vec<String> = self
            .segments
            .iter()
            .map(|s| format!("{}[{}]", s.step_name, s.iteration))
            .collect();
        write!(f, "{}", rendered.join(" > "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_return_new_paths() {
        let root = StepExecutionPath::empty();
        let inner = root.loop_iteration("loop_a", 2).loop_iteration("loop_b", 0);

        assert!(root.is_empty());
        assert_eq!(inner.len(), 2);
        assert_eq!(inner.to_string(), "loop_a[2] > loop_b[0]");
        assert_eq!(inner.remove_last(), root.loop_iteration("loop_a", 2));
        assert_eq!(root.remove_last(), root);
    }

    #[test]
    fn serializes_as_list_of_hops() {
        let path = StepExecutionPath::empty().loop_iteration("loop", 1);
        let json = serde_json::to_value(&path).unwrap();
        assert_eq!(json, serde_json::json!([{ "stepName": "loop", "iteration": 1 }]));
    }
}
