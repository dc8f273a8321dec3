/// Variable Resolution
///
/// Turns a step's unresolved settings into the values it runs with:
/// - Template scanning and path selection (`{{ step.field[0] }}`)
/// - Resolution against step outputs, connections and the store
/// - Property processing and validation against a piece's schema

// `{{ }}` scanning, path parsing and JSONPath selection
pub mod template;

// Template resolution against context and collaborators
pub mod resolver;

// Schema-driven coercion and validation
pub mod props;

pub use props::{process_and_validate, PropErrors};
pub use resolver::{redact, ResolvedInput, VariableService, REDACTED};
