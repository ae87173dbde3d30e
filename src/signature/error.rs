// Rule compilation errors. These never reach callers of the normalizer.
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RuleError {
    #[error("Rule compilation failed for pattern '{pattern}' (name: {name}): {source}")]
    CompilationFailed {
        pattern: String,
        name: String,
        #[source]
        source: regex::Error,
    },
}
