use std::collections::HashMap;
use std::sync::Arc;

use super::{NodeDefinition, NodeExecutor};
use crate::nodes::llm::LlmProviderRegistry;
use crate::sandbox::SandboxRunner;

/// Output slot used when a node declares a single unnamed output.
pub const DEFAULT_OUTPUT_SLOT: &str = "output";

/// Registry of node executors keyed by node type name.
///
/// Pure lookup table; holds no execution state. Shared between engines via
/// `Arc`.
pub struct NodeRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        NodeRegistry {
            executors: HashMap::new(),
        }
    }

    /// A registry with every built-in node type wired to the given
    /// sandbox and LLM providers.
    pub fn with_builtins(sandbox: Arc<SandboxRunner>, llm: Arc<LlmProviderRegistry>) -> Self {
        let mut registry = NodeRegistry::new();
        registry.register("timer", Arc::new(super::timer::TimerNodeExecutor));
        registry.register(
            "http-request",
            Arc::new(super::http::HttpRequestExecutor::new()),
        );
        registry.register("llm", Arc::new(super::llm::LlmNodeExecutor::new(llm)));
        registry.register(
            "transform",
            Arc::new(super::transform::TransformNodeExecutor),
        );
        registry.register(
            "code",
            Arc::new(super::code::CodeNodeExecutor::new(sandbox)),
        );
        registry.register(
            "branch",
            Arc::new(super::control_flow::BranchNodeExecutor),
        );
        registry.register("loop", Arc::new(super::control_flow::LoopNodeExecutor));
        registry.register("variable", Arc::new(super::basic::VariableNodeExecutor));
        registry.register("output", Arc::new(super::basic::OutputNodeExecutor));
        registry
    }

    /// Register (or replace) an executor for a node type.
    pub fn register(&mut self, node_type: &str, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(node_type.to_string(), executor);
    }

    pub fn get(&self, node_type: &str) -> Option<&Arc<dyn NodeExecutor>> {
        self.executors.get(node_type)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.executors.contains_key(node_type)
    }

    pub fn definition(&self, node_type: &str) -> Option<NodeDefinition> {
        self.executors.get(node_type).map(|e| e.definition())
    }

    /// Registered type names, sorted for stable display.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        NodeRegistry::with_builtins(
            Arc::new(SandboxRunner::default()),
            Arc::new(LlmProviderRegistry::with_echo()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = NodeRegistry::default();
        for ty in [
            "timer",
            "http-request",
            "llm",
            "transform",
            "code",
            "branch",
            "loop",
            "variable",
            "output",
        ] {
            assert!(registry.contains(ty), "missing builtin '{}'", ty);
        }
        assert!(!registry.contains("unknown"));
    }

    #[test]
    fn definitions_expose_slots() {
        let registry = NodeRegistry::default();
        let transform = registry.definition("transform").unwrap();
        assert_eq!(transform.name, "transform");
        assert!(transform.inputs.iter().any(|s| s.name == "input"));
        assert_eq!(transform.outputs, vec![DEFAULT_OUTPUT_SLOT.to_string()]);
    }

    #[test]
    fn types_are_sorted() {
        let registry = NodeRegistry::default();
        let types = registry.types();
        let mut sorted = types.clone();
        sorted.sort();
        assert_eq!(types, sorted);
    }
}
