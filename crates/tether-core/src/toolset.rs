//! The combined tool set offered to the model for one run.

use std::collections::HashMap;
use tether_types::ToolDescriptor;

/// Where a tool in the set is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Forwarded to the host; never executed here.
    HostAction,
    /// Executed in-process.
    Local,
    /// Routed to a provider session.
    Provider,
}

/// Host actions, local tools, and provider tools merged under unique names.
///
/// Sources are added in that order; a name already present keeps its first
/// owner and the later tool is dropped with a warning.
#[derive(Debug, Default)]
pub struct ToolSet {
    descriptors: Vec<ToolDescriptor>,
    kinds: HashMap<String, ToolKind>,
}

impl ToolSet {
    pub fn build(
        host_actions: &[ToolDescriptor],
        local: &[ToolDescriptor],
        provider: &[ToolDescriptor],
    ) -> Self {
        let mut set = Self::default();
        set.extend(host_actions, ToolKind::HostAction);
        set.extend(local, ToolKind::Local);
        set.extend(provider, ToolKind::Provider);
        set
    }

    fn extend(&mut self, tools: &[ToolDescriptor], kind: ToolKind) {
        for tool in tools {
            if let Some(existing) = self.kinds.get(&tool.name) {
                tracing::warn!(
                    "Tool name '{}' ({kind:?}) collides with {existing:?} tool; keeping the first",
                    tool.name
                );
                continue;
            }
            self.kinds.insert(tool.name.clone(), kind);
            self.descriptors.push(tool.clone());
        }
    }

    /// Descriptors in offer order.
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn kind_of(&self, name: &str) -> Option<ToolKind> {
        self.kinds.get(name).copied()
    }

    /// Names of the host actions in the set.
    pub fn host_action_names(&self) -> Vec<&str> {
        self.descriptors
            .iter()
            .filter(|d| self.kind_of(&d.name) == Some(ToolKind::HostAction))
            .map(|d| d.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
