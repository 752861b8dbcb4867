//! `input_tracker.{requirements, available}` (spec §4.3, §4.3.4).

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::node_config::InputsSpec;

#[derive(Debug, Default)]
pub struct InputTracker {
    requirements: HashMap<Uuid, InputsSpec>,
    available: HashMap<Uuid, HashSet<String>>,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_requirements(&mut self, node_id: Uuid, spec: Option<InputsSpec>) {
        if let Some(spec) = spec {
            self.requirements.insert(node_id, spec);
        } else {
            self.requirements.remove(&node_id);
        }
    }

    pub fn mark_available(&mut self, node_id: Uuid, discriminator: impl Into<String>) {
        self.available.entry(node_id).or_default().insert(discriminator.into());
    }

    pub fn remove(&mut self, node_id: Uuid) {
        self.requirements.remove(&node_id);
        self.available.remove(&node_id);
    }

    pub fn available_for(&self, node_id: Uuid) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        self.available.get(&node_id).unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }

    /// §4.3.4: with no declared requirements, the predicate is "available is
    /// non-empty"; otherwise every required key must be present.
    pub fn node_has_required_inputs(&self, node_id: Uuid) -> bool {
        let available = self.available.get(&node_id);
        match self.requirements.get(&node_id) {
            None => available.map(|a| !a.is_empty()).unwrap_or(false),
            Some(spec) if spec.required.is_empty() => available.map(|a| !a.is_empty()).unwrap_or(false),
            Some(spec) => {
                let Some(available) = available else { return false };
                spec.required.iter().all(|k| available.contains(k))
            }
        }
    }

    pub fn has_any_input(&self, node_id: Uuid) -> bool {
        self.available.get(&node_id).map(|a| !a.is_empty()).unwrap_or(false)
    }

    /// Whether this node declared a non-empty `inputs.required` list
    /// (distinguishes scheduler priority 3 "input-ready" from priority 4
    /// "root-driven", §4.4).
    pub fn has_requirements(&self, node_id: Uuid) -> bool {
        self.requirements.get(&node_id).map(|s| !s.required.is_empty()).unwrap_or(false)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_store::new_id;

    #[test]
    fn no_requirements_needs_any_input() {
        let mut t = InputTracker::new();
        let node = new_id();
        assert!(!t.node_has_required_inputs(node));
        t.mark_available(node, "default");
        assert!(t.node_has_required_inputs(node));
    }

    #[test]
    fn required_keys_must_all_be_present() {
        let mut t = InputTracker::new();
        let node = new_id();
        t.set_requirements(node, Some(InputsSpec { required: vec!["a".to_string(), "b".to_string()], optional: vec![] }));
        t.mark_available(node, "a");
        assert!(!t.node_has_required_inputs(node));
        t.mark_available(node, "b");
        assert!(t.node_has_required_inputs(node));
    }
}
