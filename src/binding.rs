//! Scoped variable binding environment
//!
//! Every executing node gets its own frame chained to its parent's.
//! Lookups walk innermost-first, so a descendant redeclaring a name shadows
//! the ancestor's value for itself and its own subtree only. Runtime merges
//! write into the owning frame alone; sibling subtrees executing concurrently
//! each own distinct frames and read ancestor frames through the lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::workflow::StepVariable;

/// One declared variable slot: authored default plus optional runtime value
#[derive(Debug, Clone)]
struct VarSlot {
    declared: String,
    runtime: Option<String>,
}

impl VarSlot {
    fn effective(&self) -> &str {
        self.runtime.as_deref().unwrap_or(&self.declared)
    }
}

/// A frame in the binding chain. Cheap to clone (shared `Arc`).
#[derive(Debug, Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

#[derive(Debug)]
struct ScopeInner {
    frame: RwLock<HashMap<String, VarSlot>>,
    parent: Option<Scope>,
}

impl Scope {
    /// Root of a binding chain (one per run)
    pub fn root() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                frame: RwLock::new(HashMap::new()),
                parent: None,
            }),
        }
    }

    /// New empty frame whose lookups fall through to `self`
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                frame: RwLock::new(HashMap::new()),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Seed declared defaults into this frame (node start).
    ///
    /// Later declarations of the same name within one node win, matching the
    /// order the author listed them.
    pub fn declare(&self, variables: &[StepVariable]) {
        let mut frame = self.inner.frame.write();
        for var in variables {
            frame.insert(
                var.name.clone(),
                VarSlot {
                    declared: var.value.clone(),
                    runtime: var.runtime_value.clone(),
                },
            );
        }
    }

    /// Nearest enclosing value for `name`, runtime value winning over the
    /// authored default. `None` if no declaration is visible.
    pub fn lookup(&self, name: &str) -> Option<String> {
        if let Some(slot) = self.inner.frame.read().get(name) {
            return Some(slot.effective().to_string());
        }
        self.inner.parent.as_ref().and_then(|p| p.lookup(name))
    }

    /// Write handler-produced runtime values into this frame only.
    ///
    /// This is the single mutation point for a node's scope; the frame lock
    /// serializes it against concurrent lookups from descendant subtrees.
    /// Updates never touch ancestor frames - an update for a name declared
    /// upstream shadows it from here down.
    pub fn merge(&self, updates: &HashMap<String, String>) {
        if updates.is_empty() {
            return;
        }
        let mut frame = self.inner.frame.write();
        for (name, value) in updates {
            frame
                .entry(name.clone())
                .and_modify(|slot| slot.runtime = Some(value.clone()))
                .or_insert_with(|| VarSlot {
                    declared: String::new(),
                    runtime: Some(value.clone()),
                });
        }
    }

    /// Snapshot of this frame's slots as step variables (runtime values
    /// included), used to record per-node bindings on the execution result.
    pub fn frame_snapshot(&self) -> Vec<StepVariable> {
        let frame = self.inner.frame.read();
        let mut vars: Vec<StepVariable> = frame
            .iter()
            .map(|(name, slot)| StepVariable {
                name: name.clone(),
                var_type: "String".to_string(),
                value: slot.declared.clone(),
                runtime_value: slot.runtime.clone(),
            })
            .collect();
        vars.sort_by(|a, b| a.name.cmp(&b.name));
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<StepVariable> {
        pairs
            .iter()
            .map(|(n, v)| StepVariable::new(*n, *v))
            .collect()
    }

    #[test]
    fn lookup_walks_to_ancestor() {
        let root = Scope::root();
        root.declare(&vars(&[("site", "contoso")]));

        let child = root.child();
        assert_eq!(child.lookup("site").as_deref(), Some("contoso"));
        assert_eq!(child.lookup("missing"), None);
    }

    #[test]
    fn redeclaration_shadows_for_subtree_only() {
        let root = Scope::root();
        root.declare(&vars(&[("region", "west")]));

        let left = root.child();
        left.declare(&vars(&[("region", "east")]));
        let left_grandchild = left.child();

        let right = root.child();

        assert_eq!(left.lookup("region").as_deref(), Some("east"));
        assert_eq!(left_grandchild.lookup("region").as_deref(), Some("east"));
        // Sibling and ancestor unaffected by the shadow
        assert_eq!(right.lookup("region").as_deref(), Some("west"));
        assert_eq!(root.lookup("region").as_deref(), Some("west"));
    }

    #[test]
    fn merge_writes_own_frame_not_ancestors() {
        let root = Scope::root();
        root.declare(&vars(&[("cpu", "0")]));

        let child = root.child();
        child.declare(&vars(&[("cpu", "0")]));

        let mut updates = HashMap::new();
        updates.insert("cpu".to_string(), "93".to_string());
        child.merge(&updates);

        assert_eq!(child.lookup("cpu").as_deref(), Some("93"));
        assert_eq!(root.lookup("cpu").as_deref(), Some("0"));
    }

    #[test]
    fn merge_can_introduce_new_runtime_variable() {
        let scope = Scope::root();
        let mut updates = HashMap::new();
        updates.insert("rowCount".to_string(), "42".to_string());
        scope.merge(&updates);

        assert_eq!(scope.lookup("rowCount").as_deref(), Some("42"));
        let snapshot = scope.frame_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].runtime_value.as_deref(), Some("42"));
    }

    #[test]
    fn runtime_value_wins_over_declared() {
        let scope = Scope::root();
        scope.declare(&[StepVariable {
            name: "site".to_string(),
            var_type: "String".to_string(),
            value: "default".to_string(),
            runtime_value: Some("resolved".to_string()),
        }]);
        assert_eq!(scope.lookup("site").as_deref(), Some("resolved"));
    }

    #[test]
    fn concurrent_sibling_merges_do_not_interfere() {
        use std::thread;

        let root = Scope::root();
        root.declare(&vars(&[("shared", "base")]));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let child = root.child();
                thread::spawn(move || {
                    let mut updates = HashMap::new();
                    updates.insert("shared".to_string(), format!("v{}", i));
                    child.merge(&updates);
                    child.lookup("shared")
                })
            })
            .collect();

        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.join().unwrap().as_deref(), Some(format!("v{}", i).as_str()));
        }
        assert_eq!(root.lookup("shared").as_deref(), Some("base"));
    }
}
