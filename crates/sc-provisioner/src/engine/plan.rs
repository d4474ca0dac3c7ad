//! Planning: desired resources versus recorded state

use super::program::DesiredResource;
use super::state::StackState;
use crate::error::{ProvisionerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Operation planned for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Create,
    Update,
    /// Delete and re-create
    Replace,
    Delete,
    Same,
}

impl OpType {
    pub fn is_change(self) -> bool {
        self != OpType::Same
    }
}

impl std::fmt::Display for OpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpType::Create => write!(f, "create"),
            OpType::Update => write!(f, "update"),
            OpType::Replace => write!(f, "replace"),
            OpType::Delete => write!(f, "delete"),
            OpType::Same => write!(f, "same"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Add,
    Update,
    Delete,
}

impl std::fmt::Display for DiffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffKind::Add => write!(f, "add"),
            DiffKind::Update => write!(f, "update"),
            DiffKind::Delete => write!(f, "delete"),
        }
    }
}

/// Change of one input property, `path` is dot-separated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDiff {
    pub path: String,
    pub kind: DiffKind,
}

/// Property-level differences between two input documents
pub fn diff_values(old: &Value, new: &Value) -> Vec<PropertyDiff> {
    let mut diffs = Vec::new();
    diff_at("", old, new, &mut diffs);
    diffs
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn diff_at(path: &str, old: &Value, new: &Value, diffs: &mut Vec<PropertyDiff>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old_value) in a {
                match b.get(key) {
                    Some(new_value) => diff_at(&join(path, key), old_value, new_value, diffs),
                    None => diffs.push(PropertyDiff {
                        path: join(path, key),
                        kind: DiffKind::Delete,
                    }),
                }
            }
            for key in b.keys().filter(|k| !a.contains_key(*k)) {
                diffs.push(PropertyDiff {
                    path: join(path, key),
                    kind: DiffKind::Add,
                });
            }
        }
        (a, b) if a == b => {}
        (Value::Null, _) => diffs.push(PropertyDiff {
            path: path.to_string(),
            kind: DiffKind::Add,
        }),
        (_, Value::Null) => diffs.push(PropertyDiff {
            path: path.to_string(),
            kind: DiffKind::Delete,
        }),
        _ => diffs.push(PropertyDiff {
            path: path.to_string(),
            kind: DiffKind::Update,
        }),
    }
}

/// Planned step for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub op: OpType,
    pub urn: String,
    pub kind: String,
    pub name: String,
    pub diffs: Vec<PropertyDiff>,
}

/// Counts of planned or applied operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub same: usize,
}

impl ChangeSummary {
    pub fn record(&mut self, op: OpType) {
        match op {
            OpType::Create => self.create += 1,
            OpType::Update => self.update += 1,
            OpType::Replace => self.replace += 1,
            OpType::Delete => self.delete += 1,
            OpType::Same => self.same += 1,
        }
    }

    pub fn changes(&self) -> usize {
        self.create + self.update + self.replace + self.delete
    }

    /// Counts keyed by operation name
    pub fn operations(&self) -> BTreeMap<String, usize> {
        [
            (OpType::Create, self.create),
            (OpType::Update, self.update),
            (OpType::Replace, self.replace),
            (OpType::Delete, self.delete),
            (OpType::Same, self.same),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(op, count)| (op.to_string(), count))
        .collect()
    }
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            self.create, self.update, self.replace, self.delete, self.same
        )
    }
}

/// Steps needed to move the recorded state to the desired resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    /// Diffs desired against recorded resources.
    ///
    /// With `targets`, only the listed URNs are considered; everything else
    /// is neither planned nor deleted.
    pub fn compute(
        desired: &[DesiredResource],
        current: &StackState,
        targets: Option<&[String]>,
    ) -> Plan {
        let in_scope = |urn: &str| targets.is_none_or(|t| t.iter().any(|x| x == urn));
        let mut steps = Vec::new();

        for resource in desired.iter().filter(|r| in_scope(&r.urn)) {
            let (op, diffs) = match current.resource(&resource.urn) {
                None => (OpType::Create, Vec::new()),
                Some(recorded) => {
                    let diffs = diff_values(&recorded.inputs, &resource.inputs);
                    let op = if recorded.kind != resource.kind
                        || diffs.iter().any(|d| resource.forces_replacement(&d.path))
                    {
                        OpType::Replace
                    } else if !diffs.is_empty() || recorded.provider != resource.provider.urn {
                        OpType::Update
                    } else {
                        OpType::Same
                    };
                    (op, diffs)
                }
            };
            steps.push(Step {
                op,
                urn: resource.urn.clone(),
                kind: resource.kind.clone(),
                name: resource.name.clone(),
                diffs,
            });
        }

        let desired_urns: HashSet<&str> = desired.iter().map(|r| r.urn.as_str()).collect();
        for recorded in current.resources.iter().rev() {
            if in_scope(&recorded.urn) && !desired_urns.contains(recorded.urn.as_str()) {
                steps.push(Step {
                    op: OpType::Delete,
                    urn: recorded.urn.clone(),
                    kind: recorded.kind.clone(),
                    name: recorded.name.clone(),
                    diffs: Vec::new(),
                });
            }
        }

        Plan { steps }
    }

    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for step in &self.steps {
            summary.record(step.op);
        }
        summary
    }

    pub fn has_changes(&self) -> bool {
        self.steps.iter().any(|s| s.op.is_change())
    }

    pub fn step(&self, urn: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.urn == urn)
    }
}

/// Groups desired resources into levels; every resource depends only on
/// resources of earlier levels. Dependencies outside `desired` are ignored.
pub fn dependency_levels(desired: &[DesiredResource]) -> Result<Vec<Vec<usize>>> {
    let index: HashMap<&str, usize> = desired
        .iter()
        .enumerate()
        .map(|(i, r)| (r.urn.as_str(), i))
        .collect();

    let mut pending: Vec<HashSet<usize>> = desired
        .iter()
        .map(|r| {
            r.dependencies()
                .iter()
                .filter_map(|urn| index.get(urn.as_str()).copied())
                .collect()
        })
        .collect();

    let mut done = vec![false; desired.len()];
    let mut levels = Vec::new();
    let mut remaining = desired.len();

    while remaining > 0 {
        let level: Vec<usize> = (0..desired.len())
            .filter(|&i| !done[i] && pending[i].is_empty())
            .collect();
        if level.is_empty() {
            let stuck: Vec<&str> = (0..desired.len())
                .filter(|&i| !done[i])
                .map(|i| desired[i].urn.as_str())
                .collect();
            return Err(ProvisionerError::State(format!(
                "dependency cycle between {}",
                stuck.join(", ")
            )));
        }
        for &i in &level {
            done[i] = true;
        }
        for deps in pending.iter_mut() {
            for i in &level {
                deps.remove(i);
            }
        }
        remaining -= level.len();
        levels.push(level);
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_values() {
        let old = json!({"location": "EU", "labels": {"team": "a"}, "gone": 1});
        let new = json!({"location": "US", "labels": {"team": "a", "env": "prod"}});
        let diffs = diff_values(&old, &new);
        assert!(diffs.contains(&PropertyDiff {
            path: "location".to_string(),
            kind: DiffKind::Update
        }));
        assert!(diffs.contains(&PropertyDiff {
            path: "labels.env".to_string(),
            kind: DiffKind::Add
        }));
        assert!(diffs.contains(&PropertyDiff {
            path: "gone".to_string(),
            kind: DiffKind::Delete
        }));
        assert_eq!(diffs.len(), 3);
        assert!(diff_values(&new, &new).is_empty());
    }

    #[test]
    fn test_summary_display() {
        let mut summary = ChangeSummary::default();
        summary.record(OpType::Create);
        summary.record(OpType::Same);
        summary.record(OpType::Same);
        assert_eq!(
            summary.to_string(),
            "1 to create, 0 to update, 0 to replace, 0 to delete, 2 unchanged"
        );
        assert_eq!(summary.operations().get("same"), Some(&2));
        assert_eq!(summary.operations().get("update"), None);
        assert_eq!(summary.changes(), 1);
    }
}
