//! Queue tree rebuilt from a flat list of queue records

use fairshare_core::{FairshareError, FairshareResult, QueueId, QueueInfo, QueueSpec, ResourceName};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Quota over-provisioning found while building the tree
#[derive(Debug, Clone, PartialEq)]
pub enum QuotaWarning {
    /// A child deserves more than its parent
    ChildExceedsParent {
        child: QueueId,
        parent: QueueId,
        resource: ResourceName,
        child_quota: f64,
        parent_quota: f64,
    },
    /// The children together deserve more than their parent
    ChildrenSumExceedsParent {
        parent: QueueId,
        resource: ResourceName,
        children_quota: f64,
        parent_quota: f64,
    },
}

impl std::fmt::Display for QuotaWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaWarning::ChildExceedsParent {
                child,
                parent,
                resource,
                child_quota,
                parent_quota,
            } => write!(
                f,
                "queue {} {} quota ({}) exceeds parent queue {} {} quota ({}) - over-provisioning detected",
                child, resource, child_quota, parent, resource, parent_quota
            ),
            QuotaWarning::ChildrenSumExceedsParent {
                parent,
                resource,
                children_quota,
                parent_quota,
            } => write!(
                f,
                "total {} quota of children ({}) exceeds parent queue {} {} quota ({}) - over-provisioning detected",
                resource, children_quota, parent, resource, parent_quota
            ),
        }
    }
}

/// Index of every queue in one snapshot, with edges held as identifiers.
///
/// The tree is rebuilt from scratch for each snapshot; nothing is carried over.
#[derive(Debug, Clone, Default)]
pub struct QueueHierarchy {
    queues: BTreeMap<QueueId, QueueInfo>,
}

impl QueueHierarchy {
    /// Build the tree, rejecting duplicate names, unknown parents and ancestry cycles
    pub fn build(specs: &[QueueSpec]) -> FairshareResult<Self> {
        let mut queues = BTreeMap::new();
        for spec in specs {
            let info = QueueInfo::new(spec);
            if info.uid.is_empty() {
                return Err(FairshareError::QueueHierarchy(
                    "queue name cannot be empty".to_string(),
                ));
            }
            if queues.contains_key(&info.uid) {
                return Err(FairshareError::QueueHierarchy(format!(
                    "duplicate queue {}",
                    info.uid
                )));
            }
            queues.insert(info.uid.clone(), info);
        }

        let edges: Vec<(QueueId, QueueId)> = queues
            .values()
            .filter(|q| q.has_parent())
            .map(|q| (q.parent_queue.clone(), q.uid.clone()))
            .collect();

        for (parent, child) in edges {
            match queues.get_mut(&parent) {
                Some(parent_info) => parent_info.add_child_queue(child),
                None => {
                    return Err(FairshareError::QueueHierarchy(format!(
                        "queue {} references unknown parent queue {}",
                        child, parent
                    )))
                }
            }
        }

        let hierarchy = Self { queues };
        hierarchy.check_acyclic()?;

        for warning in hierarchy.quota_warnings() {
            warn!(warning = %warning, "Queue quota over-provisioned");
        }
        debug!(queues = hierarchy.len(), "Built queue hierarchy");

        Ok(hierarchy)
    }

    fn check_acyclic(&self) -> FairshareResult<()> {
        for start in self.queues.values() {
            let mut seen = HashSet::from([&start.uid]);
            let mut current = start;
            while current.has_parent() {
                if !seen.insert(&current.parent_queue) {
                    return Err(FairshareError::QueueHierarchy(format!(
                        "queue {} is its own ancestor",
                        current.parent_queue
                    )));
                }
                match self.queues.get(&current.parent_queue) {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&QueueInfo> {
        self.queues.get(id)
    }

    pub fn parent(&self, id: &str) -> Option<&QueueInfo> {
        let queue = self.queues.get(id)?;
        if !queue.has_parent() {
            return None;
        }
        self.queues.get(&queue.parent_queue)
    }

    pub fn children(&self, id: &str) -> Vec<&QueueInfo> {
        self.queues
            .get(id)
            .map(|queue| {
                queue
                    .child_queues
                    .iter()
                    .filter_map(|child| self.queues.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ancestors of `id`, nearest first
    pub fn ancestors(&self, id: &str) -> Vec<&QueueInfo> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(id);
        while let Some(queue) = current {
            ancestors.push(queue);
            current = self.parent(queue.uid.as_str());
        }
        ancestors
    }

    pub fn roots(&self) -> impl Iterator<Item = &QueueInfo> {
        self.queues.values().filter(|q| !q.has_parent())
    }

    pub fn leaves(&self) -> impl Iterator<Item = &QueueInfo> {
        self.queues.values().filter(|q| q.is_leaf_queue())
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueInfo> {
        self.queues.values()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Deserved-quota over-provisioning per parent and dimension.
    ///
    /// Negative quotas mean unlimited and are never compared.
    pub fn quota_warnings(&self) -> Vec<QuotaWarning> {
        let mut warnings = Vec::new();
        for parent in self.queues.values().filter(|q| !q.is_leaf_queue()) {
            for resource in ResourceName::ALL {
                let parent_quota = parent.resources.get(resource).quota;
                if parent_quota < 0.0 {
                    continue;
                }

                let mut children_quota = 0.0;
                for child in self.children(parent.uid.as_str()) {
                    let child_quota = child.resources.get(resource).quota;
                    if child_quota < 0.0 {
                        continue;
                    }
                    if child_quota > parent_quota {
                        warnings.push(QuotaWarning::ChildExceedsParent {
                            child: child.uid.clone(),
                            parent: parent.uid.clone(),
                            resource,
                            child_quota,
                            parent_quota,
                        });
                    }
                    children_quota += child_quota;
                }

                if children_quota > parent_quota {
                    warnings.push(QuotaWarning::ChildrenSumExceedsParent {
                        parent: parent.uid.clone(),
                        resource,
                        children_quota,
                        parent_quota,
                    });
                }
            }
        }
        warnings
    }
}
