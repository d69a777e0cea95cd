// src/engine/group.rs

use std::collections::HashMap;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::errors::{GomanderError, Result};
use crate::types::{CommandId, GroupId};

/// Result of starting or stopping every member of a group.
///
/// One member failing never prevents its siblings; failures are collected
/// here instead of aborting the fan-out.
#[derive(Debug, Default)]
pub struct GroupReport {
    pub group_id: GroupId,
    /// Members that were started (or stopped), in group order.
    pub affected: Vec<CommandId>,
    /// Members already in the target state.
    pub skipped: Vec<CommandId>,
    pub failures: Vec<(CommandId, GomanderError)>,
}

impl GroupReport {
    pub fn new(group_id: impl Into<GroupId>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run `op` for every member concurrently and collect the outcome.
///
/// `needs_action` filters members already in the target state; an
/// `AlreadyRunning` from `op` (lost race with another caller) also counts
/// as skipped.
pub(crate) async fn fan_out<F, P>(
    group_id: &str,
    members: Vec<CommandId>,
    needs_action: P,
    op: F,
) -> GroupReport
where
    F: Fn(CommandId) -> Result<()> + Clone + Send + 'static,
    P: Fn(&str) -> bool,
{
    let mut report = GroupReport::new(group_id);
    let mut set = JoinSet::new();
    let mut tasks = HashMap::new();

    for id in &members {
        if !needs_action(id) {
            report.skipped.push(id.clone());
            continue;
        }
        let op = op.clone();
        let id = id.clone();
        let handle = set.spawn({
            let id = id.clone();
            async move {
                let res = op(id.clone());
                (id, res)
            }
        });
        tasks.insert(handle.id(), id);
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((id, Ok(()))) => report.affected.push(id),
            Ok((id, Err(GomanderError::AlreadyRunning(_)))) => report.skipped.push(id),
            Ok((id, Err(e))) => {
                warn!(group = %group_id, command = %id, error = %e, "group member failed");
                report.failures.push((id, e));
            }
            Err(e) => {
                let Some(id) = tasks.remove(&e.id()) else {
                    warn!(group = %group_id, error = %e, "unknown group task failed");
                    continue;
                };
                warn!(group = %group_id, command = %id, error = %e, "group member task panicked");
                report
                    .failures
                    .push((id, GomanderError::Other(anyhow::anyhow!("task failed: {e}"))));
            }
        }
    }

    let order = |id: &CommandId| members.iter().position(|m| m == id).unwrap_or(usize::MAX);
    report.affected.sort_by_key(order);
    report.skipped.sort_by_key(order);
    report.failures.sort_by_key(|(id, _)| order(id));

    debug!(
        group = %group_id,
        affected = report.affected.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "group fan-out finished"
    );
    report
}
