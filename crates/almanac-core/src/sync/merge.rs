//! Last-write-wins reconciliation of local and remote snapshots

use std::collections::BTreeMap;

use crate::models::{parse_timestamp, Entity, EntityId};

/// How each id in a merge was resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Present on both sides, local copy kept (newer or tied)
    pub local_wins: usize,
    /// Present on both sides, remote copy strictly newer
    pub remote_wins: usize,
    /// Only present remotely
    pub remote_only: usize,
    /// Only present locally
    pub local_only: usize,
}

/// Reconcile two snapshots of the same collection.
///
/// Whole records win or lose; fields are never combined. On equal
/// `updated_at` the local copy is kept. The result is ordered by id.
pub fn merge<T: Entity>(local: Vec<T>, remote: Vec<T>) -> Vec<T> {
    merge_with_report(local, remote).0
}

/// [`merge`], also reporting how each id was resolved
pub fn merge_with_report<T: Entity>(local: Vec<T>, remote: Vec<T>) -> (Vec<T>, MergeReport) {
    let mut report = MergeReport::default();
    let mut merged: BTreeMap<EntityId, (T, bool)> = local
        .into_iter()
        .map(|entity| (entity.id().clone(), (entity, false)))
        .collect();

    for incoming in remote {
        match merged.get_mut(incoming.id()) {
            None => {
                report.remote_only += 1;
                merged.insert(incoming.id().clone(), (incoming, true));
            }
            Some((existing, seen_remote)) => {
                *seen_remote = true;
                if parse_timestamp(incoming.updated_at()) > parse_timestamp(existing.updated_at())
                {
                    report.remote_wins += 1;
                    *existing = incoming;
                } else {
                    report.local_wins += 1;
                }
            }
        }
    }

    report.local_only = merged.values().filter(|(_, seen)| !seen).count();
    let entities = merged.into_values().map(|(entity, _)| entity).collect();
    (entities, report)
}
