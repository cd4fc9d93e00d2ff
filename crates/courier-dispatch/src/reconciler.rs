use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use courier_bridge::{BridgeRequest, BridgeResponse};
use courier_channels::{Destination, DestinationKind};
use courier_core::types::{DestinationId, IdentityId};
use courier_store::Identity;

use crate::cascade;
use crate::error::{DispatchError, Result};
use crate::Services;

/// Outcome of resolving one cycle's remote destination list against the
/// platform's group → supergroup migrations.
struct Resolution {
    /// Destinations that survive this cycle, already deduplicated.
    active: Vec<Destination>,
    /// `(loser, winner)` pairs: the platform merged `loser` into `winner`.
    migrations: Vec<(DestinationId, DestinationId)>,
}

/// Long-running per-identity loop: every `period`, re-fetch the destination
/// list and fold migrations back into tasks and bindings.
///
/// Exits when the identity's credential has been cleared (checked at the top
/// of every iteration) or when the credential is revoked mid-cycle; any other
/// error is logged and the loop continues at the next period.
pub async fn run_reconciler(
    svc: Services,
    identity_id: IdentityId,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(identity_id, "reconciler started");
    loop {
        let identity = match svc.store.get_identity(identity_id) {
            Ok(Some(i)) if i.credential.is_some() => i,
            Ok(_) => {
                info!(identity_id, "reconciler exiting: credential cleared");
                break;
            }
            Err(e) => {
                warn!(identity_id, error = %e, "reconciler could not load identity");
                break;
            }
        };

        match reconcile_once(&svc, &identity).await {
            Ok(active) => debug!(identity_id, active, "reconcile pass complete"),
            Err(e) if is_auth_revoked(&e) => {
                warn!(identity_id, "reconciler: credential revoked, invalidating");
                if let Err(e) = cascade::invalidate(&svc, identity_id) {
                    warn!(identity_id, error = %e, "invalidation after revocation failed");
                }
                break;
            }
            Err(e) => {
                // Recoverable: transient fetch/processing error, try again
                // next period.
                warn!(identity_id, error = %e, "reconcile pass failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(identity_id, "reconciler shutting down");
                    break;
                }
            }
        }
    }
}

/// Spawn a reconciler for every identity that holds a credential. Called once
/// at daemon startup; identities authorized later get their loop from the
/// auth subsystem's login path.
pub fn spawn_reconcilers(
    svc: &Services,
    period: Duration,
    shutdown: &watch::Receiver<bool>,
) -> Result<usize> {
    let identities = svc.store.list_authorized_identities()?;
    let count = identities.len();
    for identity in identities {
        tokio::spawn(run_reconciler(
            svc.clone(),
            identity.id,
            period,
            shutdown.clone(),
        ));
    }
    Ok(count)
}

/// One full reconciliation pass for `identity`. Returns the number of active
/// bindings afterwards.
///
/// Also serves the on-demand "refresh my chat list" operation, which is why
/// it takes the identity rather than re-reading it.
pub async fn reconcile_once(svc: &Services, identity: &Identity) -> Result<u64> {
    let blob = identity
        .credential
        .as_deref()
        .ok_or(DispatchError::NotAuthorized { id: identity.id })?;
    let credential = svc.codec.decrypt(blob)?;

    let destinations = match svc
        .bridge
        .submit(identity.id, BridgeRequest::ListDestinations { credential })
        .await?
    {
        BridgeResponse::Destinations(d) => d,
        other => {
            warn!(identity_id = identity.id, reply = ?other, "unexpected bridge reply for listing");
            return Err(DispatchError::InvalidRequest(
                "bridge returned mismatched reply".into(),
            ));
        }
    };

    let resolution = resolve(destinations);

    for (loser, winner) in &resolution.migrations {
        migrate_task_targets(svc, identity.id, *loser, *winner)?;
        // The loser id will never reappear: hard-delete its binding.
        svc.store.delete_binding(identity.id, *loser)?;
        info!(
            identity_id = identity.id,
            loser, winner, "destination migrated to supergroup"
        );
    }

    let mut keep = Vec::with_capacity(resolution.active.len());
    for dest in &resolution.active {
        svc.store
            .upsert_binding(identity.id, dest.id, &dest.name, &dest.kind.to_string())?;
        keep.push(dest.id);
    }

    // Anything previously known but absent from this cycle is soft-deleted.
    svc.store.deactivate_bindings_except(identity.id, &keep)?;

    Ok(svc.store.count_active_bindings(identity.id)?)
}

/// Classify the raw remote listing: drop non-groups and banned destinations,
/// then resolve same-name group/supergroup pairs in favour of the supergroup.
///
/// Two destinations of the *same* kind sharing a name are left alone — only
/// the group → supergroup shape indicates a platform migration.
fn resolve(destinations: Vec<Destination>) -> Resolution {
    let mut by_name: HashMap<String, Vec<Destination>> = HashMap::new();
    for dest in destinations {
        if !dest.can_send || dest.kind == DestinationKind::Other {
            continue;
        }
        by_name.entry(dest.name.clone()).or_default().push(dest);
    }

    let mut active = Vec::new();
    let mut migrations = Vec::new();

    for (_, mut bucket) in by_name {
        // Deterministic winner choice when several candidates exist.
        bucket.sort_by_key(|d| d.id);
        let has_supergroup = bucket
            .iter()
            .any(|d| d.kind == DestinationKind::Supergroup);

        if !has_supergroup {
            active.extend(bucket);
            continue;
        }

        let winner_id = bucket
            .iter()
            .find(|d| d.kind == DestinationKind::Supergroup)
            .map(|d| d.id)
            .unwrap_or_default();

        for dest in bucket {
            match dest.kind {
                // Plain groups shadowed by a same-name supergroup lost the
                // migration; fold them into the winner.
                DestinationKind::Group => migrations.push((dest.id, winner_id)),
                _ => active.push(dest),
            }
        }
    }

    active.sort_by_key(|d| d.id);
    migrations.sort();
    Resolution { active, migrations }
}

/// Rewrite every task of `identity_id` whose target list mentions `loser`,
/// substituting `winner` and deduplicating.
fn migrate_task_targets(
    svc: &Services,
    identity_id: IdentityId,
    loser: DestinationId,
    winner: DestinationId,
) -> Result<usize> {
    let mut migrated = 0;
    for task in svc.store.list_all_tasks(identity_id)? {
        if !task.targets.contains(&loser) {
            continue;
        }
        let mut seen = std::collections::HashSet::new();
        let targets: Vec<DestinationId> = task
            .targets
            .iter()
            .map(|&t| if t == loser { winner } else { t })
            .filter(|t| seen.insert(*t))
            .collect();
        svc.store.update_task_targets(&task.id, &targets)?;
        migrated += 1;
        debug!(task_id = %task.id, loser, winner, "task targets migrated");
    }
    Ok(migrated)
}

fn is_auth_revoked(e: &DispatchError) -> bool {
    match e {
        DispatchError::Bridge(b) => b.is_auth_revoked(),
        DispatchError::Channel(c) => c.is_auth_revoked(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(id: i64, name: &str, kind: DestinationKind) -> Destination {
        Destination {
            id,
            name: name.into(),
            kind,
            can_send: true,
        }
    }

    #[test]
    fn supergroup_wins_same_name_pair() {
        let r = resolve(vec![
            dest(100, "Foo", DestinationKind::Group),
            dest(200, "Foo", DestinationKind::Supergroup),
        ]);
        assert_eq!(r.migrations, vec![(100, 200)]);
        assert_eq!(r.active.len(), 1);
        assert_eq!(r.active[0].id, 200);
    }

    #[test]
    fn unique_names_pass_through() {
        let r = resolve(vec![
            dest(1, "A", DestinationKind::Group),
            dest(2, "B", DestinationKind::Supergroup),
        ]);
        assert!(r.migrations.is_empty());
        assert_eq!(r.active.len(), 2);
    }

    #[test]
    fn same_kind_name_collision_is_not_a_migration() {
        let r = resolve(vec![
            dest(1, "Dup", DestinationKind::Group),
            dest(2, "Dup", DestinationKind::Group),
        ]);
        assert!(r.migrations.is_empty());
        assert_eq!(r.active.len(), 2);
    }

    #[test]
    fn banned_and_non_group_destinations_are_dropped() {
        let mut banned = dest(1, "A", DestinationKind::Group);
        banned.can_send = false;
        let r = resolve(vec![
            banned,
            dest(2, "B", DestinationKind::Other),
            dest(3, "C", DestinationKind::Group),
        ]);
        assert_eq!(r.active.len(), 1);
        assert_eq!(r.active[0].id, 3);
    }
}
