//! Role assignment currency.
//!
//! Assignments are append-only. The `is_current` column marks the one row per
//! user that is in effect; it is only changed inside a transaction together
//! with the row that supersedes or invalidates it.

use super::PermissionResolver;
use crate::constraint::map_constraint;
use crate::core::{PersistError, Result, Value};
use crate::executor::Database;
use crate::models::{UserRoleAssignment, UserRoleAssignmentInvalidation};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Active,
    /// A later assignment exists for the same user.
    Superseded,
    /// An invalidation row references the assignment.
    Invalidated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentState {
    pub assignment: UserRoleAssignment,
    pub currency: Currency,
}

/// Currency of every assignment from history alone: the greatest id per user
/// is active unless invalidated.
pub fn resolve_currency(
    assignments: &[UserRoleAssignment],
    invalidations: &[UserRoleAssignmentInvalidation],
) -> Vec<AssignmentState> {
    let invalidated = invalidations
        .iter()
        .map(|i| i.assignment_id)
        .collect::<BTreeSet<_>>();

    let mut latest = BTreeMap::<i64, i64>::new();
    for assignment in assignments {
        let entry = latest.entry(assignment.user_id).or_insert(assignment.id);
        *entry = (*entry).max(assignment.id);
    }

    assignments
        .iter()
        .map(|assignment| {
            let currency = if invalidated.contains(&assignment.id) {
                Currency::Invalidated
            } else if latest.get(&assignment.user_id) != Some(&assignment.id) {
                Currency::Superseded
            } else {
                Currency::Active
            };
            AssignmentState {
                assignment: assignment.clone(),
                currency,
            }
        })
        .collect()
}

/// The active assignments, at most one per user.
pub fn resolve_current<'a>(
    assignments: &'a [UserRoleAssignment],
    invalidations: &[UserRoleAssignmentInvalidation],
) -> Vec<&'a UserRoleAssignment> {
    let states = resolve_currency(assignments, invalidations);
    assignments
        .iter()
        .zip(states)
        .filter(|(_, state)| state.currency == Currency::Active)
        .map(|(assignment, _)| assignment)
        .collect()
}

pub struct RoleAssignments {
    resolver: Arc<PermissionResolver>,
}

impl RoleAssignments {
    pub fn new(resolver: Arc<PermissionResolver>) -> Self {
        Self { resolver }
    }

    pub async fn current(&self, db: &mut Database, user_id: i64) -> Result<Option<UserRoleAssignment>> {
        let rows = db
            .query_as::<UserRoleAssignment>(
                "select * from user_role_assignments where user_id = $1 and is_current",
                &[Value::from(user_id)],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Makes `role_id` the user's current role, superseding the previous one.
    pub async fn assign(
        &self,
        db: &mut Database,
        user_id: i64,
        role_id: i64,
        source_user_id: Option<i64>,
    ) -> Result<UserRoleAssignment> {
        let assignment = db
            .transaction(move |tx| {
                Box::pin(async move {
                    tx.execute(
                        "update user_role_assignments set is_current = false where user_id = $1 and is_current",
                        &[Value::from(user_id)],
                    )
                    .await?;

                    let mut assignment = UserRoleAssignment::new(user_id, role_id);
                    assignment.source_user_id = source_user_id;
                    assignment.is_current = true;
                    tx.insert(&mut assignment, "id, inserted_at")
                        .await
                        .map_err(map_constraint::<UserRoleAssignment>)?;
                    Ok(assignment)
                })
            })
            .await?;

        self.resolver.invalidate_actor(user_id).await?;
        info!(user = user_id, role = role_id, assignment = assignment.id, "role assigned");
        Ok(assignment)
    }

    /// Revokes an assignment; the user is left without a current role.
    pub async fn invalidate(
        &self,
        db: &mut Database,
        assignment_id: i64,
        source_user_id: Option<i64>,
    ) -> Result<UserRoleAssignmentInvalidation> {
        let (user_id, invalidation) = db
            .transaction(move |tx| {
                Box::pin(async move {
                    let row = tx
                        .query_row(
                            "select user_id from user_role_assignments where id = $1 for update",
                            &[Value::from(assignment_id)],
                        )
                        .await?;
                    let user_id = row.try_i64(0)?;

                    let mut invalidation = UserRoleAssignmentInvalidation::new(assignment_id);
                    invalidation.source_user_id = source_user_id;
                    tx.insert(&mut invalidation, "inserted_at")
                        .await
                        .map_err(map_constraint::<UserRoleAssignmentInvalidation>)?;

                    tx.execute(
                        "update user_role_assignments set is_current = false where id = $1",
                        &[Value::from(assignment_id)],
                    )
                    .await?;
                    Ok((user_id, invalidation))
                })
            })
            .await?;

        self.resolver.invalidate_actor(user_id).await?;
        info!(user = user_id, assignment = assignment_id, "role assignment invalidated");
        Ok(invalidation)
    }

    /// Every assignment of the user with its currency, oldest first.
    pub async fn history(&self, db: &mut Database, user_id: i64) -> Result<Vec<AssignmentState>> {
        let assignments = db
            .query_as::<UserRoleAssignment>(
                "select * from user_role_assignments where user_id = $1 order by id",
                &[Value::from(user_id)],
            )
            .await?;
        let invalidations = db
            .query_as::<UserRoleAssignmentInvalidation>(
                "select i.* from user_role_assignment_invalidations as i \
                 inner join user_role_assignments as a on a.id = i.assignment_id \
                 where a.user_id = $1",
                &[Value::from(user_id)],
            )
            .await?;
        Ok(resolve_currency(&assignments, &invalidations))
    }

    /// Recomputes every `is_current` flag from history. Returns the number of
    /// active assignments.
    pub async fn backfill(&self, db: &mut Database) -> Result<usize> {
        let active = db
            .transaction(|tx| {
                Box::pin(async move {
                    let assignments = tx
                        .query_as::<UserRoleAssignment>(
                            "select * from user_role_assignments order by id for update",
                            &[],
                        )
                        .await?;
                    let invalidations = tx
                        .query_as::<UserRoleAssignmentInvalidation>(
                            "select * from user_role_assignment_invalidations",
                            &[],
                        )
                        .await?;

                    tx.execute(
                        "update user_role_assignments set is_current = false where is_current",
                        &[],
                    )
                    .await?;
                    let current = resolve_current(&assignments, &invalidations)
                        .into_iter()
                        .map(|a| (a.id, a.user_id))
                        .collect::<Vec<_>>();
                    for (id, _) in &current {
                        let updated = tx
                            .execute(
                                "update user_role_assignments set is_current = true where id = $1",
                                &[Value::from(*id)],
                            )
                            .await?;
                        if updated != 1 {
                            return Err(PersistError::Transaction(format!(
                                "assignment {} vanished during backfill",
                                id
                            )));
                        }
                    }
                    Ok(current)
                })
            })
            .await?;

        for (_, user_id) in &active {
            self.resolver.invalidate_actor(*user_id).await?;
        }
        info!(active = active.len(), "role assignment currency backfilled");
        Ok(active.len())
    }
}
