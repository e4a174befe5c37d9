use crate::cache::{self, Cache};
use crate::constraint::map_constraint;
use crate::core::{PersistError, Result};
use crate::executor::Database;
use crate::models::{Role, RolePermission, Route};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// controller -> role code -> methods
pub type RouteTable = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub routes: Vec<String>,
    pub permissions: usize,
}

/// Reads a route table from a JSON file.
pub fn load_routes(path: &Path) -> Result<RouteTable> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Creates the routes missing from the `routes` table along with their role
/// permissions. Routes that already exist are left untouched.
pub async fn seed_role_permissions(
    db: &mut Database,
    cache: Arc<dyn Cache>,
    table: RouteTable,
) -> Result<SeedReport> {
    let created = db
        .transaction(move |tx| {
            Box::pin(async move {
                let roles = tx
                    .query_as::<Role>("select * from roles", &[])
                    .await?
                    .into_iter()
                    .map(|role| (role.code, role.id))
                    .collect::<BTreeMap<_, _>>();

                let existing = tx
                    .query_as::<Route>("select * from routes", &[])
                    .await?
                    .into_iter()
                    .map(|route| route.name)
                    .collect::<BTreeSet<_>>();

                let mut report = SeedReport::default();
                let mut routes = Vec::new();
                for (controller, grants) in table {
                    if existing.contains(&controller) {
                        continue;
                    }

                    let mut route = Route::new(&controller);
                    tx.insert(&mut route, "id, inserted_at")
                        .await
                        .map_err(map_constraint::<Route>)?;
                    info!(route = %route.name, "generated route");

                    for (code, methods) in grants {
                        let role_id = *roles.get(&code).ok_or_else(|| {
                            PersistError::Config(format!(
                                "route table names unknown role '{}'",
                                code
                            ))
                        })?;
                        for method in methods {
                            let mut permission = RolePermission::new(role_id, &controller, &method);
                            tx.insert(&mut permission, "id, inserted_at")
                                .await
                                .map_err(map_constraint::<RolePermission>)?;
                            report.permissions += 1;
                            info!(role = %code, %controller, %method, "generated permission");
                        }
                    }

                    report.routes.push(route.name.clone());
                    routes.push(route);
                }
                Ok((report, routes))
            })
        })
        .await?;

    let (report, routes) = created;
    for route in &routes {
        let json = serde_json::to_string(route)?;
        if let Err(err) = cache.set(&cache::route_key(&route.name), &json, None).await {
            warn!(error = %err, route = %route.name, "route cache write failed");
        }
    }
    Ok(report)
}
