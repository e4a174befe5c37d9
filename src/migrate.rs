//! Versioned SQL migrations.
//!
//! A directory holds `NN.name.up.sql` files with optional matching
//! `NN.name.down.sql` files. Applied versions are tracked in the
//! `migrations` table; each migration runs in its own transaction.

use crate::core::{PersistError, Result, Value};
use crate::executor::Database;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

const CREATE_TABLE: &str = "create table if not exists migrations (\
     version integer primary key, \
     name text not null, \
     applied_at timestamptz not null default now())";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub name: String,
    pub up: String,
    pub down: Option<String>,
}

enum Direction {
    Up,
    Down,
}

fn parse_file_name(file_name: &str) -> Option<(u32, String, Direction)> {
    let (stem, direction) = if let Some(stem) = file_name.strip_suffix(".up.sql") {
        (stem, Direction::Up)
    } else if let Some(stem) = file_name.strip_suffix(".down.sql") {
        (stem, Direction::Down)
    } else {
        return None;
    };
    let (version, name) = stem.split_once('.')?;
    Some((version.parse().ok()?, name.to_string(), direction))
}

/// Migrations found in `dir`, ordered by version.
pub fn load_migrations(dir: &Path) -> Result<Vec<Migration>> {
    let mut found = BTreeMap::<u32, Migration>::new();
    let mut downs = BTreeMap::<u32, (String, String)>::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((version, name, direction)) = parse_file_name(file_name) else {
            continue;
        };
        let sql = std::fs::read_to_string(&path)?;

        match direction {
            Direction::Up => {
                if let Some(existing) = found.get(&version) {
                    return Err(PersistError::Config(format!(
                        "migration version {} used by both '{}' and '{}'",
                        version, existing.name, name
                    )));
                }
                found.insert(
                    version,
                    Migration {
                        version,
                        name,
                        up: sql,
                        down: None,
                    },
                );
            }
            Direction::Down => {
                downs.insert(version, (name, sql));
            }
        }
    }

    for (version, (name, sql)) in downs {
        let migration = found.get_mut(&version).ok_or_else(|| {
            PersistError::Config(format!("down migration {}.{} has no up file", version, name))
        })?;
        migration.down = Some(sql);
    }

    Ok(found.into_values().collect())
}

pub async fn applied_versions(db: &mut Database) -> Result<BTreeSet<u32>> {
    db.batch_execute(CREATE_TABLE).await?;
    let rows = db
        .query("select version from migrations order by version", &[])
        .await?;
    rows.iter()
        .map(|row| {
            let version = row.try_i64(0)?;
            u32::try_from(version)
                .map_err(|_| PersistError::Decode(format!("invalid migration version {}", version)))
        })
        .collect()
}

/// Applies every pending migration in version order. Returns the applied
/// versions.
pub async fn migrate_up(db: &mut Database, migrations: &[Migration]) -> Result<Vec<u32>> {
    let applied = applied_versions(db).await?;
    let mut done = Vec::new();

    for migration in migrations.iter().filter(|m| !applied.contains(&m.version)) {
        let migration = migration.clone();
        let version = migration.version;
        db.transaction(move |tx| {
            Box::pin(async move {
                tx.batch_execute(&migration.up).await?;
                tx.execute(
                    "insert into migrations (version, name) values ($1, $2)",
                    &[Value::from(i64::from(migration.version)), Value::from(migration.name.clone())],
                )
                .await?;
                info!(version = migration.version, name = %migration.name, "migration applied");
                Ok(())
            })
        })
        .await?;
        done.push(version);
    }

    Ok(done)
}

/// Reverts the newest `steps` applied migrations.
pub async fn migrate_down(db: &mut Database, migrations: &[Migration], steps: usize) -> Result<Vec<u32>> {
    let applied = applied_versions(db).await?;
    let by_version = migrations
        .iter()
        .map(|m| (m.version, m))
        .collect::<BTreeMap<_, _>>();
    let mut done = Vec::new();

    for version in applied.iter().rev().take(steps) {
        let migration = (*by_version.get(version).ok_or_else(|| {
            PersistError::Config(format!("applied migration {} has no file", version))
        })?)
        .clone();
        let down = migration.down.clone().ok_or_else(|| {
            PersistError::Config(format!(
                "migration {}.{} has no down file",
                migration.version, migration.name
            ))
        })?;

        db.transaction(move |tx| {
            Box::pin(async move {
                tx.batch_execute(&down).await?;
                tx.execute(
                    "delete from migrations where version = $1",
                    &[Value::from(i64::from(migration.version))],
                )
                .await?;
                info!(version = migration.version, name = %migration.name, "migration reverted");
                Ok(())
            })
        })
        .await?;
        done.push(*version);
    }

    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_name() {
        let (version, name, direction) = parse_file_name("03.create_roles.up.sql").unwrap();
        assert_eq!(version, 3);
        assert_eq!(name, "create_roles");
        assert!(matches!(direction, Direction::Up));

        assert!(matches!(
            parse_file_name("03.create_roles.down.sql"),
            Some((3, _, Direction::Down))
        ));
        assert!(parse_file_name("README.md").is_none());
        assert!(parse_file_name("x.create.up.sql").is_none());
    }
}
