/// Migration and seed tests
///
/// Run with: cargo test --test migrate_tests

use forumdb::cache::{self, Cache};
use forumdb::migrate::{load_migrations, migrate_down, migrate_up};
use forumdb::models::Route;
use forumdb::tasks::{RouteTable, load_routes, seed_role_permissions};
use forumdb::{Database, DatabaseConfig, MemoryCache, PersistError, Reply, Row, ScriptedConnector, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

/// Tracks the `migrations` table in memory.
fn migrations_connector(applied: &[i64]) -> Arc<ScriptedConnector> {
    let versions = Arc::new(Mutex::new(applied.iter().copied().collect::<BTreeSet<_>>()));
    Arc::new(ScriptedConnector::new(move |sql, params| {
        let mut versions = versions.lock().unwrap();
        if sql.starts_with("select version from migrations") {
            let rows = versions
                .iter()
                .map(|v| Row::from_pairs([("version", Value::Integer(*v))]))
                .collect();
            return Ok(Reply::Rows(rows));
        }
        if sql.starts_with("insert into migrations") {
            versions.insert(params[0].as_i64().unwrap_or_default());
        } else if sql.starts_with("delete from migrations") {
            versions.remove(&params[0].as_i64().unwrap_or_default());
        }
        Ok(Reply::Affected(1))
    }))
}

fn write(dir: &Path, name: &str, sql: &str) {
    std::fs::write(dir.join(name), sql).unwrap();
}

#[test]
fn test_bundled_migrations_are_complete() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations/postgres");
    let migrations = load_migrations(&dir).unwrap();

    let versions = migrations.iter().map(|m| m.version).collect::<Vec<_>>();
    assert_eq!(versions, vec![1, 2, 3, 4, 5, 6]);
    assert!(migrations.iter().all(|m| m.down.is_some()));
    assert_eq!(migrations[5].name, "create_categories");
    assert!(migrations[5].up.contains("categories_slug_unique"));
}

#[test]
fn test_load_rejects_inconsistent_directories() {
    let dir = tempdir().unwrap();
    write(dir.path(), "01.create_a.up.sql", "create table a ();");
    write(dir.path(), "01.create_b.up.sql", "create table b ();");
    assert!(matches!(load_migrations(dir.path()), Err(PersistError::Config(_))));

    let dir = tempdir().unwrap();
    write(dir.path(), "02.create_c.down.sql", "drop table c;");
    assert!(matches!(load_migrations(dir.path()), Err(PersistError::Config(_))));
}

#[tokio::test]
async fn test_migrate_up_applies_pending_only() {
    let dir = tempdir().unwrap();
    write(dir.path(), "01.create_users.up.sql", "create table users (id bigserial);");
    write(dir.path(), "02.create_roles.up.sql", "create table roles (id bigserial);");
    write(dir.path(), "02.create_roles.down.sql", "drop table roles;");
    write(dir.path(), "notes.txt", "ignored");
    let migrations = load_migrations(dir.path()).unwrap();

    let connector = migrations_connector(&[1]);
    let mut db = Database::connect(DatabaseConfig::default(), connector.clone())
        .await
        .unwrap();

    assert_eq!(migrate_up(&mut db, &migrations).await.unwrap(), vec![2]);
    assert!(migrate_up(&mut db, &migrations).await.unwrap().is_empty());

    let statements = connector.statements();
    let sql = statements.iter().map(|s| s.sql.as_str()).collect::<Vec<_>>();
    let up = sql
        .iter()
        .position(|s| *s == "create table roles (id bigserial);")
        .unwrap();
    assert_eq!(sql[up - 1], "begin");
    assert!(sql[up + 1].starts_with("insert into migrations"));
    assert_eq!(sql[up + 2], "commit");
    assert!(!sql.contains(&"create table users (id bigserial);"));
}

#[tokio::test]
async fn test_migrate_down_reverts_newest() {
    let dir = tempdir().unwrap();
    write(dir.path(), "01.create_users.up.sql", "create table users ();");
    write(dir.path(), "01.create_users.down.sql", "drop table users;");
    write(dir.path(), "02.create_roles.up.sql", "create table roles ();");
    write(dir.path(), "02.create_roles.down.sql", "drop table roles;");
    let migrations = load_migrations(dir.path()).unwrap();

    let connector = migrations_connector(&[1, 2]);
    let mut db = Database::connect(DatabaseConfig::default(), connector.clone())
        .await
        .unwrap();

    assert_eq!(migrate_down(&mut db, &migrations, 1).await.unwrap(), vec![2]);
    assert_eq!(migrate_down(&mut db, &migrations, 5).await.unwrap(), vec![1]);
    assert!(migrate_down(&mut db, &migrations, 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_migrate_down_without_down_file_fails() {
    let dir = tempdir().unwrap();
    write(dir.path(), "01.create_users.up.sql", "create table users ();");
    let migrations = load_migrations(dir.path()).unwrap();

    let connector = migrations_connector(&[1]);
    let mut db = Database::connect(DatabaseConfig::default(), connector)
        .await
        .unwrap();

    let err = migrate_down(&mut db, &migrations, 1).await.unwrap_err();
    assert!(matches!(err, PersistError::Config(_)));
}

/// Roles seeded by the migrations; `users` already has its route.
fn seed_connector() -> Arc<ScriptedConnector> {
    let next_id = Arc::new(Mutex::new(0i64));
    Arc::new(ScriptedConnector::new(move |sql, _| {
        if sql.starts_with("select * from roles") {
            let rows = ["superadmin", "admin", "moderator", "user"]
                .iter()
                .enumerate()
                .map(|(i, code)| {
                    Row::from_pairs([
                        ("id", Value::Integer(i as i64 + 1)),
                        ("code", Value::from(*code)),
                        ("name", Value::from(*code)),
                    ])
                })
                .collect();
            return Ok(Reply::Rows(rows));
        }
        if sql.starts_with("select * from routes") {
            return Ok(Reply::Rows(vec![Row::from_pairs([
                ("id", Value::Integer(100)),
                ("name", Value::from("users")),
            ])]));
        }
        if sql.starts_with("insert") {
            let mut next_id = next_id.lock().unwrap();
            *next_id += 1;
            return Ok(Reply::Rows(vec![Row::from_pairs([(
                "id",
                Value::Integer(*next_id),
            )])]));
        }
        Ok(Reply::Affected(0))
    }))
}

#[tokio::test]
async fn test_seed_creates_missing_routes() {
    let table = load_routes(&Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations/routes.json")).unwrap();
    let connector = seed_connector();
    let mut db = Database::connect(DatabaseConfig::default(), connector.clone())
        .await
        .unwrap();
    let cache = Arc::new(MemoryCache::default());

    let report = seed_role_permissions(&mut db, cache.clone(), table).await.unwrap();

    assert_eq!(report.routes, vec!["categories", "user_role_assignments"]);
    assert_eq!(report.permissions, 14);

    let permission_inserts = connector
        .queries()
        .into_iter()
        .filter(|s| s.sql.starts_with("insert into role_permissions"))
        .collect::<Vec<_>>();
    assert_eq!(permission_inserts.len(), 14);
    assert_eq!(
        permission_inserts[0].sql,
        "insert into role_permissions (role_id, controller, method ) values ($1, $2, $3 ) returning id, inserted_at"
    );
    assert_eq!(
        permission_inserts[0].params,
        vec![Value::Integer(2), Value::from("categories"), Value::from("index")]
    );

    let cached = cache
        .get(&cache::route_key("categories"))
        .await
        .unwrap()
        .unwrap();
    let route: Route = serde_json::from_str(&cached).unwrap();
    assert_eq!(route.name, "categories");
    assert!(cache.get(&cache::route_key("users")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_seed_with_unknown_role_rolls_back() {
    let table: RouteTable = BTreeMap::from([(
        "posts".to_string(),
        BTreeMap::from([("editor".to_string(), vec!["create".to_string()])]),
    )]);
    let connector = seed_connector();
    let mut db = Database::connect(DatabaseConfig::default(), connector.clone())
        .await
        .unwrap();

    let err = seed_role_permissions(&mut db, Arc::new(MemoryCache::default()), table)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::Config(_)));

    let statements = connector.statements();
    assert_eq!(statements.last().map(|s| s.sql.as_str()), Some("rollback"));
    assert!(!statements.iter().any(|s| s.sql == "commit"));
}
