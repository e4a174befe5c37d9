/// Authorization tests
///
/// Permission checks with the grant cache, and role assignment currency.
/// Run with: cargo test --test authorization_tests

use chrono::Utc;
use forumdb::cache::{self, Cache};
use forumdb::{
    Actor, AuthorizationConfig, Currency, Database, DatabaseConfig, MemoryCache,
    PermissionResolver, Reply, RoleAssignments, Row, ScriptedConnector, Value,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Grants = Arc<Mutex<BTreeSet<(i64, String, String)>>>;

/// Answers the permission query from `grants` (role id, controller, method).
fn permission_connector(grants: Grants) -> Arc<ScriptedConnector> {
    Arc::new(ScriptedConnector::new(move |sql, params| {
        assert!(sql.contains("ra.is_current"), "unexpected statement: {}", sql);
        let controller = params[0].as_str().unwrap_or_default().to_string();
        let method = params[1].as_str().unwrap_or_default().to_string();
        let role_id = params[3].as_i64().unwrap_or_default();
        let granted = grants
            .lock()
            .unwrap()
            .contains(&(role_id, controller, method));
        let rows = if granted {
            vec![Row::from_pairs([
                ("id", Value::Integer(role_id)),
                ("code", Value::from("moderator")),
            ])]
        } else {
            Vec::new()
        };
        Ok(Reply::Rows(rows))
    }))
}

fn moderator() -> Actor {
    Actor {
        id: 7,
        role: "moderator".into(),
        role_id: 3,
    }
}

struct Fixture {
    connector: Arc<ScriptedConnector>,
    db: Database,
    cache: Arc<MemoryCache>,
    resolver: PermissionResolver,
    grants: Grants,
}

async fn fixture(config: AuthorizationConfig) -> Fixture {
    let grants: Grants = Arc::new(Mutex::new(BTreeSet::new()));
    let connector = permission_connector(grants.clone());
    let db = Database::connect(DatabaseConfig::default(), connector.clone())
        .await
        .unwrap();
    let cache = Arc::new(MemoryCache::default());
    let resolver = PermissionResolver::new(cache.clone(), config);
    Fixture {
        connector,
        db,
        cache,
        resolver,
        grants,
    }
}

fn grant(grants: &Grants, role_id: i64, controller: &str, method: &str) {
    grants
        .lock()
        .unwrap()
        .insert((role_id, controller.to_string(), method.to_string()));
}

#[tokio::test]
async fn test_super_role_skips_lookup() {
    let mut f = fixture(AuthorizationConfig::default()).await;
    let admin = Actor {
        id: 1,
        role: "superadmin".into(),
        role_id: 1,
    };

    assert!(f.resolver.is_allowed(&mut f.db, &admin, "categories", "delete").await.unwrap());
    assert!(f.connector.statements().is_empty());
    assert!(f.cache.is_empty());
}

#[tokio::test]
async fn test_grant_is_cached() {
    let mut f = fixture(AuthorizationConfig::default()).await;
    grant(&f.grants, 3, "categories", "update");
    let actor = moderator();

    assert!(f.resolver.is_allowed(&mut f.db, &actor, "categories", "update").await.unwrap());
    let query = &f.connector.queries()[0];
    assert_eq!(
        query.params,
        vec![
            Value::from("categories"),
            Value::from("update"),
            Value::Integer(7),
            Value::Integer(3)
        ]
    );

    let key = cache::permission_key("moderator", 7, "categories", "update");
    assert_eq!(f.cache.get(&key).await.unwrap().as_deref(), Some("true"));
    assert_eq!(
        f.cache.smembers(&cache::actor_permissions_key(7)).await.unwrap(),
        vec![key]
    );

    f.connector.clear();
    assert!(f.resolver.is_allowed(&mut f.db, &actor, "categories", "update").await.unwrap());
    assert!(f.connector.statements().is_empty());
}

#[tokio::test]
async fn test_denial_is_not_cached() {
    let mut f = fixture(AuthorizationConfig::default()).await;
    let actor = moderator();

    assert!(!f.resolver.is_allowed(&mut f.db, &actor, "categories", "delete").await.unwrap());
    assert!(f.cache.is_empty());

    grant(&f.grants, 3, "categories", "delete");
    assert!(f.resolver.is_allowed(&mut f.db, &actor, "categories", "delete").await.unwrap());
    assert_eq!(f.connector.queries().len(), 2);
}

#[tokio::test]
async fn test_invalidate_actor_drops_cached_grants() {
    let mut f = fixture(AuthorizationConfig::default()).await;
    grant(&f.grants, 3, "categories", "update");
    grant(&f.grants, 3, "categories", "create");
    let actor = moderator();

    f.resolver.is_allowed(&mut f.db, &actor, "categories", "update").await.unwrap();
    f.resolver.is_allowed(&mut f.db, &actor, "categories", "create").await.unwrap();

    f.grants.lock().unwrap().clear();
    f.resolver.invalidate_actor(actor.id).await.unwrap();
    assert!(f.cache.is_empty());

    assert!(!f.resolver.is_allowed(&mut f.db, &actor, "categories", "update").await.unwrap());
}

#[tokio::test]
async fn test_grant_expires_after_ttl() {
    let mut f = fixture(AuthorizationConfig {
        permission_ttl: Some(Duration::from_millis(30)),
        ..AuthorizationConfig::default()
    })
    .await;
    grant(&f.grants, 3, "routes", "index");
    let actor = moderator();

    f.resolver.is_allowed(&mut f.db, &actor, "routes", "index").await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    f.resolver.is_allowed(&mut f.db, &actor, "routes", "index").await.unwrap();

    assert_eq!(f.connector.queries().len(), 2);
}

/// Answers the statements issued by [`RoleAssignments`].
fn assignment_connector() -> Arc<ScriptedConnector> {
    Arc::new(ScriptedConnector::new(|sql, params| {
        let now = Value::Timestamp(Utc::now());
        if sql.starts_with("insert into user_role_assignments ") {
            return Ok(Reply::Rows(vec![Row::from_pairs([
                ("id", Value::Integer(42)),
                ("inserted_at", now),
            ])]));
        }
        if sql.starts_with("insert into user_role_assignment_invalidations") {
            return Ok(Reply::Rows(vec![Row::from_pairs([("inserted_at", now)])]));
        }
        if sql.starts_with("select user_id from user_role_assignments") {
            assert_eq!(params, &[Value::Integer(42)]);
            return Ok(Reply::Rows(vec![Row::from_pairs([("user_id", Value::Integer(7))])]));
        }
        if sql.starts_with("select * from user_role_assignments where user_id") {
            let row = |id: i64| {
                Row::from_pairs([
                    ("id", Value::Integer(id)),
                    ("user_id", Value::Integer(7)),
                    ("role_id", Value::Integer(3)),
                    ("source_user_id", Value::Null),
                    ("is_current", Value::Boolean(id == 42)),
                    ("inserted_at", Value::Timestamp(Utc::now())),
                ])
            };
            return Ok(Reply::Rows(vec![row(40), row(42)]));
        }
        if sql.starts_with("select i.* from user_role_assignment_invalidations") {
            return Ok(Reply::Rows(vec![Row::from_pairs([
                ("assignment_id", Value::Integer(42)),
                ("source_user_id", Value::Integer(1)),
                ("inserted_at", Value::Timestamp(Utc::now())),
            ])]));
        }
        Ok(Reply::Affected(1))
    }))
}

#[tokio::test]
async fn test_assign_supersedes_and_invalidates_cache() {
    let connector = assignment_connector();
    let mut db = Database::connect(DatabaseConfig::default(), connector.clone())
        .await
        .unwrap();
    let cache = Arc::new(MemoryCache::default());
    let resolver = Arc::new(PermissionResolver::new(cache.clone(), AuthorizationConfig::default()));
    let assignments = RoleAssignments::new(resolver);

    let stale = cache::permission_key("user", 7, "categories", "create");
    cache.set(&stale, "true", None).await.unwrap();
    cache.sadd(&cache::actor_permissions_key(7), &stale).await.unwrap();

    let assignment = assignments.assign(&mut db, 7, 3, Some(1)).await.unwrap();
    assert_eq!(assignment.id, 42);
    assert!(assignment.is_current);

    let sql = connector
        .statements()
        .into_iter()
        .map(|s| s.sql)
        .collect::<Vec<_>>();
    assert_eq!(
        sql,
        vec![
            "begin",
            "update user_role_assignments set is_current = false where user_id = $1 and is_current",
            "insert into user_role_assignments (user_id, role_id, source_user_id, is_current ) values ($1, $2, $3, $4 ) returning id, inserted_at",
            "commit",
        ]
    );
    assert!(cache.get(&stale).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalidate_records_and_clears_flag() {
    let connector = assignment_connector();
    let mut db = Database::connect(DatabaseConfig::default(), connector.clone())
        .await
        .unwrap();
    let cache = Arc::new(MemoryCache::default());
    let resolver = Arc::new(PermissionResolver::new(cache.clone(), AuthorizationConfig::default()));
    let assignments = RoleAssignments::new(resolver);

    let invalidation = assignments.invalidate(&mut db, 42, Some(1)).await.unwrap();
    assert_eq!(invalidation.assignment_id, 42);

    let queries = connector.queries();
    assert_eq!(queries.len(), 3);
    assert_eq!(
        queries[1].sql,
        "insert into user_role_assignment_invalidations (assignment_id, source_user_id ) values ($1, $2 ) returning inserted_at"
    );
    assert_eq!(queries[1].params, vec![Value::Integer(42), Value::Integer(1)]);
    assert_eq!(
        queries[2].sql,
        "update user_role_assignments set is_current = false where id = $1"
    );

    let history = assignments.history(&mut db, 7).await.unwrap();
    let currency = history.iter().map(|s| s.currency).collect::<Vec<_>>();
    assert_eq!(currency, vec![Currency::Superseded, Currency::Invalidated]);
}
