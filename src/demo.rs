//! Demo `user.*` intents backed by an in-memory store.
//!
//! Reachable over every protocol, e.g. `POST /users`, `UserService/CreateUser`
//! or `{"intent": "user.create"}` on the WebSocket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};

use crate::aggregator::{Aggregator, AggregatorError};
use crate::model::Scheme;
use crate::registry::{AccessPolicy, Handler, HandlerError, Invocation};

/// First id handed out is `FIRST_ID + 1`.
const FIRST_ID: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
}

/// Thread-safe user store.
#[derive(Debug)]
pub struct UserStore {
    users: DashMap<u64, User>,
    next_id: AtomicU64,
}

impl Default for UserStore {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicU64::new(FIRST_ID),
        }
    }
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn create(&self, name: &str, email: &str) -> Result<User, HandlerError> {
        let (name, email) = validate(Some(name), Some(email))?;
        let user = User {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            name,
            email,
        };
        self.users.insert(user.id, user.clone());
        tracing::info!(user_id = user.id, "User created");
        Ok(user)
    }

    pub fn get(&self, id: u64) -> Result<User, HandlerError> {
        self.users
            .get(&id)
            .map(|u| u.clone())
            .ok_or_else(|| HandlerError::not_found(format!("user {id}")))
    }

    pub fn update(&self, id: u64, name: Option<&str>, email: Option<&str>) -> Result<User, HandlerError> {
        let mut entry = self
            .users
            .get_mut(&id)
            .ok_or_else(|| HandlerError::not_found(format!("user {id}")))?;
        let name = name.unwrap_or(&entry.name).to_string();
        let email = email.unwrap_or(&entry.email).to_string();
        let (name, email) = validate(Some(&name), Some(&email))?;
        entry.name = name;
        entry.email = email;
        Ok(entry.clone())
    }

    pub fn delete(&self, id: u64) -> Result<User, HandlerError> {
        self.users
            .remove(&id)
            .map(|(_, user)| user)
            .ok_or_else(|| HandlerError::not_found(format!("user {id}")))
    }

    /// All users ordered by id.
    pub fn list(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    /// Case-insensitive substring match on `name` or `email`.
    pub fn search(&self, query: &str, field: &str) -> Vec<User> {
        let needle = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|u| {
                let value = if field == "email" { &u.email } else { &u.name };
                value.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

fn validate(name: Option<&str>, email: Option<&str>) -> Result<(String, String), HandlerError> {
    let mut fields = crate::error::FieldErrors::new();
    let name = name.map(str::trim).unwrap_or_default();
    let email = email.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        fields.insert("name".into(), "is required".into());
    }
    if !email.contains('@') {
        fields.insert("email".into(), "must be a valid address".into());
    }
    if !fields.is_empty() {
        return Err(HandlerError::Validation(fields));
    }
    Ok((name.to_string(), email.to_string()))
}

/// Ids arrive as strings from paths and as numbers from JSON bodies.
fn user_id(inv: &Invocation) -> Result<u64, HandlerError> {
    let parsed = match inv.payload().get("id") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => return Err(HandlerError::invalid("id", "is required")),
    };
    parsed.ok_or_else(|| HandlerError::invalid("id", "must be a positive integer"))
}

fn optional_str<'a>(inv: &'a Invocation, field: &str) -> Option<&'a str> {
    inv.payload().get(field).and_then(Value::as_str)
}

fn to_value<T: Serialize>(value: T) -> Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(|e| HandlerError::failed(e.to_string()))
}

pub fn register_demo_handlers(
    aggregator: &mut Aggregator,
    store: Arc<UserStore>,
) -> Result<(), AggregatorError> {
    fn handler<F>(store: &Arc<UserStore>, f: F) -> impl Handler
    where
        F: Fn(&UserStore, &Invocation) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        let store = Arc::clone(store);
        move |inv: &Invocation| f(&store, inv)
    }

    aggregator.register_handler(
        "user.create",
        handler(&store, |s, inv| {
            let user = s.create(
                optional_str(inv, "name").unwrap_or_default(),
                optional_str(inv, "email").unwrap_or_default(),
            )?;
            to_value(user)
        }),
    )?;
    aggregator.register_handler("user.get", handler(&store, |s, inv| to_value(s.get(user_id(inv)?)?)))?;
    aggregator.register_handler(
        "user.update",
        handler(&store, |s, inv| {
            let user = s.update(
                user_id(inv)?,
                optional_str(inv, "name"),
                optional_str(inv, "email"),
            )?;
            to_value(user)
        }),
    )?;
    aggregator.register_handler(
        "user.list",
        handler(&store, |s, _| Ok(json!({"users": s.list(), "count": s.len()}))),
    )?;
    aggregator.register_handler(
        "user.search",
        handler(&store, |s, inv| {
            let query = inv.require_str("q")?;
            let field = optional_str(inv, "searchBy").unwrap_or("name");
            Ok(json!({"query": query, "results": s.search(query, field)}))
        }),
    )?;
    // Destructive: not exposed on the WebSocket.
    aggregator.register_handler_with_access(
        "user.delete",
        handler(&store, |s, inv| to_value(s.delete(user_id(inv)?)?)),
        AccessPolicy::only([Scheme::HTTP, Scheme::RPC]),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_after_1000() {
        let store = UserStore::new();
        let ada = store.create("Ada", "ada@example.com").unwrap();
        let bob = store.create("Bob", "bob@example.com").unwrap();
        assert_eq!(ada.id, 1001);
        assert_eq!(bob.id, 1002);
    }

    #[test]
    fn test_create_validates_all_fields() {
        let store = UserStore::new();
        match store.create(" ", "nope") {
            Err(HandlerError::Validation(fields)) => {
                assert!(fields.contains_key("name"));
                assert!(fields.contains_key("email"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_and_delete() {
        let store = UserStore::new();
        let user = store.create("Ada", "ada@example.com").unwrap();

        let updated = store.update(user.id, Some("Ada L."), None).unwrap();
        assert_eq!(updated.name, "Ada L.");
        assert_eq!(updated.email, "ada@example.com");

        store.delete(user.id).unwrap();
        assert!(matches!(store.get(user.id), Err(HandlerError::NotFound(_))));
    }

    #[test]
    fn test_search_by_field() {
        let store = UserStore::new();
        store.create("Ada", "ada@math.org").unwrap();
        store.create("Bob", "bob@example.com").unwrap();
        assert_eq!(store.search("AD", "name").len(), 1);
        assert_eq!(store.search("example", "email").len(), 1);
        assert_eq!(store.search("example", "name").len(), 0);
    }

    #[test]
    fn test_user_id_accepts_string_and_number() {
        let inv = |payload: Value| {
            Invocation::new(
                crate::model::TraceId::new(),
                Scheme::HTTP,
                "user.get".into(),
                payload,
                None,
            )
        };
        assert_eq!(user_id(&inv(json!({"id": "1001"}))).unwrap(), 1001);
        assert_eq!(user_id(&inv(json!({"id": 1002}))).unwrap(), 1002);
        assert!(user_id(&inv(json!({}))).is_err());
        assert!(user_id(&inv(json!({"id": "abc"}))).is_err());
    }
}
