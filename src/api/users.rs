//! User endpoints (`/users`)

use anyhow::{Context, Result};
use serde::Serialize;

use super::client::ApiClient;
use super::envelope::{Envelope, Paginated};
use super::error::ApiError;
use super::items::{enum_label, truncate};
use super::query;
use crate::models::{User, UserDraft, UserRole, UserSearch, UserStatus};

pub struct UserService<'a> {
    client: &'a ApiClient,
}

#[derive(Serialize)]
struct StatusChange {
    status: UserStatus,
}

#[derive(Serialize)]
struct RoleChange {
    role: UserRole,
}

impl<'a> UserService<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, page: u64, limit: u64) -> Result<Paginated<User>, ApiError> {
        self.client
            .get(&query::with_query("/users", &query::page(page, limit)))
            .await
    }

    pub async fn get(&self, id: &str) -> Result<User, ApiError> {
        let env: Envelope<User> = self.client.get(&query::resource_path(&["users", id])?).await?;
        Ok(env.data)
    }

    /// Create a user from a partial profile.
    pub async fn create(&self, draft: &UserDraft) -> Result<User, ApiError> {
        let env: Envelope<User> = self.client.post("/users", draft).await?;
        Ok(env.data)
    }

    /// Only the fields set on `draft` are sent.
    pub async fn update(&self, id: &str, draft: &UserDraft) -> Result<User, ApiError> {
        let path = query::resource_path(&["users", id])?;
        let env: Envelope<User> = self.client.put(&path, draft).await?;
        Ok(env.data)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&query::resource_path(&["users", id])?)
            .await
    }

    /// Counts as reported by the server; the shape is not fixed.
    pub async fn statistics(&self) -> Result<serde_json::Value, ApiError> {
        let env: Envelope<serde_json::Value> = self.client.get("/users/statistics").await?;
        Ok(env.data)
    }

    pub async fn search(&self, criteria: &UserSearch) -> Result<Paginated<User>, ApiError> {
        let path = query::with_query("/users/search", &query::to_pairs(criteria));
        self.client.get(&path).await
    }

    pub async fn set_status(&self, id: &str, status: UserStatus) -> Result<User, ApiError> {
        let path = query::resource_path(&["users", id, "status"])?;
        let env: Envelope<User> = self.client.patch(&path, &StatusChange { status }).await?;
        Ok(env.data)
    }

    pub async fn set_role(&self, id: &str, role: UserRole) -> Result<User, ApiError> {
        let path = query::resource_path(&["users", id, "role"])?;
        let env: Envelope<User> = self.client.patch(&path, &RoleChange { role }).await?;
        Ok(env.data)
    }
}

// -- CLI output --

fn print_users(page: &Paginated<User>) {
    if page.data.is_empty() {
        println!("No users found.");
        return;
    }

    println!();
    println!(
        "{:<26} {:<20} {:<30} {:<8} {:<8}",
        "ID", "USERNAME", "EMAIL", "ROLE", "ACTIVE"
    );
    for user in &page.data {
        println!(
            "{:<26} {:<20} {:<30} {:<8} {:<8}",
            user.id,
            truncate(&user.username, 20),
            truncate(&user.email, 30),
            enum_label(&user.role),
            if user.is_active { "yes" } else { "no" },
        );
    }
    super::print_page_footer(page.pagination());
}

pub(crate) fn print_user(user: &User) {
    println!();
    println!("Name:     {}", user.display_name());
    println!("Username: {}", user.username);
    println!("Email:    {}", user.email);
    println!("Role:     {}", enum_label(&user.role));
    if let Some(status) = user.status {
        println!("Status:   {}", enum_label(&status));
    }
    println!("Active:   {}", if user.is_active { "yes" } else { "no" });
    println!("ID:       {}", user.id);
}

pub async fn list(client: &ApiClient, page: u64, limit: u64) -> Result<()> {
    let users = UserService::new(client)
        .list(page, limit)
        .await
        .context("Failed to list users")?;
    print_users(&users);
    Ok(())
}

pub async fn show(client: &ApiClient, id: &str) -> Result<()> {
    let user = UserService::new(client)
        .get(id)
        .await
        .with_context(|| format!("Failed to fetch user {}", id))?;
    print_user(&user);
    Ok(())
}

pub async fn create(client: &ApiClient, draft: &UserDraft) -> Result<()> {
    let user = UserService::new(client)
        .create(draft)
        .await
        .map_err(super::describe)
        .context("Failed to create user")?;
    println!("Created user {} ({}).", user.username, user.id);
    Ok(())
}

pub async fn update(client: &ApiClient, id: &str, draft: &UserDraft) -> Result<()> {
    let user = UserService::new(client)
        .update(id, draft)
        .await
        .map_err(super::describe)
        .with_context(|| format!("Failed to update user {}", id))?;
    print_user(&user);
    Ok(())
}

pub async fn statistics(client: &ApiClient) -> Result<()> {
    let stats = UserService::new(client)
        .statistics()
        .await
        .context("Failed to fetch user statistics")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("Failed to format statistics")?
    );
    Ok(())
}

pub async fn delete(client: &ApiClient, id: &str) -> Result<()> {
    UserService::new(client)
        .delete(id)
        .await
        .with_context(|| format!("Failed to delete user {}", id))?;
    println!("Deleted user {}.", id);
    Ok(())
}

pub async fn search(client: &ApiClient, criteria: &UserSearch) -> Result<()> {
    let users = UserService::new(client)
        .search(criteria)
        .await
        .context("User search failed")?;
    print_users(&users);
    Ok(())
}

pub async fn set_status(client: &ApiClient, id: &str, status: UserStatus) -> Result<()> {
    let user = UserService::new(client)
        .set_status(id, status)
        .await
        .map_err(super::describe)
        .with_context(|| format!("Failed to set status of user {}", id))?;
    println!("User {} status updated.", user.username);
    Ok(())
}

pub async fn set_role(client: &ApiClient, id: &str, role: UserRole) -> Result<()> {
    let user = UserService::new(client)
        .set_role(id, role)
        .await
        .map_err(super::describe)
        .with_context(|| format!("Failed to set role of user {}", id))?;
    println!("User {} is now {}.", user.username, enum_label(&user.role));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::api::transport::mock::MockTransport;
    use crate::auth::jwt::token_expiring_in;
    use crate::auth::{Credential, CredentialStore, MemoryStore, NoopObserver};
    use crate::config::Settings;

    fn user_json(role: &str) -> serde_json::Value {
        json!({"id": "u1", "username": "ada", "email": "ada@example.com", "role": role})
    }

    fn setup() -> (Arc<MockTransport>, ApiClient) {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new());
        store.set(&Credential::new(token_expiring_in(3600), "r"));
        let settings = Settings {
            api_url: "http://api.test".into(),
            ..Settings::default()
        };
        let client = ApiClient::new(settings, transport.clone(), store, Arc::new(NoopObserver));
        (transport, client)
    }

    #[tokio::test]
    async fn test_set_role() {
        let (transport, client) = setup();
        transport.on(
            Method::PATCH,
            "/users/u1/role",
            200,
            json!({"success": true, "message": "ok", "data": user_json("manager")}),
        );

        let user = UserService::new(&client)
            .set_role("u1", UserRole::Manager)
            .await
            .unwrap();

        assert_eq!(user.role, UserRole::Manager);
        assert_eq!(transport.requests()[0].body, Some(json!({"role": "manager"})));
    }

    #[tokio::test]
    async fn test_search_encodes_roles() {
        let (transport, client) = setup();
        transport.on(
            Method::GET,
            "/users/search",
            200,
            json!({
                "success": true,
                "message": "ok",
                "data": [user_json("admin")],
                "meta": {"pagination": {"total": 1, "page": 1, "limit": 10, "pages": 1}}
            }),
        );
        let criteria = UserSearch {
            role: vec![UserRole::Admin, UserRole::Guest],
            ..UserSearch::default()
        };

        let page = UserService::new(&client).search(&criteria).await.unwrap();

        assert_eq!(page.data.len(), 1);
        assert_eq!(
            transport.requests()[0].url,
            "http://api.test/users/search?role%5B%5D=admin&role%5B%5D=guest"
        );
    }

    #[tokio::test]
    async fn test_create_sends_only_set_fields() {
        let (transport, client) = setup();
        transport.on(
            Method::POST,
            "/users",
            201,
            json!({"success": true, "message": "created", "data": user_json("user")}),
        );
        let draft = UserDraft {
            username: Some("ada".into()),
            email: Some("ada@example.com".into()),
            password: Some("s3cret!".into()),
            is_active: Some(true),
            ..UserDraft::default()
        };

        let user = UserService::new(&client).create(&draft).await.unwrap();

        assert_eq!(user.id, "u1");
        assert_eq!(
            transport.requests()[0].body,
            Some(json!({
                "username": "ada",
                "email": "ada@example.com",
                "password": "s3cret!",
                "isActive": true
            }))
        );
    }

    #[tokio::test]
    async fn test_update_puts_partial_profile() {
        let (transport, client) = setup();
        transport.on(
            Method::PUT,
            "/users/u1",
            200,
            json!({"success": true, "message": "ok", "data": user_json("admin")}),
        );
        let draft = UserDraft {
            role: Some(UserRole::Admin),
            phone_number: Some("+4512345678".into()),
            ..UserDraft::default()
        };

        let user = UserService::new(&client).update("u1", &draft).await.unwrap();

        assert_eq!(user.role, UserRole::Admin);
        assert_eq!(
            transport.requests()[0].body,
            Some(json!({"role": "admin", "phoneNumber": "+4512345678"}))
        );
    }

    #[tokio::test]
    async fn test_statistics() {
        let (transport, client) = setup();
        transport.on(
            Method::GET,
            "/users/statistics",
            200,
            json!({
                "success": true,
                "message": "ok",
                "data": {
                    "total": 12,
                    "active": 9,
                    "inactive": 3,
                    "byRole": {"admin": 2, "user": 10},
                    "byStatus": {"active": 9, "suspended": 3}
                }
            }),
        );

        let stats = UserService::new(&client).statistics().await.unwrap();

        assert_eq!(stats["total"], 12);
        assert_eq!(stats["byRole"]["admin"], 2);
        assert_eq!(transport.count("/users/statistics"), 1);
    }

    #[tokio::test]
    async fn test_role_change_escapes_id() {
        let (transport, client) = setup();
        transport.on(
            Method::PATCH,
            "/users/a%2Fb/role",
            200,
            json!({"success": true, "message": "ok", "data": user_json("user")}),
        );

        tokio_test::assert_ok!(
            UserService::new(&client)
                .set_role("a/b", UserRole::User)
                .await
        );
        assert_eq!(transport.requests()[0].url, "http://api.test/users/a%2Fb/role");
    }

    #[tokio::test]
    async fn test_delete_accepts_empty_body() {
        let (transport, client) = setup();
        transport.on(Method::DELETE, "/users/u1", 204, json!(null));
        tokio_test::assert_ok!(UserService::new(&client).delete("u1").await);
        assert_eq!(transport.count("/users/u1"), 1);
    }
}
