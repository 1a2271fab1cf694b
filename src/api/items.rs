//! Item endpoints (`/items`)

use anyhow::{Context, Result};
use serde::Serialize;

use super::client::ApiClient;
use super::envelope::{Envelope, Paginated};
use super::error::ApiError;
use super::query;
use crate::models::{Item, ItemDraft, ItemSearch, ItemStatus};

/// Typed access to the item endpoints.
pub struct ItemService<'a> {
    client: &'a ApiClient,
}

#[derive(Serialize)]
struct StatusChange {
    status: ItemStatus,
}

impl<'a> ItemService<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, page: u64, limit: u64) -> Result<Paginated<Item>, ApiError> {
        self.client
            .get(&query::with_query("/items", &query::page(page, limit)))
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Item, ApiError> {
        let env: Envelope<Item> = self.client.get(&query::resource_path(&["items", id])?).await?;
        Ok(env.data)
    }

    pub async fn create(&self, draft: &ItemDraft) -> Result<Item, ApiError> {
        let env: Envelope<Item> = self.client.post("/items", draft).await?;
        Ok(env.data)
    }

    pub async fn update(&self, id: &str, draft: &ItemDraft) -> Result<Item, ApiError> {
        let path = query::resource_path(&["items", id])?;
        let env: Envelope<Item> = self.client.put(&path, draft).await?;
        Ok(env.data)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&query::resource_path(&["items", id])?)
            .await
    }

    pub async fn search(&self, criteria: &ItemSearch) -> Result<Paginated<Item>, ApiError> {
        let path = query::with_query("/items/search", &query::to_pairs(criteria));
        self.client.get(&path).await
    }

    pub async fn set_status(&self, id: &str, status: ItemStatus) -> Result<Item, ApiError> {
        let path = query::resource_path(&["items", id, "status"])?;
        let env: Envelope<Item> = self.client.patch(&path, &StatusChange { status }).await?;
        Ok(env.data)
    }

    /// Aggregate counters; the shape is server-defined.
    pub async fn statistics(&self) -> Result<serde_json::Value, ApiError> {
        let env: Envelope<serde_json::Value> = self.client.get("/items/statistics").await?;
        Ok(env.data)
    }
}

// -- CLI output --

fn print_items(page: &Paginated<Item>) {
    if page.data.is_empty() {
        println!("No items found.");
        return;
    }

    println!();
    println!("{:<26} {:<30} {:<8} {:<10}", "ID", "NAME", "TYPE", "STATUS");
    for item in &page.data {
        println!(
            "{:<26} {:<30} {:<8} {:<10}",
            item.id,
            truncate(&item.name, 30),
            enum_label(&item.item_type),
            enum_label(&item.status),
        );
    }
    super::print_page_footer(page.pagination());
}

fn print_item(item: &Item) {
    println!();
    println!("ID:          {}", item.id);
    println!("Name:        {}", item.name);
    println!("Type:        {}", enum_label(&item.item_type));
    println!("Status:      {}", enum_label(&item.status));
    println!(
        "Description: {}",
        item.description.as_deref().unwrap_or("(none)")
    );
    if !item.tags.is_empty() {
        println!("Tags:        {}", item.tags.join(", "));
    }
    for attr in &item.attributes {
        println!(
            "  {} = {}{}",
            attr.name,
            attr.value,
            attr.unit.as_deref().map(|u| format!(" {}", u)).unwrap_or_default()
        );
    }
    println!("Updated:     {}", item.updated_at);
}

/// Serialized name of a unit enum variant.
pub(crate) fn enum_label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => "?".to_string(),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

pub async fn list(client: &ApiClient, page: u64, limit: u64) -> Result<()> {
    let items = ItemService::new(client)
        .list(page, limit)
        .await
        .context("Failed to list items")?;
    print_items(&items);
    Ok(())
}

pub async fn show(client: &ApiClient, id: &str) -> Result<()> {
    let item = ItemService::new(client)
        .get(id)
        .await
        .with_context(|| format!("Failed to fetch item {}", id))?;
    print_item(&item);
    Ok(())
}

pub async fn create(client: &ApiClient, draft: &ItemDraft) -> Result<()> {
    let item = ItemService::new(client)
        .create(draft)
        .await
        .map_err(super::describe)
        .context("Failed to create item")?;
    println!("Created item {}.", item.id);
    Ok(())
}

pub async fn update(client: &ApiClient, id: &str, draft: &ItemDraft) -> Result<()> {
    let item = ItemService::new(client)
        .update(id, draft)
        .await
        .map_err(super::describe)
        .with_context(|| format!("Failed to update item {}", id))?;
    print_item(&item);
    Ok(())
}

pub async fn delete(client: &ApiClient, id: &str) -> Result<()> {
    ItemService::new(client)
        .delete(id)
        .await
        .with_context(|| format!("Failed to delete item {}", id))?;
    println!("Deleted item {}.", id);
    Ok(())
}

pub async fn search(client: &ApiClient, criteria: &ItemSearch) -> Result<()> {
    let items = ItemService::new(client)
        .search(criteria)
        .await
        .context("Item search failed")?;
    print_items(&items);
    Ok(())
}

pub async fn set_status(client: &ApiClient, id: &str, status: ItemStatus) -> Result<()> {
    let item = ItemService::new(client)
        .set_status(id, status)
        .await
        .with_context(|| format!("Failed to set status of item {}", id))?;
    println!("Item {} is now {}.", item.id, enum_label(&item.status));
    Ok(())
}

pub async fn statistics(client: &ApiClient) -> Result<()> {
    let stats = ItemService::new(client)
        .statistics()
        .await
        .context("Failed to fetch item statistics")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("Failed to format statistics")?
    );
    Ok(())
}
