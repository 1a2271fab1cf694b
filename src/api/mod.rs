//! API client module for the admin backend

pub mod client;
pub mod envelope;
pub mod error;
pub mod items;
pub mod query;
pub mod request;
pub mod transport;
pub mod users;

use envelope::Pagination;
use error::ApiError;

pub(crate) fn print_page_footer(p: Pagination) {
    println!();
    println!("Page {} of {} ({} total)", p.page, p.pages.max(1), p.total);
    if p.has_next() {
        println!("More results: --page {}", p.page + 1);
    }
}

/// Turn an API error into a CLI error, listing field validation failures
/// under the server message.
pub(crate) fn describe(err: ApiError) -> anyhow::Error {
    let fields: Vec<String> = err
        .validation_errors()
        .iter()
        .map(|v| format!("  {}: {}", v.field, v.message))
        .collect();
    if fields.is_empty() {
        anyhow::Error::new(err)
    } else {
        anyhow::anyhow!("{}\n{}", err, fields.join("\n"))
    }
}
