//! Tool drafts derived from captured traffic.
//!
//! Mechanical derivation only: one draft per distinct completed, success-class
//! exchange. Curating and persisting the drafts is the catalog's job.

use std::collections::HashSet;

use capture_ledger::Exchange;
use header_vault::is_auth_sensitive;
use query_relay::ToolDescriptor;
use tapforge_core_types::{HeaderMap, ToolId};
use tracing::debug;
use url::Url;

/// Derive tool drafts from a set of exchanges. Drafts get sequential ids,
/// names built from the method and URL path, and a parameter template
/// holding only the auth-relevant request headers.
pub fn derive_tool_drafts(exchanges: &[Exchange]) -> Vec<ToolDescriptor> {
    let mut seen = HashSet::new();
    let mut drafts = Vec::new();
    for exchange in exchanges {
        if !exchange.completed || !exchange.has_success_status() {
            continue;
        }
        if !seen.insert((exchange.method.clone(), exchange.url.clone())) {
            debug!(target: "tapforge", url = %exchange.url, "skipping duplicate draft");
            continue;
        }
        let template: HeaderMap = exchange
            .request_headers
            .iter()
            .filter(|(name, _)| is_auth_sensitive(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        drafts.push(
            ToolDescriptor::new(
                ToolId((drafts.len() + 1).to_string()),
                draft_name(&exchange.method, &exchange.url),
                exchange.url.clone(),
                exchange.method.clone(),
            )
            .with_template(template),
        );
    }
    drafts
}

/// `GET https://shop.example.com/api/cart/items?page=2` -> `get-api-cart-items`.
/// A bare origin falls back to the hostname.
fn draft_name(method: &str, url: &str) -> String {
    let parsed = Url::parse(url).ok();
    let mut parts = vec![method.to_ascii_lowercase()];
    if let Some(parsed) = &parsed {
        parts.extend(
            parsed
                .path()
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase()),
        );
        if parts.len() == 1 {
            if let Some(host) = parsed.host_str() {
                parts.push(host.to_ascii_lowercase());
            }
        }
    }
    parts.join("-")
}
