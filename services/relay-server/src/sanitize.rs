// Payload Sanitizer: validates and bounds incoming location fixes and route
// uploads, and computes the content hashes used for upload deduplication.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use relay_protocol::{LocationFix, LocationInput, Route, RouteItem, RoutePosition};
use sha1::{Digest, Sha1};

use crate::time::now_ms;

const MAX_ROUTE_ID_LEN: usize = 40;
const MAX_ROUTE_NAME_LEN: usize = 64;
const MAX_ROUTE_COLOR_LEN: usize = 32;
const MAX_ITEM_ID_LEN: usize = 40;
const MAX_ITEM_NAME_LEN: usize = 48;

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn as_finite_f64(value: &serde_json::Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}

/// Validate and coerce an inbound `participant:location` payload.
///
/// Returns `None` when `lat`/`lng` are missing or not finite numbers — the
/// caller treats this as a silently-dropped frame, matching the sanitizer's
/// lenient stance toward flaky telemetry sources.
pub fn sanitize_location(input: &LocationInput) -> Option<LocationFix> {
    let lat = input.lat.as_ref().and_then(as_finite_f64)?;
    let lng = input.lng.as_ref().and_then(as_finite_f64)?;
    let accuracy = input.accuracy.as_ref().and_then(as_finite_f64);
    let timestamp = input
        .timestamp
        .as_ref()
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or_else(now_ms);
    Some(LocationFix {
        lat,
        lng,
        accuracy,
        timestamp,
    })
}

fn sanitize_route_item(value: &serde_json::Value) -> Option<RouteItem> {
    let obj = value.as_object()?;
    let id = obj.get("id")?.as_str()?;
    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| truncate_chars(s, MAX_ITEM_NAME_LEN));
    let position = obj.get("position")?.as_object()?;
    let lat = position.get("lat").and_then(as_finite_f64)?;
    let lng = position.get("lng").and_then(as_finite_f64)?;
    Some(RouteItem {
        id: truncate_chars(id, MAX_ITEM_ID_LEN),
        name,
        position: RoutePosition { lat, lng },
    })
}

fn sanitize_one_route(value: &serde_json::Value, max_points: usize) -> Option<Route> {
    let obj = value.as_object()?;
    let id = obj.get("id")?.as_str()?;
    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| truncate_chars(s, MAX_ROUTE_NAME_LEN));
    let color = obj
        .get("color")
        .and_then(|v| v.as_str())
        .map(|s| truncate_chars(s, MAX_ROUTE_COLOR_LEN));
    let raw_items = obj.get("items")?.as_array()?;
    let items: Vec<RouteItem> = raw_items
        .iter()
        .take(max_points)
        .filter_map(sanitize_route_item)
        .collect();
    if items.is_empty() {
        return None;
    }
    Some(Route {
        id: truncate_chars(id, MAX_ROUTE_ID_LEN),
        name,
        color,
        items,
    })
}

/// Outcome of sanitizing a `client:routes` upload.
pub enum RoutesSanitizeResult {
    /// `routes` was a JSON array; zero or more routes survived sanitization.
    Ok(Vec<Route>),
    /// `routes` was not a JSON array at all.
    NotAList,
}

/// Sanitize an inbound routes payload: truncates to `max_routes` entries,
/// each truncated to `max_points` items; routes with zero valid items are
/// dropped entirely.
pub fn sanitize_routes(
    value: &serde_json::Value,
    max_routes: usize,
    max_points: usize,
) -> RoutesSanitizeResult {
    let Some(raw_routes) = value.as_array() else {
        return RoutesSanitizeResult::NotAList;
    };
    let routes = raw_routes
        .iter()
        .take(max_routes)
        .filter_map(|r| sanitize_one_route(r, max_points))
        .collect();
    RoutesSanitizeResult::Ok(routes)
}

/// SHA-1 over the canonical JSON encoding of the sanitized routes, base64-encoded.
pub fn route_hash(routes: &[Route]) -> String {
    let canonical = serde_json::to_vec(routes).unwrap_or_default();
    BASE64.encode(Sha1::digest(canonical))
}

/// SHA-1 over the raw opaque blob bytes, base64-encoded.
pub fn state_hash(data: &[u8]) -> String {
    BASE64.encode(Sha1::digest(data))
}
