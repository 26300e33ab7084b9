use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::form_urlencoded;

use crate::state::annotations::Annotation;

/// Visible axis bounds of the chart. Absent means full-range default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportZoom {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// Decoded contents of a shareable URL query string.
#[derive(Debug, Default, PartialEq)]
pub struct UrlState {
    pub market: Option<String>,
    /// Raw annotation token, decoded lazily so seed-time precedence can
    /// distinguish "absent" from "present but empty".
    pub annotations: Option<String>,
    pub zoom: Option<ViewportZoom>,
}

/// Serialize annotations as ordered `[date, y_value, content, source]`
/// tuples, JSON-encoded, then URL-safe base64 without padding.
pub fn encode_annotations(annotations: &[Annotation]) -> String {
    let tuples: Vec<Value> = annotations
        .iter()
        .map(|a| json!([a.date, a.y_value, a.content, a.source]))
        .collect();
    let json = serde_json::to_string(&tuples).unwrap_or_else(|_| "[]".to_string());
    URL_SAFE_NO_PAD.encode(json)
}

/// Reverse of [`encode_annotations`]. Fails soft: malformed base64,
/// invalid JSON, or a wrong tuple shape all decode to an empty list.
pub fn decode_annotations(token: &str) -> Vec<Annotation> {
    // Tolerate padded tokens from hand-edited URLs.
    let trimmed = token.trim_end_matches('=');
    let bytes = match URL_SAFE_NO_PAD.decode(trimmed) {
        Ok(bytes) => bytes,
        Err(_) => return Vec::new(),
    };
    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => return Vec::new(),
    };

    let Some(tuples) = value.as_array() else {
        return Vec::new();
    };

    let mut annotations = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        let Some(fields) = tuple.as_array() else {
            return Vec::new();
        };
        let (Some(date), Some(y_value), Some(content), Some(source)) = (
            fields.first().and_then(Value::as_i64),
            fields.get(1).and_then(Value::as_f64),
            fields.get(2).and_then(Value::as_str),
            fields.get(3).and_then(Value::as_str),
        ) else {
            return Vec::new();
        };
        annotations.push(Annotation {
            date,
            y_value,
            content: content.to_string(),
            source: source.to_string(),
        });
    }
    annotations
}

/// Percent-encoded JSON of the four bounds. Zoom stays readable enough to
/// debug in an address bar without a base64 layer.
pub fn encode_zoom(zoom: &ViewportZoom) -> String {
    let json = serde_json::to_string(zoom).unwrap_or_default();
    form_urlencoded::byte_serialize(json.as_bytes()).collect()
}

/// Symmetric decode; also accepts the raw JSON form stored in the cache.
/// Fails soft to `None`.
pub fn decode_zoom(token: &str) -> Option<ViewportZoom> {
    let decoded: String = form_urlencoded::parse(format!("v={}", token).as_bytes())
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())?;
    serde_json::from_str(&decoded)
        .ok()
        .or_else(|| serde_json::from_str(token).ok())
}

/// Market slugs carry only a percent layer so they stay human-editable.
pub fn encode_market(slug: &str) -> String {
    form_urlencoded::byte_serialize(slug.as_bytes()).collect()
}

/// Compose the shareable query string. Annotations appear only when the
/// list is non-empty; zoom only when the user has actually touched it.
/// An omitted component means "use default" on the receiving end.
pub fn compose_query(
    slug: &str,
    annotations: &[Annotation],
    zoom: Option<&ViewportZoom>,
    zoom_touched: bool,
) -> String {
    let mut query = format!("market={}", encode_market(slug));
    if !annotations.is_empty() {
        query.push_str("&annotations=");
        query.push_str(&encode_annotations(annotations));
    }
    if zoom_touched {
        if let Some(zoom) = zoom {
            query.push_str("&zoom=");
            query.push_str(&encode_zoom(zoom));
        }
    }
    query
}

/// Parse a query string back into its components. Component order is
/// irrelevant and unknown keys are ignored.
pub fn parse_query(query: &str) -> UrlState {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut state = UrlState::default();

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "market" => state.market = Some(value.into_owned()),
            "annotations" => state.annotations = Some(value.into_owned()),
            "zoom" => state.zoom = decode_zoom(&value),
            _ => {}
        }
    }
    state
}
