//! Caller credentials carried in cookies.
//!
//! `apiKeys` holds a JSON object of provider name -> key and `providers` a JSON object of
//! provider name -> settings; both are percent-encoded by the browser client.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use llmcall_llm::{Credentials, ProviderSetting, ServerEnv};
use std::collections::HashMap;
use std::sync::Arc;

const API_KEYS_COOKIE: &str = "apiKeys";
const PROVIDERS_COOKIE: &str = "providers";

/// Split a `Cookie` header into decoded name/value pairs. Later duplicates win.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for pair in header.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = match urlencoding::decode(value) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => value.to_string(),
        };
        out.insert(name.to_string(), value);
    }
    out
}

pub fn api_keys_from_cookie(cookies: &HashMap<String, String>) -> HashMap<String, String> {
    decode_json_cookie(cookies, API_KEYS_COOKIE)
}

pub fn provider_settings_from_cookie(
    cookies: &HashMap<String, String>,
) -> HashMap<String, ProviderSetting> {
    decode_json_cookie(cookies, PROVIDERS_COOKIE)
}

fn decode_json_cookie<T>(cookies: &HashMap<String, String>, name: &str) -> HashMap<String, T>
where
    T: serde::de::DeserializeOwned,
{
    let Some(raw) = cookies.get(name) else {
        return HashMap::new();
    };
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(cookie = name, error = %e, "ignoring malformed cookie");
            HashMap::new()
        }
    }
}

/// Build per-request credentials from every `Cookie` header on the request.
pub fn credentials_from_headers(
    headers: &HeaderMap,
    server_env: Arc<ServerEnv>,
) -> Credentials {
    let header = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    let cookies = parse_cookies(&header);
    Credentials {
        api_keys: api_keys_from_cookie(&cookies),
        provider_settings: provider_settings_from_cookie(&cookies),
        server_env,
    }
}
