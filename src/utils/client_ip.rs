// ABOUTME: Best-effort client IP extraction behind reverse proxies
// ABOUTME: X-Forwarded-For first hop, then X-Real-IP, else empty
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use axum::http::HeaderMap;

/// Client IP as reported by the front proxy. The deployment terminates TLS in
/// front of this service, so the forwarded headers are trusted.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_owned();
            }
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(String::new, ToOwned::to_owned)
}

/// User-Agent header value, empty when absent
#[must_use]
pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map_or_else(String::new, ToOwned::to_owned)
}
