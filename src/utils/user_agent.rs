// ABOUTME: Derives a display device name ("macOS - Chrome") from the User-Agent
// ABOUTME: Used when the client does not supply a device name (QQ callback, silent login)
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Human-readable device name derived from a User-Agent string
#[must_use]
pub fn device_name_from_user_agent(user_agent: &str) -> String {
    if user_agent.is_empty() {
        return "未知设备".to_owned();
    }

    let ua = user_agent.to_lowercase();

    let os = if ua.contains("windows") {
        if ua.contains("windows nt 6.1") {
            "Windows 7"
        } else {
            "Windows"
        }
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
        // before the macOS check: mobile Safari claims "like Mac OS X"
        "iOS"
    } else if ua.contains("mac os x") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "未知系统"
    };

    let browser = if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("chrome/") {
        "Chrome"
    } else if ua.contains("firefox/") {
        "Firefox"
    } else if ua.contains("safari/") {
        "Safari"
    } else if ua.contains("opera/") || ua.contains("opr/") {
        "Opera"
    } else {
        "未知浏览器"
    };

    format!("{os} - {browser}")
}
