// ABOUTME: Digit image captcha backed by the KV store with consume-on-verify semantics
// ABOUTME: Renders a base64 SVG data URI; answers live 5 minutes under captcha:{id}
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Image captcha for the password-login path. The answer is stored
//! server-side only; any verification attempt consumes the id, so a wrong
//! guess forces a fresh image.

use crate::cache::{keys, Kv};
use crate::config::environment::CaptchaConfig;
use crate::crypto::generate_verification_code;
use crate::errors::AppResult;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::Rng;
use uuid::Uuid;

/// A generated captcha handed to the client
#[derive(Debug, Clone)]
pub struct GeneratedCaptcha {
    /// Opaque id echoed back on verification
    pub captcha_id: String,
    /// `data:image/svg+xml;base64,...` payload
    pub pic_path: String,
}

/// Generates and verifies digit captchas
#[derive(Clone)]
pub struct CaptchaManager {
    kv: Kv,
    config: CaptchaConfig,
}

impl CaptchaManager {
    /// Create a manager over the shared KV store
    #[must_use]
    pub const fn new(kv: Kv, config: CaptchaConfig) -> Self {
        Self { kv, config }
    }

    /// Generate a captcha and store its answer for 5 minutes
    ///
    /// # Errors
    ///
    /// Returns an error if the KV write fails.
    pub async fn generate(&self) -> AppResult<GeneratedCaptcha> {
        let captcha_id = Uuid::new_v4().simple().to_string();
        let code = generate_verification_code(self.config.length);

        self.kv
            .set(&keys::captcha(&captcha_id), &code, Some(keys::SHORT_TTL))
            .await?;

        let svg = render_digits(&code, self.config.width, self.config.height);
        let pic_path = format!("data:image/svg+xml;base64,{}", BASE64.encode(svg));

        Ok(GeneratedCaptcha {
            captcha_id,
            pic_path,
        })
    }

    /// Verify an answer. The stored code is consumed on every attempt, right
    /// or wrong, so ids cannot be brute-forced.
    ///
    /// # Errors
    ///
    /// Returns an error if the KV read fails.
    pub async fn verify(&self, captcha_id: &str, answer: &str) -> AppResult<bool> {
        if captcha_id.is_empty() || answer.is_empty() {
            return Ok(false);
        }
        let stored = self.kv.get_del(&keys::captcha(captcha_id)).await?;
        Ok(stored.as_deref() == Some(answer))
    }
}

/// Render the digits as a small SVG with per-glyph jitter and strike lines
fn render_digits(code: &str, width: u32, height: u32) -> String {
    let mut rng = OsRng;
    let count = code.chars().count().max(1) as u32;
    let cell = width / count;
    let font = (f64::from(height) * 0.8) as u32;

    let mut body = String::new();
    for (i, ch) in code.chars().enumerate() {
        let x = (i as u32) * cell + cell / 4;
        let y = height - rng.gen_range(2..=(height / 4).max(3));
        let tilt: i32 = rng.gen_range(-15..=15);
        body.push_str(&format!(
            "<text x=\"{x}\" y=\"{y}\" font-size=\"{font}\" font-family=\"monospace\" \
             fill=\"#333\" transform=\"rotate({tilt} {x} {y})\">{ch}</text>"
        ));
    }
    for _ in 0..2 {
        let (x1, y1) = (rng.gen_range(0..width / 2), rng.gen_range(0..height));
        let (x2, y2) = (rng.gen_range(width / 2..width), rng.gen_range(0..height));
        body.push_str(&format!(
            "<line x1=\"{x1}\" y1=\"{y1}\" x2=\"{x2}\" y2=\"{y2}\" \
             stroke=\"#999\" stroke-width=\"1\"/>"
        ));
    }

    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" \
         viewBox=\"0 0 {width} {height}\"><rect width=\"100%\" height=\"100%\" \
         fill=\"#f5f5f5\"/>{body}</svg>"
    )
}
