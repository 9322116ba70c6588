// ABOUTME: Async SMTP mailer for verification-code mail
// ABOUTME: Send failures are logged, never fatal: the code already sits in the KV store
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::config::environment::EmailConfig;
use crate::errors::{AppError, AppResult};
use lettre::message::{Mailbox, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

/// Outbound mail handle; `None` transport means mail is disabled
#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
    nickname: String,
}

impl Mailer {
    /// Build a mailer from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay settings are unusable.
    pub fn new(config: &EmailConfig) -> AppResult<Self> {
        if !config.enable {
            info!("outbound mail disabled, verification codes are only stored");
            return Ok(Self {
                transport: None,
                from: String::new(),
                nickname: String::new(),
            });
        }

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AppError::config(format!("invalid SMTP relay: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(config.from.clone(), config.secret.clone()))
            .build();

        Ok(Self {
            transport: Some(transport),
            from: config.from.clone(),
            nickname: config.nickname.clone(),
        })
    }

    /// Send the verification-code mail. A transport failure is logged and
    /// swallowed; the caller already stored the code.
    pub async fn send_verification_code(&self, to: &str, code: &str) {
        let Some(transport) = &self.transport else {
            info!("mail disabled, skipping verification mail to {to}");
            return;
        };

        let message = match build_verification_message(&self.from, &self.nickname, to, code) {
            Ok(message) => message,
            Err(e) => {
                warn!("failed to build verification mail for {to}: {e}");
                return;
            }
        };

        if let Err(e) = transport.send(message).await {
            warn!("failed to send verification mail to {to}: {e}");
        }
    }
}

fn build_verification_message(
    from: &str,
    nickname: &str,
    to: &str,
    code: &str,
) -> AppResult<Message> {
    let from_mailbox: Mailbox = format!("{nickname} <{from}>")
        .parse()
        .map_err(|e| AppError::config(format!("invalid EMAIL_FROM: {e}")))?;
    let to_mailbox: Mailbox = to
        .parse()
        .map_err(|e| AppError::bad_request(format!("invalid recipient address: {e}")))?;

    let body = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: #667eea;">邮箱验证码</h2>
        <p>亲爱的用户，</p>
        <p>您正在使用邮箱验证码功能，验证码如下：</p>
        <div style="background: #f5f5f5; padding: 20px; text-align: center; margin: 20px 0; border-radius: 8px;">
            <strong style="font-size: 24px; color: #667eea; letter-spacing: 4px;">{code}</strong>
        </div>
        <p>该验证码在 <strong>5 分钟</strong>内有效，请尽快使用。</p>
        <p>如果您没有请求此验证码，请忽略此邮件。</p>
    </div>
</body>
</html>"#
    );

    Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject("您的邮箱验证码")
        .singlepart(SinglePart::html(body))
        .map_err(|e| AppError::internal(format!("failed to build mail: {e}")))
}
