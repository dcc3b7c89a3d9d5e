// 外发通知（邮件、短信）
// 统一放到后台任务里发送，失败只记日志，不影响接口响应

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub channel: Channel,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook rejected notification with status {0}")]
    Rejected(reqwest::StatusCode),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// 只写日志，开发环境使用
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            channel = ?notification.channel,
            recipient = %notification.recipient,
            subject = %notification.subject,
            "notification"
        );
        Ok(())
    }
}

/// 把通知以 JSON POST 到外部投递服务
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status()));
        }
        Ok(())
    }
}

/// 后台发送，不等待结果
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&notification).await {
            error!(
                channel = ?notification.channel,
                recipient = %notification.recipient,
                error = %e,
                "failed to deliver notification"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_swallows_delivery_errors() {
        let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new("http://127.0.0.1:9/unreachable"));
        let handle = dispatch(
            notifier,
            Notification {
                channel: Channel::Email,
                recipient: "a@example.com".into(),
                subject: "s".into(),
                body: "b".into(),
            },
        );
        assert!(handle.await.is_ok());
    }
}
