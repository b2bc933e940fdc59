use async_trait::async_trait;
use pipeline::{MessageSender, OutboundMessage, SendError};
use tracing::info;

/// [`MessageSender`] that writes each message to the log instead of sending it.
///
/// Used when no gateway is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMessenger;

#[async_trait]
impl MessageSender for LogMessenger {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        info!(
            platform = %message.platform,
            target_type = %message.target_type,
            target_id = %message.target_id,
            text = %message.text,
            "Outbound message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pipeline::{PlatformName, TargetId, TargetType};

    use super::*;

    #[tokio::test]
    async fn always_accepts() {
        let message = OutboundMessage {
            platform: PlatformName::new("telegram").unwrap(),
            target_type: TargetType::User,
            target_id: TargetId::new("42").unwrap(),
            text: "hello".to_string(),
        };
        assert!(LogMessenger.send(&message).await.is_ok());
    }
}
