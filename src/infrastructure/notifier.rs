use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<(), InfraError>;
    async fn play_sound(&self, cue_id: &str) -> Result<(), InfraError>;
}

/// Notifier for headless hosts: every notification becomes a log event.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), InfraError> {
        info!(title, body, "notification");
        Ok(())
    }

    async fn play_sound(&self, cue_id: &str) -> Result<(), InfraError> {
        info!(cue_id, "sound cue");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Notification { title: String, body: String },
    Sound { cue_id: String },
}

/// Records deliveries in memory. `set_denied(true)` simulates a revoked
/// notification permission: every call fails without recording.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    delivered: Mutex<Vec<Delivered>>,
    denied: AtomicBool,
}

impl InMemoryNotifier {
    pub fn set_denied(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_default()
    }

    pub fn notification_bodies(&self) -> Vec<String> {
        self.delivered()
            .into_iter()
            .filter_map(|delivered| match delivered {
                Delivered::Notification { body, .. } => Some(body),
                Delivered::Sound { .. } => None,
            })
            .collect()
    }

    fn record(&self, delivered: Delivered) -> Result<(), InfraError> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(InfraError::Notification("permission denied".to_string()));
        }
        self.delivered
            .lock()
            .map_err(|error| InfraError::Notification(format!("notifier lock poisoned: {error}")))?
            .push(delivered);
        Ok(())
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), InfraError> {
        self.record(Delivered::Notification {
            title: title.to_string(),
            body: body.to_string(),
        })
    }

    async fn play_sound(&self, cue_id: &str) -> Result<(), InfraError> {
        self.record(Delivered::Sound {
            cue_id: cue_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_notifier_records_in_order() {
        let notifier = InMemoryNotifier::default();
        notifier.notify("Pomodoro Timer", "Focus phase completed!").await.expect("notify");
        notifier.play_sound("notification").await.expect("sound");
        assert_eq!(
            notifier.delivered(),
            vec![
                Delivered::Notification {
                    title: "Pomodoro Timer".to_string(),
                    body: "Focus phase completed!".to_string(),
                },
                Delivered::Sound {
                    cue_id: "notification".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn denied_notifier_fails_without_recording() {
        let notifier = InMemoryNotifier::default();
        notifier.set_denied(true);
        assert!(matches!(
            notifier.notify("t", "b").await,
            Err(InfraError::Notification(_))
        ));
        assert!(notifier.delivered().is_empty());
        assert!(LogNotifier.play_sound("notification").await.is_ok());
    }
}
