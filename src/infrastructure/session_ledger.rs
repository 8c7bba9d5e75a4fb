use crate::domain::models::{Phase, SessionRecord, SessionStats};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{KeyValueStore, Record, SESSIONS_KEY};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Append-only log of completed phases.
pub struct SessionLedger<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
    write_gate: Mutex<()>,
}

impl<S> SessionLedger<S>
where
    S: KeyValueStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            write_gate: Mutex::new(()),
        }
    }

    pub async fn append(&self, record: SessionRecord) -> Result<(), InfraError> {
        record.validate().map_err(InfraError::Validation)?;
        let _writer = self.write_gate.lock().await;
        let mut sessions = self.list_all().await?;
        sessions.push(record);

        let mut update = Record::new();
        update.insert(SESSIONS_KEY.to_string(), serde_json::to_value(&sessions)?);
        self.store.set(update).await
    }

    pub async fn list_all(&self) -> Result<Vec<SessionRecord>, InfraError> {
        let record = self.store.get(&[SESSIONS_KEY]).await?;
        match record.get(SESSIONS_KEY) {
            Some(raw) => Ok(serde_json::from_value(raw.clone())?),
            None => Ok(Vec::new()),
        }
    }

    /// Sessions completed on `date`, newest first.
    pub async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<SessionRecord>, InfraError> {
        let mut sessions = self
            .list_all()
            .await?
            .into_iter()
            .filter(|session| session.date == date)
            .collect::<Vec<_>>();
        sessions.sort_by(|left, right| right.completed_at.cmp(&left.completed_at));
        Ok(sessions)
    }

    pub async fn stats_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SessionStats>, InfraError> {
        if end < start {
            return Err(InfraError::Validation(
                "end date must not be before start date".to_string(),
            ));
        }

        let sessions = self.list_all().await?;
        let stats = [Phase::Focus, Phase::Break]
            .into_iter()
            .filter_map(|phase| {
                let matching = sessions
                    .iter()
                    .filter(|session| session.phase == phase)
                    .filter(|session| session.date >= start && session.date <= end)
                    .collect::<Vec<_>>();
                if matching.is_empty() {
                    return None;
                }
                Some(SessionStats {
                    phase,
                    count: matching.len() as u32,
                    total_minutes: matching
                        .iter()
                        .map(|session| u64::from(session.duration_minutes))
                        .sum(),
                })
            })
            .collect();
        Ok(stats)
    }
}
