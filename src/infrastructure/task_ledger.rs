use crate::domain::models::Task;
use crate::infrastructure::NowProvider;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{KeyValueStore, Record, TASKS_KEY};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Ordered task collection persisted as one record.
///
/// Every mutation is a read-modify-write of the whole collection, so all
/// mutations pass through `write_gate` and are applied one at a time in
/// arrival order.
pub struct TaskLedger<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
    write_gate: Mutex<()>,
    now_provider: NowProvider,
}

impl<S> TaskLedger<S>
where
    S: KeyValueStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            write_gate: Mutex::new(()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn list(&self) -> Result<Vec<Task>, InfraError> {
        let record = self.store.get(&[TASKS_KEY]).await?;
        match record.get(TASKS_KEY) {
            Some(raw) => Ok(serde_json::from_value(raw.clone())?),
            None => Ok(Vec::new()),
        }
    }

    /// Appends a task. Blank text is ignored and the collection returned as is.
    pub async fn add(&self, text: &str) -> Result<Vec<Task>, InfraError> {
        let text = text.trim();
        let _writer = self.write_gate.lock().await;
        let mut tasks = self.list().await?;
        if text.is_empty() {
            return Ok(tasks);
        }

        let created_at = (self.now_provider)();
        let last_id = tasks.iter().map(|task| task.id).max().unwrap_or(i64::MIN);
        let id = created_at.timestamp_millis().max(last_id.saturating_add(1));
        tasks.push(Task {
            id,
            text: text.to_string(),
            completed: false,
            created_at,
        });

        self.persist(&tasks).await;
        debug!(task_id = id, "added task");
        Ok(tasks)
    }

    pub async fn toggle(&self, id: i64) -> Result<Vec<Task>, InfraError> {
        let _writer = self.write_gate.lock().await;
        let mut tasks = self.list().await?;
        let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
            debug!(task_id = id, "toggle ignored; task not found");
            return Ok(tasks);
        };
        task.completed = !task.completed;

        self.persist(&tasks).await;
        Ok(tasks)
    }

    pub async fn delete(&self, id: i64) -> Result<Vec<Task>, InfraError> {
        let _writer = self.write_gate.lock().await;
        let mut tasks = self.list().await?;
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            debug!(task_id = id, "delete ignored; task not found");
            return Ok(tasks);
        }

        self.persist(&tasks).await;
        Ok(tasks)
    }

    /// Writes an empty collection when none exists. Returns whether it wrote.
    pub async fn seed_empty(&self) -> Result<bool, InfraError> {
        let _writer = self.write_gate.lock().await;
        let record = self.store.get(&[TASKS_KEY]).await?;
        if record.contains_key(TASKS_KEY) {
            return Ok(false);
        }
        self.write(&[]).await?;
        Ok(true)
    }

    // The caller already holds the mutated collection; a failed write is
    // reported but the mutation is still handed back for rendering.
    async fn persist(&self, tasks: &[Task]) {
        if let Err(error) = self.write(tasks).await {
            warn!(%error, "failed to persist task list");
        }
    }

    async fn write(&self, tasks: &[Task]) -> Result<(), InfraError> {
        let mut record = Record::new();
        record.insert(TASKS_KEY.to_string(), serde_json::to_value(tasks)?);
        self.store.set(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryKeyValueStore;
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    fn fixed_now() -> NowProvider {
        Arc::new(|| {
            DateTime::parse_from_rfc3339("2026-02-16T08:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc)
        })
    }

    fn ledger() -> TaskLedger<InMemoryKeyValueStore> {
        TaskLedger::new(Arc::new(InMemoryKeyValueStore::new())).with_now_provider(fixed_now())
    }

    #[tokio::test]
    async fn blank_text_leaves_ledger_unchanged() {
        let ledger = ledger();
        assert!(ledger.add("").await.expect("add empty").is_empty());
        assert!(ledger.add("   ").await.expect("add blank").is_empty());
        assert!(ledger.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn add_toggle_delete_leaves_ledger_empty() {
        let ledger = ledger();
        let tasks = ledger.add("  Write report ").await.expect("add");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "Write report");
        assert!(!tasks[0].completed);
        let id = tasks[0].id;

        let toggled = ledger.toggle(id).await.expect("toggle");
        assert!(toggled[0].completed);
        let toggled_back = ledger.toggle(id).await.expect("toggle back");
        assert!(!toggled_back[0].completed);

        let remaining = ledger.delete(id).await.expect("delete");
        assert!(remaining.is_empty());
        assert!(ledger.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_leave_ledger_unchanged() {
        let ledger = ledger();
        let tasks = ledger.add("Review notes").await.expect("add");

        assert_eq!(ledger.toggle(-1).await.expect("toggle unknown"), tasks);
        assert_eq!(ledger.delete(-1).await.expect("delete unknown"), tasks);
        assert_eq!(ledger.list().await.expect("list"), tasks);
    }

    #[tokio::test]
    async fn same_millisecond_tasks_get_distinct_ids() {
        let ledger = ledger();
        ledger.add("first").await.expect("add first");
        let tasks = ledger.add("second").await.expect("add second");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].id, tasks[0].id + 1);
        assert_eq!(tasks[0].id, fixed_now()().timestamp_millis());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_adds_are_serialized() {
        let store = Arc::new(InMemoryKeyValueStore::with_latency(Duration::from_millis(50)));
        let ledger = TaskLedger::new(Arc::clone(&store)).with_now_provider(fixed_now());

        let (first, second, third) =
            tokio::join!(ledger.add("one"), ledger.add("two"), ledger.add("three"));
        first.expect("first add");
        second.expect("second add");
        third.expect("third add");

        let texts = ledger
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|task| task.text)
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn failed_write_still_returns_mutation() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let ledger = TaskLedger::new(Arc::clone(&store)).with_now_provider(fixed_now());
        store.set_fail_writes(true);

        let tasks = ledger.add("Offline task").await.expect("add despite failure");
        assert_eq!(tasks.len(), 1);

        store.set_fail_writes(false);
        assert!(ledger.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn seed_empty_only_writes_once() {
        let ledger = ledger();
        assert!(ledger.seed_empty().await.expect("seed"));
        ledger.add("kept").await.expect("add");
        assert!(!ledger.seed_empty().await.expect("seed again"));
        assert_eq!(ledger.list().await.expect("list").len(), 1);
    }
}
