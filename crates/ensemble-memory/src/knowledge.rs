use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ensemble_core::{EnsembleError, EnsembleResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A node stored in the knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: Uuid,
    pub label: String,
    pub properties: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeRecord {
    /// Flatten the record into one line of prompt context.
    pub fn summary(&self) -> String {
        let props: Vec<String> = self
            .properties
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect();
        format!("[{}] {}", self.label, props.join(", "))
    }
}

/// The two operations the orchestrator needs from a knowledge graph.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Persist a node and return its id.
    async fn add_node(&self, label: &str, properties: Map<String, Value>) -> EnsembleResult<Uuid>;

    /// Return records relevant to `query`, most recent first.
    async fn query(&self, query: &str) -> EnsembleResult<Vec<KnowledgeRecord>>;
}

/// In-memory knowledge store using case-insensitive substring matching over
/// labels and property text.
pub struct InMemoryKnowledgeStore {
    nodes: RwLock<Vec<KnowledgeRecord>>,
}

impl InMemoryKnowledgeStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored nodes.
    pub async fn count(&self) -> usize {
        self.nodes.read().await.len()
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(record: &KnowledgeRecord, needle: &str) -> bool {
    if record.label.to_lowercase().contains(needle) {
        return true;
    }
    record.properties.values().any(|v| {
        let text = match v {
            Value::String(s) => s.to_lowercase(),
            other => other.to_string().to_lowercase(),
        };
        text.contains(needle)
    })
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn add_node(&self, label: &str, properties: Map<String, Value>) -> EnsembleResult<Uuid> {
        if label.trim().is_empty() {
            return Err(EnsembleError::Knowledge("node label is empty".to_string()));
        }
        let record = KnowledgeRecord {
            id: Uuid::new_v4(),
            label: label.to_string(),
            properties,
            created_at: Utc::now(),
        };
        let id = record.id;
        self.nodes.write().await.push(record);
        Ok(id)
    }

    async fn query(&self, query: &str) -> EnsembleResult<Vec<KnowledgeRecord>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let nodes = self.nodes.read().await;
        Ok(nodes
            .iter()
            .rev()
            .filter(|r| matches(r, &needle))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_add_and_query_by_property() {
        let store = InMemoryKnowledgeStore::new();
        store
            .add_node("TaskResult", props(json!({"task": "Summarize file X", "result": "ok"})))
            .await
            .unwrap();
        store
            .add_node("Note", props(json!({"text": "unrelated"})))
            .await
            .unwrap();

        let hits = store.query("summarize").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, "TaskResult");
    }

    #[tokio::test]
    async fn test_query_by_label_most_recent_first() {
        let store = InMemoryKnowledgeStore::new();
        store.add_node("TaskResult", props(json!({"n": 1}))).await.unwrap();
        store.add_node("TaskResult", props(json!({"n": 2}))).await.unwrap();
        let hits = store.query("taskresult").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].properties["n"], 2);
    }

    #[tokio::test]
    async fn test_empty_label_rejected() {
        let store = InMemoryKnowledgeStore::new();
        let err = store.add_node(" ", Map::new()).await.unwrap_err();
        assert!(matches!(err, EnsembleError::Knowledge(_)));
        assert_eq!(store.count().await, 0);
    }

    #[test]
    fn test_summary() {
        let record = KnowledgeRecord {
            id: Uuid::new_v4(),
            label: "TaskResult".into(),
            properties: props(json!({"task": "t", "confidence": 0.5})),
            created_at: Utc::now(),
        };
        let s = record.summary();
        assert!(s.starts_with("[TaskResult]"));
        assert!(s.contains("task=t"));
        assert!(s.contains("confidence=0.5"));
    }
}
