//! Keyword retrieval over a small in-memory knowledge base.

use std::time::Duration;

use async_trait::async_trait;

use super::{require_input, simulate_latency};
use crate::error::HandlerError;
use crate::handlers::StepHandler;
use crate::task::{Capability, Context, Step};

/// Maximum documents returned per query.
const MAX_DOCS: usize = 3;

const KNOWLEDGE_BASE: &[(&str, &[&str])] = &[
    (
        "task_execution",
        &[
            "Tasks are broken into atomic steps",
            "Each step has a clear input and output",
            "Steps can be executed sequentially or in parallel",
        ],
    ),
    (
        "ai_systems",
        &[
            "AI systems require orchestration layers",
            "Agents specialize in specific tasks",
            "Streaming enables real-time feedback",
        ],
    ),
    (
        "async_programming",
        &[
            "Async/await enables concurrent execution",
            "Queues manage task distribution",
            "Backpressure prevents system overload",
        ],
    ),
];

const FALLBACK_DOCS: &[&str] = &[
    "Context retrieval system is operational",
    "Multiple knowledge sources are available",
];

/// Retrieve handler: matches the `query` input against category keywords.
pub struct KnowledgeRetriever {
    latency: Duration,
}

impl KnowledgeRetriever {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    /// Documents whose category shares a keyword with the query.
    pub fn search(query: &str) -> Vec<&'static str> {
        let query = query.to_lowercase();
        let mut docs: Vec<&'static str> = KNOWLEDGE_BASE
            .iter()
            .filter(|(category, _)| category.split('_').any(|kw| query.contains(kw)))
            .flat_map(|(_, docs)| docs.iter().copied())
            .collect();

        if docs.is_empty() {
            docs.extend_from_slice(FALLBACK_DOCS);
        }
        docs.truncate(MAX_DOCS);
        docs
    }
}

#[async_trait]
impl StepHandler for KnowledgeRetriever {
    fn capability(&self) -> Capability {
        Capability::Retrieve
    }

    async fn handle(&self, step: &Step, _context: &Context) -> Result<String, HandlerError> {
        let query = require_input(step, "query")?;
        simulate_latency(self.latency).await;

        let docs = Self::search(query);
        tracing::debug!(step_id = %step.step_id, matched = docs.len(), "Retrieved context");

        Ok(docs
            .iter()
            .map(|doc| format!("- {doc}"))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_by_category_keyword() {
        let docs = KnowledgeRetriever::search("Learn ASYNC programming");
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0], "Async/await enables concurrent execution");
    }

    #[test]
    fn keywords_match_inside_words() {
        // "explain" contains "ai"
        let docs = KnowledgeRetriever::search("explain async programming");
        assert_eq!(docs[0], "AI systems require orchestration layers");
    }

    #[test]
    fn caps_results() {
        // "task" and "systems" hit two categories (six docs)
        let docs = KnowledgeRetriever::search("task systems");
        assert_eq!(docs.len(), MAX_DOCS);
        assert_eq!(docs[0], "Tasks are broken into atomic steps");
    }

    #[test]
    fn falls_back_when_nothing_matches() {
        let docs = KnowledgeRetriever::search("zzz");
        assert_eq!(docs, FALLBACK_DOCS);
    }

    #[tokio::test]
    async fn handle_formats_bullets() {
        let step = Step::new("step_001", Capability::Retrieve, "fetch")
            .with_input("query", "async programming");
        let out = KnowledgeRetriever::new(Duration::ZERO)
            .handle(&step, &Context::new())
            .await
            .unwrap();
        assert!(out.lines().all(|line| line.starts_with("- ")));
        assert_eq!(out.lines().count(), 3);
    }

    #[tokio::test]
    async fn missing_query_is_an_error() {
        let step = Step::new("step_001", Capability::Retrieve, "fetch");
        let err = KnowledgeRetriever::new(Duration::ZERO)
            .handle(&step, &Context::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            HandlerError::MissingInput {
                key: "query".to_string()
            }
        );
    }
}
