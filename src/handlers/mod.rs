//! Step handlers: the strategies that do the work of each capability.

pub mod builtin;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::HandlerConfig;
use crate::error::{ConfigError, HandlerError};
use crate::task::{Capability, Context, Step};

/// Performs the work of one capability.
///
/// Handlers read their named inputs from the step and earlier outputs from
/// the context; they never mutate either.
#[async_trait]
pub trait StepHandler: Send + Sync {
    fn capability(&self) -> Capability;

    async fn handle(&self, step: &Step, context: &Context) -> Result<String, HandlerError>;
}

/// Lookup table from capability to handler. Complete by construction.
#[derive(Clone)]
pub struct HandlerRegistry {
    retrieve: Arc<dyn StepHandler>,
    analyze: Arc<dyn StepHandler>,
    generate: Arc<dyn StepHandler>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Registry of the built-in simulated handlers.
    pub fn builtin(config: &HandlerConfig) -> Self {
        Self {
            retrieve: Arc::new(builtin::KnowledgeRetriever::new(config.retrieval_latency)),
            analyze: Arc::new(builtin::StrategyAnalyzer::new(config.analysis_latency)),
            generate: Arc::new(builtin::ReportWriter::new(config.generation_latency)),
        }
    }

    pub fn get(&self, capability: Capability) -> &Arc<dyn StepHandler> {
        match capability {
            Capability::Retrieve => &self.retrieve,
            Capability::Analyze => &self.analyze,
            Capability::Generate => &self.generate,
        }
    }
}

/// Collects handlers and checks every capability is covered exactly once.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: Vec<Arc<dyn StepHandler>>,
}

impl HandlerRegistryBuilder {
    pub fn register(mut self, handler: Arc<dyn StepHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Fill any capability not yet registered with its built-in handler.
    pub fn with_builtin_defaults(mut self, config: &HandlerConfig) -> Self {
        let builtin = HandlerRegistry::builtin(config);
        for capability in Capability::ALL {
            if !self.handlers.iter().any(|h| h.capability() == capability) {
                self.handlers.push(builtin.get(capability).clone());
            }
        }
        self
    }

    pub fn build(self) -> Result<HandlerRegistry, ConfigError> {
        let mut retrieve = None;
        let mut analyze = None;
        let mut generate = None;

        for handler in self.handlers {
            let capability = handler.capability();
            let slot = match capability {
                Capability::Retrieve => &mut retrieve,
                Capability::Analyze => &mut analyze,
                Capability::Generate => &mut generate,
            };
            if slot.replace(handler).is_some() {
                return Err(ConfigError::DuplicateHandler { capability });
            }
        }

        Ok(HandlerRegistry {
            retrieve: retrieve.ok_or(ConfigError::MissingHandler {
                capability: Capability::Retrieve,
            })?,
            analyze: analyze.ok_or(ConfigError::MissingHandler {
                capability: Capability::Analyze,
            })?,
            generate: generate.ok_or(ConfigError::MissingHandler {
                capability: Capability::Generate,
            })?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Capability, &'static str);

    #[async_trait]
    impl StepHandler for Fixed {
        fn capability(&self) -> Capability {
            self.0
        }

        async fn handle(&self, _step: &Step, _context: &Context) -> Result<String, HandlerError> {
            Ok(self.1.to_string())
        }
    }

    #[test]
    fn builder_requires_every_capability() {
        let err = HandlerRegistry::builder()
            .register(Arc::new(Fixed(Capability::Retrieve, "r")))
            .register(Arc::new(Fixed(Capability::Generate, "g")))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ConfigError::MissingHandler {
                capability: Capability::Analyze
            }
        ));
    }

    #[test]
    fn builder_rejects_duplicates() {
        let err = HandlerRegistry::builder()
            .register(Arc::new(Fixed(Capability::Retrieve, "a")))
            .register(Arc::new(Fixed(Capability::Retrieve, "b")))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::DuplicateHandler { .. }));
    }

    #[tokio::test]
    async fn defaults_fill_gaps_only() {
        let registry = HandlerRegistry::builder()
            .register(Arc::new(Fixed(Capability::Analyze, "custom")))
            .with_builtin_defaults(&HandlerConfig::instant())
            .build()
            .unwrap();

        let step = Step::new("step_002", Capability::Analyze, "analyze");
        let out = registry
            .get(Capability::Analyze)
            .handle(&step, &Context::new())
            .await
            .unwrap();
        assert_eq!(out, "custom");
        assert_eq!(registry.get(Capability::Generate).capability(), Capability::Generate);
    }
}
