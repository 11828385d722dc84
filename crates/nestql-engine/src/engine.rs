//! Engine: catalog, configuration and database wired into sessions.

use std::sync::Arc;

use nestql_common::utils::error::Result;
use nestql_core::database::Database;
use nestql_core::middleware::{CommandPipeline, standard_pipeline_observed};
use nestql_core::pipeline::StageObserver;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::query::{Executor, QueryProcessor};
use crate::session::Session;

/// The main nestql entry point.
///
/// Holds the read-only catalog and configuration, and the per-command
/// pipeline built around a database adapter. Sessions share all three.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use nestql_adapters::storage::MemoryDatabase;
/// use nestql_engine::{Catalog, Engine};
/// use nestql_engine::catalog::Model;
///
/// let catalog = Catalog::builder()
///     .model(Model::new("post", "posts").scalar("title"))
///     .build()
///     .unwrap();
/// let engine = Engine::new(catalog, Arc::new(MemoryDatabase::new()));
/// let session = engine.session();
/// ```
pub struct Engine {
    catalog: Arc<Catalog>,
    config: Config,
    database: Arc<dyn Database>,
    observers: Vec<Arc<dyn StageObserver>>,
    pipeline: CommandPipeline,
}

impl Engine {
    /// Creates an engine with the default configuration.
    #[must_use]
    pub fn new(catalog: Catalog, database: Arc<dyn Database>) -> Self {
        let config = Config::default();
        let pipeline = standard_pipeline_observed(config.stage_settings(), Arc::clone(&database), Vec::new());
        Self {
            catalog: Arc::new(catalog),
            config,
            database,
            observers: Vec::new(),
            pipeline,
        }
    }

    /// Creates an engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is inconsistent.
    pub fn with_config(catalog: Catalog, database: Arc<dyn Database>, config: Config) -> Result<Self> {
        config.validate()?;
        let mut engine = Self::new(catalog, database);
        engine.config = config;
        engine.rebuild_pipeline();
        Ok(engine)
    }

    /// Attaches an extra stage observer to the per-command pipeline.
    #[must_use]
    pub fn observe(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observers.push(observer);
        self.rebuild_pipeline();
        self
    }

    /// Opens a session.
    #[must_use]
    pub fn session(&self) -> Session {
        let executor = Executor::new(self.pipeline.clone(), self.config.max_concurrency);
        let processor = QueryProcessor::new(
            Arc::clone(&self.catalog),
            executor,
            self.config.error_policy,
        );
        Session::new(processor, self.config.clone())
    }

    /// The schema catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Name of the database adapter.
    #[must_use]
    pub fn database_name(&self) -> &'static str {
        self.database.name()
    }

    /// Stage names of the per-command pipeline, in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.pipeline.stage_names()
    }

    fn rebuild_pipeline(&mut self) {
        self.pipeline = standard_pipeline_observed(
            self.config.stage_settings(),
            Arc::clone(&self.database),
            self.observers.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Model;
    use crate::config::ErrorPolicy;
    use nestql_adapters::storage::MemoryDatabase;
    use nestql_core::pipeline::PerfRecorder;

    fn catalog() -> Catalog {
        Catalog::builder()
            .model(Model::new("post", "posts").scalar("title"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_engine_wiring() {
        let engine = Engine::new(catalog(), Arc::new(MemoryDatabase::new()));
        assert_eq!(engine.database_name(), "memory");
        assert_eq!(engine.catalog().len(), 1);
        assert_eq!(engine.stage_names().first(), Some(&"failure_handler"));
        assert_eq!(engine.stage_names().last(), Some(&"database_execute"));
        assert_eq!(engine.session().config().error_policy, ErrorPolicy::Request);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config::default().with_max_concurrency(0);
        assert!(Engine::with_config(catalog(), Arc::new(MemoryDatabase::new()), config).is_err());
    }

    #[tokio::test]
    async fn test_observers_see_commands() {
        let recorder = Arc::new(PerfRecorder::new());
        let engine = Engine::new(catalog(), Arc::new(MemoryDatabase::new()))
            .observe(Arc::clone(&recorder) as Arc<dyn StageObserver>);
        let result = engine
            .session()
            .execute(crate::session::QueryRequest::new("{ find_posts { id } }"))
            .await;
        assert!(!result.response.has_errors());
        assert!(recorder.timings().iter().any(|t| t.stage == "database_execute"));
    }
}
