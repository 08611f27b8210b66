use rulesmith::Backends;
use rulesmith::RunLoop;
use rulesmith::config::SimulationConfig;
use rulesmith::store::{NewRun, RunStore, SqliteRunStore};
use std::sync::Arc;

pub struct Harness {
    pub store: Arc<dyn RunStore>,
    pub runner: RunLoop,
}

impl Harness {
    pub async fn simulated() -> Self {
        Self::with_backends(Backends::simulation(SimulationConfig::instant())).await
    }

    pub async fn with_backends(backends: Backends) -> Self {
        let store: Arc<dyn RunStore> = Arc::new(SqliteRunStore::open_in_memory().await.unwrap());
        let runner = RunLoop::new(Arc::clone(&store), backends);
        Self { store, runner }
    }

    pub async fn create_run(&self, max_attempts: u32, target_score: u32) -> String {
        self.store
            .create_run(&NewRun::new(
                Some("Duplicate charge"),
                "Reply to a customer charged twice. Stay under 90 words.",
                max_attempts,
                target_score,
            ))
            .await
            .unwrap()
            .id
    }
}
