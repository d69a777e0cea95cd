#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use gomander::app::{App, AppSettings};
use gomander::engine::CoordinatorOptions;
use gomander::fs::RealFileSystem;
use gomander::project::{Project, ProjectStore};
use gomander_test_utils::fake_backend::FakeBackend;

pub use gomander_test_utils::{init_tracing, wait_for_event, with_timeout};

/// Short timings so stop escalation and draining are quick in tests.
pub fn fast_options() -> CoordinatorOptions {
    CoordinatorOptions {
        stop_grace: Duration::from_millis(200),
        drain_timeout: Duration::from_millis(100),
    }
}

/// An app over a scratch data directory and a fake backend.
pub struct Harness {
    pub app: App,
    pub backend: Arc<FakeBackend>,
    pub data_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let data_dir = gomander_test_utils::builders::data_dir();
        let backend = FakeBackend::new();
        let settings = AppSettings::new(data_dir.path())
            .with_backend(backend.clone())
            .with_coordinator_options(fast_options())
            .with_batch_interval(Duration::from_millis(5));
        let app = App::new(settings).expect("app should start");
        Self {
            app,
            backend,
            data_dir,
        }
    }

    /// Store `project` and open it.
    pub async fn with_project(project: Project) -> Self {
        let h = Self::new();
        h.store().save(&project).expect("save project");
        h.app.open_project(&project.id).await.expect("open project");
        h
    }

    pub fn store(&self) -> ProjectStore {
        ProjectStore::new(Arc::new(RealFileSystem), self.data_dir.path())
    }
}
