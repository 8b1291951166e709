//! Test harness backed by a throwaway SQLite corpus.
//!
//! Each harness owns a temporary directory holding one corpus database and a
//! running store writer. Reopening the same path simulates a process restart.

use std::path::{Path, PathBuf};

use corpus_crawler::testing::MockSocialApi;
use corpus_crawler::{AcceptancePolicy, CorpusStore, Crawler};
use tempfile::TempDir;

pub fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestCorpus {
    dir: TempDir,
}

impl TestCorpus {
    pub fn new() -> Self {
        init_tracing();
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("corpus.db")
    }

    pub async fn store(&self) -> CorpusStore {
        CorpusStore::open(&self.path()).await.expect("open corpus")
    }

    /// A crawler over this corpus with its writer running in the background.
    pub async fn crawler<P: AcceptancePolicy>(
        &self,
        api: MockSocialApi,
        policy: P,
    ) -> Crawler<MockSocialApi, P> {
        open_crawler(&self.path(), api, policy).await
    }
}

pub async fn open_crawler<P: AcceptancePolicy>(
    path: &Path,
    api: MockSocialApi,
    policy: P,
) -> Crawler<MockSocialApi, P> {
    let store = CorpusStore::open(path).await.expect("open corpus");
    let (writer, writer_task) = store.spawn_writer(100).await.expect("open writer");
    tokio::spawn(writer_task.run());
    Crawler::new(api, policy, store, writer)
}
