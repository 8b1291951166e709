//! Resumable social-graph corpus crawler.
//!
//! Starting from seed handles, the crawler resolves profiles, gates them on
//! an [`AcceptancePolicy`], and keeps expanding accepted profiles into
//! relationship edges and messages. All state lives in a SQLite corpus, so
//! a killed process resumes where it stopped without re-fetching stored data.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use corpus_crawler::{AcceptAll, CorpusStore, Crawler, PassScheduler};
//!
//! let store = CorpusStore::open("rustaceans.db".as_ref()).await?;
//! let (writer, writer_task) = store.spawn_writer(100).await?;
//!
//! let mut scheduler = PassScheduler::new(std::time::Duration::from_secs(2));
//! scheduler.supervise("store_writer", writer_task.run());
//!
//! let crawler = Arc::new(Crawler::new(api, AcceptAll, store, writer));
//! crawler.seed(["rustlang"]).await?;
//! crawler.run(scheduler).await?;
//! ```

pub mod client;
pub mod config;
pub mod crawler;
pub mod error;
pub mod identity;
pub mod pagination;
pub mod policy;
pub mod scheduler;
pub mod storage;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::CrawlConfig;
pub use crawler::{Crawler, DrainSummary};
pub use error::{CrawlError, Result, StorageError};
pub use identity::Identity;
pub use policy::{AcceptAll, DescriptionKeywords, LanguageIs};
pub use scheduler::{repeat, PassScheduler};
pub use storage::{CorpusStore, PendingId, StoreWriter, WriterTask};
pub use traits::{AcceptancePolicy, SocialApi};
pub use types::{
    CorpusCounts, FetchedMessage, Profile, Relationship, RelationshipPage, ResolutionOutcome,
    ResolvedProfile,
};
