// SAM Sync - Core Library
// raw SAM extracts → silver (normalized) → gold (Site / Party aggregates)

pub mod config;
pub mod error;
pub mod parser;
pub mod formatting;
pub mod lookup;
pub mod temporal;       // Change tracking for value objects
pub mod entities;       // Gold aggregates and value objects
pub mod silver;         // Normalizer + party aggregator
pub mod correlation;    // Herd / party / role bridge records
pub mod deduplication;  // Representative selection, distinct codes
pub mod gold;           // Site and Party consolidation
pub mod store;
pub mod lock;
pub mod reconciliation;
pub mod pipeline;

// Re-export commonly used types
pub use config::SyncConfig;
pub use error::{PipelineError, PipelineResult};
pub use parser::{load_directory, RawExtracts, RawHerd, RawHolder, RawHolding, RawParty};
pub use lookup::{CachedLookup, InMemoryReferenceData, ReferenceDataLookup, ReferenceItem, ReferenceKind};
pub use entities::{Party, PartyRole, Site};
pub use silver::{SilverHerd, SilverHolding, SilverParty, SilverPartyRoleRelationship};
pub use correlation::SiteGroupMarkRelationship;
pub use gold::SitePartyRoleRelationship;
pub use store::{Document, DocumentStore, Filter, MemoryStore, PartyDirectory, SqliteStore};
pub use lock::{DistributedLock, InMemoryLock, LockToken};
pub use reconciliation::{CollectionReport, ReconciliationReport};
pub use pipeline::{group_batches, HoldingBatch, SyncPipeline, SyncStore, UnitReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
