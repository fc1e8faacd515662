///! External venue reconciliation engine
///!
///! ## Components
///! - `scorer`: name normalization, fuzzy similarity, haversine distance
///! - `matcher`: best catalog entry for one candidate, against a run snapshot
///! - `store` / `table`: candidate table and catalog seams, file-backed implementations
///! - `reconciler`: chunked, idempotent commit of fetched candidates
///! - `sync`: per-region orchestration under a single-flight lease
///! - `curator`: human dispositions (import / ignore / link / mark missing)

pub mod scorer;
pub mod matcher;
pub mod store;
pub mod table;
pub mod reconciler;
pub mod sync;
pub mod curator;

pub use curator::{Curator, CuratorError};
pub use matcher::{CatalogMatch, CatalogSnapshot, MatchKind, find_best_match};
pub use reconciler::{CommitReport, Reconciler};
pub use scorer::{great_circle_distance_meters, name_similarity, normalize, strip_generic_prefix};
pub use store::{CandidateBatch, CandidateStore, CatalogRepository, StoreError};
pub use sync::{SYNC_JOB, SyncError, SyncOrchestrator, SyncSettings};
pub use table::{CandidateTable, VenueCatalog};
