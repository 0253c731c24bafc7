pub mod evaluate;
pub mod experiment;
pub mod guardrail;
pub mod json_store;
pub mod lifecycle;
pub mod locks;
pub mod proposer;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod testutil;
pub mod traits;

pub use evaluate::EvaluationEngine;
pub use experiment::*;
pub use json_store::JsonStore;
pub use lifecycle::LifecycleEngine;
pub use locks::ListingLocks;
pub use proposer::ProposalService;
pub use snapshot::SnapshotService;
pub use store::{ExperimentSettings, ExperimentStore};
pub use sync::SyncService;
pub use traits::{MarketplaceClient, ProposalDraft, ProposalGenerator};
