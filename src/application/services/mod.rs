pub mod offline_service;
pub mod sync_service;

pub use offline_service::{FlushOutcome, OfflineQueueService};
pub use sync_service::{DeltaSyncReport, FullSyncReport, SyncService, SyncStatus};
