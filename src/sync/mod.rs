mod credential;
mod gdrive;
mod lock;
mod notion;

pub use credential::{TokenProvider, TokenRefresher};
pub use gdrive::DriveSyncWorker;
pub use lock::KeyedLockRegistry;
pub use notion::{NotionSyncWorker, SyncMode};
