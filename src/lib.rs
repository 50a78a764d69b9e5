pub mod app;
pub mod cli;
pub mod handlers;
pub mod message;
pub mod models;
pub mod operations;
pub mod storage;
pub mod transfer;
pub mod ui;

pub use app::App;
pub use operations::run_app;
pub use storage::{ObjectStore, StorageError};
pub use transfer::{DownloadManager, TransferItem, TransferStatus, UploadManager};
