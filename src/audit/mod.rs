// Audit trail for admission decisions and admin operations

pub mod logger;
pub mod storage;
pub mod types;

pub use logger::AuditLogger;
pub use storage::{AuditStorage, MemoryAuditStorage};
pub use types::{AuditAction, AuditEntry, AuditLevel, AuditQuery};
