pub mod embedded;
pub mod kv;
pub mod memory;

pub use embedded::RedbKvStore;
pub use kv::{job_key, job_scan_prefix, workflow_key, KvStore, WORKFLOW_SCAN_PREFIX};
pub use memory::MemoryKvStore;
