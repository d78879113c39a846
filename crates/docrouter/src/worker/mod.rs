pub mod batch;
pub mod job;
pub mod pool;

pub use batch::{run_batch, BatchReport};
pub use job::{Job, JobResult};
pub use pool::WorkerPool;
