//! Storage backends for jobs and executions

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::{InMemoryExecutionRepository, InMemoryJobRepository};
pub use postgres::{PgExecutionRepository, PgJobRepository};
pub use traits::{ExecutionRepositoryTrait, JobRepositoryTrait};
