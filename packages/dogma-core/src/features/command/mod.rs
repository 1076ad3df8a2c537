//! Component F: the replicated command executor. `domain` defines the
//! command envelope and its outcomes, `ports` the leader-election and
//! replication-log collaborators, `infrastructure` ships in-process
//! reference implementations of both, `registry` owns every live
//! project/repository/session, and `executor` ties it all together.

pub mod domain;
pub mod executor;
pub mod infrastructure;
pub mod ports;
pub mod registry;

pub use domain::{Command, CommandOutcome, Session, Transformer};
pub use executor::CommandExecutor;
pub use ports::{LeaderElection, LogRecord, ReplicatedLog};
pub use registry::RepositoryRegistry;
