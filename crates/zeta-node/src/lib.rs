//! Zeta Network node runtime.
//!
//! Owns the session manager, the message pipeline and the stats
//! tracker, and drives them from a single event loop task.

pub mod command;
pub mod dedup;
pub mod event_loop;
pub mod node;
pub mod observer;
pub mod pipeline;
pub mod session;
pub mod stats;

pub use command::{NodeCommand, NodeStatus};
pub use node::{Node, NodeParts, NodeState};
pub use observer::{ObserverRegistry, SessionObserver};
pub use pipeline::{IngestOutcome, MessagePipeline};
pub use session::{SessionManager, SessionState};
pub use stats::{SessionStats, StatsSnapshot};
