pub mod config;
pub mod db;
pub mod error;
pub mod ipc;
pub mod models;
pub mod oracle;
pub mod outline;
pub mod timeline;
pub mod tree;

pub use config::QuorumConfig;
pub use error::QuorumError;
pub use oracle::{
    AgendaCandidate, AgendaSection, GeminiOracleClient, MeetingSummary, OracleConfig,
    OracleError, SegmentForReview, SegmentVerdict, SummarizationOracle,
};
pub use outline::Outline;
pub use tree::{AgendaArena, MovePlan, TreeEntry};
