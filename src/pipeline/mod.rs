// Per-post orchestration: link attachment and the batch loop.

pub mod attach;
pub mod bridge;

pub use attach::{Attachments, LinkHandler};
pub use bridge::{Bridge, BridgeOptions, RunSummary};
