// Tootbridge: republish a Twitter feed onto a Mastodon instance.
//
// This is the library root. Each module corresponds to one stage of the
// republishing pipeline, leaf-first: media handling and text rewriting feed
// the publication state machine, and the ledger keeps runs idempotent.

pub mod config;
pub mod db;
pub mod feed;
pub mod mastodon;
pub mod media;
pub mod pipeline;
pub mod retry;
pub mod rewrite;
pub mod status;
