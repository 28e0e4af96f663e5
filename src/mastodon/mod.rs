// Destination side: the Mastodon server the bridge publishes to.
//
// `client` talks HTTP, `capabilities` describes the server's limits,
// `error` classifies failures and `publish` is the retrying state machine
// built on top of the `Destination` trait.

pub mod capabilities;
pub mod client;
pub mod error;
pub mod publish;
pub mod traits;

pub use capabilities::DestinationCapabilities;
pub use client::MastodonClient;
pub use error::{classify, DestinationError, ErrorCategory};
pub use publish::{publish, upload_media, PublicationAttempt, PublishPolicy, Transition};
pub use traits::{Destination, StatusRequest};
