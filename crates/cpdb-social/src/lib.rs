//! Client for the remote social-data API: profile lookups and recent posts.

pub mod client;
pub mod error;
pub mod types;

pub use client::SocialClient;
pub use error::SocialError;
pub use types::{parse_remote_time, RemotePost, RemoteProfile, TimelineResponse};
