pub mod api;
pub mod client;

pub use client::{create_trakt_client, TraktClient};
