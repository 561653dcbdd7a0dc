//! Remote Client and Per-User Serializer: the only network-facing
//! capability boundary in the system.

pub mod client;
pub mod error;
pub mod models;
pub mod serializer;
pub mod token;

pub use client::{DeviceInfo, PlaybackObservation, RemoteClient, SpotifyRemoteClient};
pub use error::{RemoteError, Result};
pub use serializer::PerUserSerializer;
pub use token::{Token, TokenStore};
