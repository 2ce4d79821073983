//! Domain model for relay streams.

mod error;
mod ids;
mod media;
mod status;
mod stream;
mod target;

pub use error::{ParseStreamStatusError, StreamDomainError};
pub use ids::{OwnerId, StreamId};
pub use media::VideoFile;
pub use status::StreamStatus;
pub use stream::{NewStreamParams, PersistedStreamData, Stream};
pub use target::RelayTarget;
