pub mod id;
pub mod stream;
pub mod token;

pub use id::{generate_id, StreamId, TargetId};
pub use stream::{ActiveStream, FrameError, Stream, StreamSnapshot, StreamState, StreamStatus};
pub use token::AuthToken;
