//! Turning a movie and a requested quality into something a player can
//! fetch.

mod error;
mod legacy;
mod playback;
mod resolver;

pub use crate::layout::MediaLayout;
pub use error::{ResolveError, ResolveResult};
pub use legacy::LegacyOverrides;
pub use playback::{DownloadResolution, PlaybackService, PlaybackStart};
pub use resolver::{ResolutionSource, StreamResolution, StreamResolver};
