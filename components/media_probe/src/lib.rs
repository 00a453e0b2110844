// components/media_probe/src/lib.rs
mod classify;
mod tools;
mod types;
mod ytdlp;

pub use classify::{classify, UrlKind};
pub use tools::{locate_tools, ToolPaths};
pub use types::{MetadataSource, PlaylistEntry, ProbeError, TrackInfo};
pub use ytdlp::YtDlp;
