//! Download system for chandl

pub mod dispatcher;
pub mod extractor;
pub mod fetcher;
pub mod thumbnail;
pub mod ytdlp;

pub use dispatcher::{
    ArtifactKind, ArtifactSelection, DispatchEvent, DispatchHandle, DispatchRequest,
    DispatchSummary, Dispatcher,
};
pub use extractor::ArchiveExtractor;
pub use fetcher::AssetFetcher;
pub use thumbnail::{ThumbnailSize, ThumbnailWriter};
pub use ytdlp::{ProcessRunner, ToolPaths, ToolRunner};
