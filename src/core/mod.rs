//! Core functionality for chandl

pub mod filter;
pub mod progress;
pub mod scanner;
pub mod updater;
pub mod video_info;

pub use filter::{FilterCriteria, FilterOutcome};
pub use progress::Progress;
pub use scanner::{ChannelScanner, ScanProgress, ScanResult};
pub use updater::{ToolUpdater, UpdaterConfig};
pub use video_info::{ThumbnailSet, VideoRecord};
