//! HLS output: segment store and live playlist

pub mod playlist;
pub mod segmenter;

pub use playlist::{LivePlaylist, SegmentInfo};
pub use segmenter::{HlsConfig, HlsSegmenter};
