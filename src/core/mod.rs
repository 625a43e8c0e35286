pub mod batch;
pub mod direct_downloader;
pub mod downloader;
pub mod error;
pub mod ffmpeg;
pub mod filename;
pub mod hls_downloader;
pub mod http_client;
pub mod manifest;
pub mod organizer;
pub mod process;
pub mod queue;
pub mod retry;
pub mod rewriter;
pub mod segment_store;
pub mod subtitles;
pub mod url_resolver;
