// Download strategies

pub mod direct;
pub mod ytdlp;

pub use direct::DirectStrategy;
pub use ytdlp::YtDlpStrategy;
