pub mod douyin;
pub mod ffmpeg;
pub mod http;
pub mod netease;
pub mod registry;
pub mod ytdlp;
