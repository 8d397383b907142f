// Desktop playback engine: Symphonia decoding of local files and HTTP
// streams into a cpal output stream

pub mod config;
pub mod decode;
pub mod demux;
pub mod engine;
pub mod http;
pub mod rate;
pub mod ring;
mod worker;

pub use config::EngineConfig;
pub use demux::Location;
pub use engine::DesktopEngine;
pub use http::HttpRangeSource;
