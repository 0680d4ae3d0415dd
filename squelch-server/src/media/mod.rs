mod fanout;
mod ogg;
mod rtp;
mod sdp;

pub use fanout::Fanout;
pub use ogg::{crc32, OggDemux, OggMux};
pub use rtp::{RtpStamper, OPUS_PAYLOAD_TYPE, SAMPLES_PER_FRAME};
pub use sdp::force_opus_mono;
