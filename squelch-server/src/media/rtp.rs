use bytes::Bytes;
use rand::Rng;
use webrtc::rtp::header::Header;
use webrtc::rtp::packet::Packet;

/// Fixed Opus payload type used on every outbound track.
pub const OPUS_PAYLOAD_TYPE: u8 = 111;

/// One 20 ms Opus frame at 48 kHz.
pub const SAMPLES_PER_FRAME: u32 = 960;

/// Stamps Opus frames into RTP packets for one outbound source:
/// sequence monotone mod 2^16, timestamp advancing by one frame of
/// samples, SSRC randomized at construction.
pub struct RtpStamper {
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
}

impl RtpStamper {
    pub fn new() -> Self {
        Self {
            sequence: 0,
            timestamp: 0,
            ssrc: rand::thread_rng().gen(),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn packet(&mut self, payload: Bytes) -> Packet {
        let packet = Packet {
            header: Header {
                version: 2,
                payload_type: OPUS_PAYLOAD_TYPE,
                sequence_number: self.sequence,
                timestamp: self.timestamp,
                ssrc: self.ssrc,
                ..Default::default()
            },
            payload,
        };
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(SAMPLES_PER_FRAME);
        packet
    }
}

impl Default for RtpStamper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_advance_per_frame() {
        let mut stamper = RtpStamper::new();
        let a = stamper.packet(Bytes::from_static(&[0xfc]));
        let b = stamper.packet(Bytes::from_static(&[0xfc]));

        assert_eq!(a.header.version, 2);
        assert_eq!(a.header.payload_type, OPUS_PAYLOAD_TYPE);
        assert!(!a.header.marker);
        assert_eq!(b.header.sequence_number, a.header.sequence_number.wrapping_add(1));
        assert_eq!(b.header.timestamp, a.header.timestamp.wrapping_add(SAMPLES_PER_FRAME));
        assert_eq!(a.header.ssrc, b.header.ssrc);
    }

    #[test]
    fn sequence_wraps_mod_2_16() {
        let mut stamper = RtpStamper::new();
        stamper.sequence = u16::MAX;
        let a = stamper.packet(Bytes::new());
        let b = stamper.packet(Bytes::new());
        assert_eq!(a.header.sequence_number, u16::MAX);
        assert_eq!(b.header.sequence_number, 0);
    }
}
