use std::collections::VecDeque;

use once_cell::sync::Lazy;

/// Samples-per-packet granule advance for 20 ms Opus frames at 48 kHz.
const GRANULE_PER_PACKET: u64 = 960;

const PAGE_HEADER_LEN: usize = 27;
const MAGIC: &[u8; 4] = b"OggS";

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;

static CRC_TABLE: Lazy<[u32; 256]> = Lazy::new(|| {
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut r = (i as u32) << 24;
        for _ in 0..8 {
            r = if r & 0x8000_0000 != 0 {
                (r << 1) ^ 0x04C1_1DB7
            } else {
                r << 1
            };
        }
        *entry = r;
    }
    table
});

/// The Ogg CRC-32: polynomial 0x04C11DB7, non-reflected, initial value 0,
/// no final xor. Distinct from the Ethernet/zlib variant.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &b in data {
        crc = (crc << 8) ^ CRC_TABLE[(((crc >> 24) as u8) ^ b) as usize];
    }
    crc
}

fn lacing_values(len: usize) -> Vec<u8> {
    let mut values = Vec::with_capacity(len / 255 + 1);
    let mut rem = len;
    loop {
        if rem >= 255 {
            values.push(255);
            rem -= 255;
        } else {
            values.push(rem as u8);
            break;
        }
    }
    values
}

fn build_page(serial: u32, page_seq: u32, granule: u64, flags: u8, packet: &[u8]) -> Vec<u8> {
    let lacing = lacing_values(packet.len());
    let mut page = Vec::with_capacity(PAGE_HEADER_LEN + lacing.len() + packet.len());
    page.extend_from_slice(MAGIC);
    page.push(0); // stream structure version
    page.push(flags);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&page_seq.to_le_bytes());
    page.extend_from_slice(&[0, 0, 0, 0]); // crc, patched below
    page.push(lacing.len() as u8);
    page.extend_from_slice(&lacing);
    page.extend_from_slice(packet);

    let crc = crc32(&page);
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

fn opus_head() -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(1); // mono
    head.extend_from_slice(&312u16.to_le_bytes()); // pre-skip
    head.extend_from_slice(&48_000u32.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes()); // output gain
    head.push(0); // mapping family
    head
}

fn opus_tags() -> Vec<u8> {
    let vendor = b"squelch";
    let mut tags = Vec::with_capacity(8 + 4 + vendor.len() + 4);
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor);
    tags.extend_from_slice(&0u32.to_le_bytes());
    tags
}

/// Frames Opus packets into an Ogg stream for the speaker and recorder
/// subprocess pipes. Header pages go out once per stream; the granule
/// position then rises monotonically, which in persistent-speaker mode
/// spans silences between floor sessions.
pub struct OggMux {
    serial: u32,
    page_seq: u32,
    granule: u64,
    headers_done: bool,
}

impl OggMux {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            page_seq: 0,
            granule: 0,
            headers_done: false,
        }
    }

    pub fn headers_done(&self) -> bool {
        self.headers_done
    }

    /// OpusHead (page 0, BOS) followed by OpusTags (page 1).
    pub fn header_pages(&mut self) -> Vec<u8> {
        let mut out = build_page(self.serial, self.page_seq, 0, FLAG_BOS, &opus_head());
        self.page_seq += 1;
        out.extend_from_slice(&build_page(self.serial, self.page_seq, 0, 0, &opus_tags()));
        self.page_seq += 1;
        self.headers_done = true;
        out
    }

    /// One audio packet per page; granule advances one frame per packet.
    pub fn audio_page(&mut self, packet: &[u8]) -> Vec<u8> {
        self.granule += GRANULE_PER_PACKET;
        let page = build_page(self.serial, self.page_seq, self.granule, 0, packet);
        self.page_seq += 1;
        page
    }
}

/// Incremental Ogg parser for the microphone subprocess's stdout.
///
/// Resynchronizes on the page magic, carries packets across page
/// boundaries, and swallows the two header packets so callers only ever
/// see audio frames. CRCs are not verified; the producer is a local pipe.
pub struct OggDemux {
    buf: Vec<u8>,
    partial: Vec<u8>,
    packets: VecDeque<Vec<u8>>,
}

impl OggDemux {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            partial: Vec::new(),
            packets: VecDeque::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        while self.try_parse_page() {}
    }

    pub fn next_packet(&mut self) -> Option<Vec<u8>> {
        self.packets.pop_front()
    }

    fn try_parse_page(&mut self) -> bool {
        // Resync: discard anything before the page magic.
        match find_magic(&self.buf) {
            Some(0) => {}
            Some(n) => {
                self.buf.drain(..n);
            }
            None => {
                let keep = self.buf.len().min(3);
                self.buf.drain(..self.buf.len() - keep);
                return false;
            }
        }

        if self.buf.len() < PAGE_HEADER_LEN {
            return false;
        }
        let flags = self.buf[5];
        let n_segments = self.buf[26] as usize;
        let header_len = PAGE_HEADER_LEN + n_segments;
        if self.buf.len() < header_len {
            return false;
        }
        let lacing = &self.buf[PAGE_HEADER_LEN..header_len];
        let body_len: usize = lacing.iter().map(|&v| v as usize).sum();
        if self.buf.len() < header_len + body_len {
            return false;
        }

        if flags & FLAG_CONTINUED == 0 {
            self.partial.clear();
        }

        let mut offset = header_len;
        for &value in &self.buf[PAGE_HEADER_LEN..header_len].to_vec() {
            let value = value as usize;
            self.partial.extend_from_slice(&self.buf[offset..offset + value]);
            offset += value;
            if value < 255 {
                let packet = std::mem::take(&mut self.partial);
                if !packet.starts_with(b"OpusHead") && !packet.starts_with(b"OpusTags") {
                    self.packets.push_back(packet);
                }
            }
        }

        self.buf.drain(..header_len + body_len);
        true
    }
}

impl Default for OggDemux {
    fn default() -> Self {
        Self::new()
    }
}

fn find_magic(buf: &[u8]) -> Option<usize> {
    buf.windows(MAGIC.len()).position(|w| w == MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_known_vector() {
        // 0x04C11DB7 / init 0 / no reflection / no final xor over "123456789".
        assert_eq!(crc32(b"123456789"), 0x89A1_897F);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn header_pages_carry_bos_and_magic() {
        let mut mux = OggMux::new(0x5153);
        let headers = mux.header_pages();
        assert_eq!(&headers[..4], b"OggS");
        assert_eq!(headers[5], FLAG_BOS);
        assert!(mux.headers_done());

        // Second page starts right after the first and is not BOS.
        let second = find_magic(&headers[4..]).unwrap() + 4;
        assert_eq!(headers[second + 5], 0);
    }

    #[test]
    fn page_crc_is_patched_in() {
        let page = build_page(1, 0, 960, 0, &[0xfc, 0xff, 0xfe]);
        let mut zeroed = page.clone();
        zeroed[22..26].copy_from_slice(&[0, 0, 0, 0]);
        let crc = u32::from_le_bytes([page[22], page[23], page[24], page[25]]);
        assert_eq!(crc, crc32(&zeroed));
    }

    #[test]
    fn demux_returns_audio_packets_and_skips_headers() {
        let mut mux = OggMux::new(7);
        let mut stream = mux.header_pages();
        stream.extend_from_slice(&mux.audio_page(&[0xfc, 1, 2, 3]));
        stream.extend_from_slice(&mux.audio_page(&[0xfd, 4, 5]));

        let mut demux = OggDemux::new();
        // Feed byte-by-byte to exercise incremental parsing.
        for b in stream {
            demux.push(&[b]);
        }
        assert_eq!(demux.next_packet(), Some(vec![0xfc, 1, 2, 3]));
        assert_eq!(demux.next_packet(), Some(vec![0xfd, 4, 5]));
        assert_eq!(demux.next_packet(), None);
    }

    #[test]
    fn demux_resyncs_after_junk() {
        let mut mux = OggMux::new(9);
        let headers = mux.header_pages();
        let page = mux.audio_page(&[0xfc, 9]);

        let mut demux = OggDemux::new();
        demux.push(b"garbage-before-stream");
        demux.push(&headers);
        demux.push(&page);
        assert_eq!(demux.next_packet(), Some(vec![0xfc, 9]));
    }

    #[test]
    fn demux_joins_packets_continued_across_pages() {
        let long_packet = vec![0xabu8; 260];
        let first = build_page(3, 0, 0, 0, &long_packet[..255]);
        // A lone 255 lacing value leaves the packet open; strip the page
        // terminator by rebuilding the header with a single 255 segment.
        let mut open = Vec::new();
        open.extend_from_slice(&first[..26]);
        open.push(1);
        open.push(255);
        open.extend_from_slice(&long_packet[..255]);
        let crc = crc32(
            &{
                let mut z = open.clone();
                z[22..26].copy_from_slice(&[0, 0, 0, 0]);
                z
            },
        );
        open[22..26].copy_from_slice(&crc.to_le_bytes());

        let cont = build_page(3, 1, 960, FLAG_CONTINUED, &long_packet[255..]);

        let mut demux = OggDemux::new();
        demux.push(&open);
        demux.push(&cont);
        assert_eq!(demux.next_packet(), Some(long_packet));
    }

    #[test]
    fn lacing_terminates_exact_multiples_of_255() {
        assert_eq!(lacing_values(0), vec![0]);
        assert_eq!(lacing_values(10), vec![10]);
        assert_eq!(lacing_values(255), vec![255, 0]);
        assert_eq!(lacing_values(300), vec![255, 45]);
    }
}
