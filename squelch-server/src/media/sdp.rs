use once_cell::sync::Lazy;
use regex::Regex;

static OPUS_RTPMAP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^a=rtpmap:(\d+) opus/48000/2").unwrap());

const MONO_PARAMS: [&str; 2] = ["stereo=0", "sprop-stereo=0"];

/// Force Opus to mono in a local description before it is applied.
///
/// Deliberately a line-level string transform rather than an SDP parser:
/// only the `a=fmtp:` line of the Opus payload type is touched and every
/// other byte passes through verbatim. Applying it twice yields identical
/// output.
pub fn force_opus_mono(sdp: &str) -> String {
    let eol = if sdp.contains("\r\n") { "\r\n" } else { "\n" };
    let trailing = sdp.ends_with('\n');

    let mut opus_pts: Vec<String> = Vec::new();
    for line in sdp.lines() {
        if let Some(caps) = OPUS_RTPMAP.captures(line) {
            opus_pts.push(caps[1].to_string());
        }
    }
    if opus_pts.is_empty() {
        return sdp.to_string();
    }

    let mut out: Vec<String> = Vec::new();
    for line in sdp.lines() {
        let mut rewritten = None;
        for pt in &opus_pts {
            let fmtp_prefix = format!("a=fmtp:{pt} ");
            if let Some(params) = line.strip_prefix(&fmtp_prefix) {
                let mut params = params.to_string();
                for needed in MONO_PARAMS {
                    if !params.split(';').any(|p| p.trim() == needed) {
                        params.push(';');
                        params.push_str(needed);
                    }
                }
                rewritten = Some(format!("{fmtp_prefix}{params}"));
                break;
            }
        }
        let line = rewritten.unwrap_or_else(|| line.to_string());

        let is_opus_rtpmap = OPUS_RTPMAP.captures(&line).map(|c| c[1].to_string());
        out.push(line);
        // No fmtp line at all for this payload type: synthesize one right
        // after the rtpmap so the answer always carries the mono params.
        if let Some(pt) = is_opus_rtpmap {
            let has_fmtp = sdp
                .lines()
                .any(|l| l.starts_with(&format!("a=fmtp:{pt} ")));
            if !has_fmtp {
                out.push(format!("a=fmtp:{pt} {}", MONO_PARAMS.join(";")));
            }
        }
    }

    let mut joined = out.join(eol);
    if trailing {
        joined.push_str(eol);
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=rtpmap:111 opus/48000/2\r\na=fmtp:111 minptime=10;useinbandfec=1\r\n";

    #[test]
    fn appends_mono_params_to_existing_fmtp() {
        let munged = force_opus_mono(BASE);
        assert!(munged.contains("a=fmtp:111 minptime=10;useinbandfec=1;stereo=0;sprop-stereo=0"));
    }

    #[test]
    fn munging_is_idempotent() {
        let once = force_opus_mono(BASE);
        let twice = force_opus_mono(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn synthesizes_fmtp_when_missing() {
        let sdp = "v=0\r\na=rtpmap:109 opus/48000/2\r\na=rtpmap:0 PCMU/8000\r\n";
        let munged = force_opus_mono(sdp);
        assert!(munged.contains("a=rtpmap:109 opus/48000/2\r\na=fmtp:109 stereo=0;sprop-stereo=0"));
        // Non-Opus codecs are untouched.
        assert!(!munged.contains("a=fmtp:0"));
    }

    #[test]
    fn sdp_without_opus_passes_through() {
        let sdp = "v=0\r\na=rtpmap:0 PCMU/8000\r\n";
        assert_eq!(force_opus_mono(sdp), sdp);
    }
}
