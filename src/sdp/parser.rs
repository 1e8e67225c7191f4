use super::SdpInfo;

/// Line-oriented SDP parser constrained to the AES67 profile
pub struct SdpParser;

impl SdpParser {
    /// Parse an SDP document
    ///
    /// Accepts CRLF- or LF-delimited lines and ignores unknown types.
    /// The result's `is_valid` flag reports whether the minimum fields
    /// were present; it never fails hard.
    #[must_use]
    pub fn parse(input: &str) -> SdpInfo {
        let mut info = SdpInfo::default();

        for line in input.lines() {
            let line = line.trim_end_matches('\r');
            if line.len() < 2 || line.as_bytes().get(1) != Some(&b'=') {
                continue;
            }

            let value = &line[2..];
            match &line[..1] {
                "s" => info.session_name = value.to_string(),
                "o" => Self::parse_origin(value, &mut info),
                "c" => Self::parse_connection(value, &mut info),
                "m" => Self::parse_media(value, &mut info),
                "a" => Self::parse_attribute(value, &mut info),
                _ => {}
            }
        }

        info.is_valid = !info.source_ip.is_empty()
            && info.port > 0
            && info.sample_rate > 0
            && info.channels > 0;

        info
    }

    /// o=<username> <session-id> <version> IN IP4 <address>
    fn parse_origin(value: &str, info: &mut SdpInfo) {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 6 || parts[3] != "IN" || parts[4] != "IP4" {
            return;
        }
        if parts[1].bytes().all(|b| b.is_ascii_digit()) {
            info.session_id = parts[1].to_string();
            info.origin_address = parts[5].to_string();
        }
    }

    /// c=IN IP4 <addr>[/<ttl>]
    fn parse_connection(value: &str, info: &mut SdpInfo) {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 3 || parts[0] != "IN" || parts[1] != "IP4" {
            return;
        }
        // Multicast addresses carry a /TTL suffix.
        let addr = parts[2].split('/').next().unwrap_or("");
        if !addr.is_empty() {
            info.source_ip = addr.to_string();
        }
    }

    /// m=audio <port> RTP/AVP <payload>
    fn parse_media(value: &str, info: &mut SdpInfo) {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 4 || parts[0] != "audio" || parts[2] != "RTP/AVP" {
            return;
        }
        if let (Ok(port), Ok(pt)) = (parts[1].parse::<u16>(), parts[3].parse::<u8>()) {
            info.port = port;
            info.payload_type = pt & 0x7F;
        }
    }

    fn parse_attribute(value: &str, info: &mut SdpInfo) {
        if let Some(rtpmap) = value.strip_prefix("rtpmap:") {
            Self::parse_rtpmap(rtpmap, info);
        } else if let Some(ptime) = value.strip_prefix("ptime:") {
            // ptime is milliseconds, possibly fractional (0.125 etc).
            if let Ok(ms) = ptime.trim().parse::<f64>() {
                if ms > 0.0 {
                    info.packet_time_us = (ms * 1000.0).round() as u32;
                }
            }
        } else if let Some(refclk) = value.strip_prefix("ts-refclk:") {
            Self::parse_refclk(refclk, info);
        }
    }

    /// a=rtpmap:<pt> <encoding>/<rate>/<channels>
    fn parse_rtpmap(value: &str, info: &mut SdpInfo) {
        let Some((_pt, mapping)) = value.split_once(' ') else {
            return;
        };

        let fields: Vec<&str> = mapping.trim().split('/').collect();
        if fields.len() < 3 {
            return;
        }

        let (Ok(rate), Ok(channels)) = (fields[1].parse::<u32>(), fields[2].parse::<u8>()) else {
            return;
        };

        info.encoding = fields[0].to_string();
        info.sample_rate = rate;
        info.channels = channels;
        info.bit_depth = match fields[0] {
            "L16" => 16,
            "L24" => 24,
            "L32" => 32,
            _ => 0,
        };
    }

    /// a=ts-refclk:ptp=IEEE1588-<version>[:<clock-id>]
    fn parse_refclk(value: &str, info: &mut SdpInfo) {
        let Some(ptp) = value.strip_prefix("ptp=IEEE1588") else {
            return;
        };

        info.ptp_reference = true;

        // Version then optional grandmaster id: "-2008:00-11-22-..".
        if let Some((_version, clock_id)) = ptp.split_once(':') {
            if !clock_id.is_empty() {
                info.ptp_clock_id = Some(clock_id.to_string());
            }
        }
    }
}
