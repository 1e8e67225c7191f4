use std::fmt::Write;

use crate::audio::format::AudioFormat;

/// Parameters for generating an AES67 session description
#[derive(Debug, Clone)]
pub struct SdpSessionParams<'a> {
    /// Multicast destination address
    pub multicast_ip: &'a str,
    /// Destination UDP port
    pub port: u16,
    /// RTP payload type
    pub payload_type: u8,
    /// Stream audio format
    pub format: AudioFormat,
    /// Session name (s= line)
    pub session_name: &'a str,
    /// Decimal session id for the origin line
    pub session_id: u64,
    /// Origin address (o= line)
    pub origin_address: &'a str,
    /// Packet time in microseconds
    pub packet_time_us: u32,
}

/// Generate an AES67 session description
///
/// Emits the canonical line order with CRLF terminators: v, o, s, c, t,
/// m, then the rtpmap/ptime/ts-refclk/mediaclk attributes.
#[must_use]
pub fn generate(params: &SdpSessionParams<'_>) -> String {
    let mut sdp = String::with_capacity(256);

    write!(sdp, "v=0\r\n").unwrap();
    write!(
        sdp,
        "o=- {} {} IN IP4 {}\r\n",
        params.session_id, params.session_id, params.origin_address
    )
    .unwrap();
    write!(sdp, "s={}\r\n", params.session_name).unwrap();
    write!(sdp, "c=IN IP4 {}/32\r\n", params.multicast_ip).unwrap();
    write!(sdp, "t=0 0\r\n").unwrap();
    write!(
        sdp,
        "m=audio {} RTP/AVP {}\r\n",
        params.port, params.payload_type
    )
    .unwrap();
    write!(
        sdp,
        "a=rtpmap:{} {}/{}/{}\r\n",
        params.payload_type,
        params.format.encoding_name(),
        params.format.sample_rate.as_u32(),
        params.format.channels
    )
    .unwrap();
    write!(sdp, "a=ptime:{}\r\n", ptime_millis(params.packet_time_us)).unwrap();
    write!(sdp, "a=ts-refclk:ptp=IEEE1588-2008\r\n").unwrap();
    write!(sdp, "a=mediaclk:direct=0\r\n").unwrap();

    sdp
}

/// Render a microsecond packet time as the millisecond ptime value
fn ptime_millis(packet_time_us: u32) -> String {
    if packet_time_us % 1000 == 0 {
        format!("{}", packet_time_us / 1000)
    } else {
        // Fractional AES67 packet times: 0.125, 0.25, 0.333.
        let ms = f64::from(packet_time_us) / 1000.0;
        let mut s = format!("{ms}");
        if s.starts_with("0.") {
            s.truncate(5);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::ptime_millis;

    #[test]
    fn test_ptime_rendering() {
        assert_eq!(ptime_millis(1000), "1");
        assert_eq!(ptime_millis(4000), "4");
        assert_eq!(ptime_millis(125), "0.125");
        assert_eq!(ptime_millis(250), "0.25");
        assert_eq!(ptime_millis(333), "0.333");
    }
}
