//! Receive socket setup
//!
//! AES67 receivers bind the wildcard address with address reuse so
//! several receivers can share a port, enlarge the kernel buffer to
//! ride out scheduling hiccups, and join the multicast group when the
//! source address calls for it.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

/// Kernel receive buffer size: enough for ~170 ms of 64-channel audio
const RECV_BUFFER_BYTES: usize = 2 * 1024 * 1024;

/// Bind a receive socket for the given stream source
///
/// The socket is bound to `0.0.0.0:port` with `SO_REUSEADDR`, sized to
/// at least 2 MiB of kernel buffer, and joined to `source_ip` on
/// `interface` when the address is multicast. Non-multicast sources
/// skip the join silently. The socket is left nonblocking for the
/// tokio reactor.
pub(crate) fn bind_receive_socket(
    port: u16,
    source_ip: Ipv4Addr,
    interface: Ipv4Addr,
) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_BYTES) {
        // The kernel may cap rmem below our request; keep going.
        tracing::warn!(error = %e, "could not enlarge receive buffer");
    }

    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&bind_addr.into())?;

    let socket: UdpSocket = socket.into();

    if source_ip.is_multicast() {
        if let Err(e) = socket.join_multicast_v4(&source_ip, &interface) {
            tracing::warn!(group = %source_ip, error = %e, "multicast join failed");
        }
    }

    socket.set_nonblocking(true)?;
    Ok(socket)
}
