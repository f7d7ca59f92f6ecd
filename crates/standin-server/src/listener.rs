use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;
use tokio::runtime::Handle;

/// Bind a loopback listener on an OS-assigned port
///
/// The socket is bound synchronously so the address is known before any
/// reactor runs; it is registered with the reactor behind `handle`.
pub(crate) fn bind_ephemeral(
    handle: &Handle,
    host: IpAddr,
) -> std::io::Result<(TcpListener, SocketAddr)> {
    let listener = std::net::TcpListener::bind((host, 0))?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;

    let _guard = handle.enter();
    let listener = TcpListener::from_std(listener)?;
    Ok((listener, addr))
}
