//! TCP binding
//!
//! Dials `key.address()` directly for the `tcp`, `tcp4` and `tcp6` schemes.
//! Proxied keys need a caller-supplied factory that speaks the proxy protocol.

use std::io;
use std::net::SocketAddr;

use hostpool_core::{DestinationKey, ResourceBinding};
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Any,
    V4,
    V6,
}

impl Family {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "tcp" => Some(Family::Any),
            "tcp4" => Some(Family::V4),
            "tcp6" => Some(Family::V6),
            _ => None,
        }
    }

    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Family::Any => true,
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
        }
    }
}

/// Binding that opens plain TCP streams to the key's address.
///
/// Unsupported keys still get a binding; its factory fails every dial with
/// `ErrorKind::Unsupported`, so the error surfaces on first use.
pub fn tcp_binding(key: &DestinationKey) -> ResourceBinding<TcpStream> {
    let address = key.address().to_string();
    let family = Family::from_scheme(key.scheme());
    let unsupported = if key.is_proxied() {
        Some(format!("proxied destination {key} needs a custom factory"))
    } else if family.is_none() {
        Some(format!("scheme {:?} is not a tcp scheme", key.scheme()))
    } else {
        None
    };

    ResourceBinding::from_fns(
        move || {
            let address = address.clone();
            let unsupported = unsupported.clone();
            async move {
                if let Some(reason) = unsupported {
                    return Err(io::Error::new(io::ErrorKind::Unsupported, reason));
                }
                dial(&address, family.unwrap_or(Family::Any)).await
            }
        },
        |mut stream: TcpStream| async move {
            trace!(peer = ?stream.peer_addr().ok(), "Closing pooled tcp stream");
            stream.shutdown().await
        },
    )
}

async fn dial(address: &str, family: Family) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in lookup_host(address).await?.filter(|a| family.accepts(a)) {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {family:?} address found for {address}"),
        )
    }))
}
