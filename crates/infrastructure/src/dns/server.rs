//! UDP and TCP DNS edge.
//!
//! One task per inbound message. The pipeline runs behind a panic guard:
//! a panicking query is answered SERVFAIL and logged with its backtrace,
//! and the listener loops never die. Rate-limit drops send nothing on UDP
//! and close the connection on TCP.

use crate::dns::handler::{QueryHandler, Reply};
use crate::dns::message::{truncated_copy, MessageBuilder};
use futures::FutureExt;
use glory_hole_domain::config::ServerConfig;
use hickory_proto::op::Message;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Largest UDP payload we will advertise or send, EDNS(0) included.
const MAX_UDP_PAYLOAD: usize = 4096;

/// Minimum UDP payload per RFC 1035; EDNS buffers below this are raised.
const MIN_UDP_PAYLOAD: usize = 512;

/// Inbound TCP messages above this are rejected outright.
const MAX_TCP_MESSAGE: usize = 65_535;

pub struct DnsServer {
    handler: Arc<QueryHandler>,
    udp: Option<Arc<UdpSocket>>,
    tcp: Option<TcpListener>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl DnsServer {
    /// Bind the configured listeners. Bind failures surface here so startup
    /// can exit non-zero before any query is accepted.
    pub async fn bind(
        handler: Arc<QueryHandler>,
        config: &ServerConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, std::io::Error> {
        let bind: SocketAddr = config.listen_address.parse().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("bad listen address: {}", config.listen_address),
            )
        })?;

        let udp = if config.udp_enabled {
            let socket = Arc::new(bind_udp(bind)?);
            info!(bind = %socket.local_addr()?, "UDP listener ready");
            Some(socket)
        } else {
            None
        };

        // TCP binds the UDP socket's resolved address so an ephemeral port
        // request (":0") lands both listeners on the same port.
        let effective = match &udp {
            Some(socket) => socket.local_addr()?,
            None => bind,
        };
        let tcp = if config.tcp_enabled {
            let listener = TcpListener::bind(effective).await?;
            info!(bind = %listener.local_addr()?, "TCP listener ready");
            Some(listener)
        } else {
            None
        };

        let local_addr = match (&udp, &tcp) {
            (Some(socket), _) => socket.local_addr()?,
            (None, Some(listener)) => listener.local_addr()?,
            (None, None) => bind,
        };

        Ok(Self {
            handler,
            udp,
            tcp,
            local_addr,
            shutdown,
        })
    }

    /// The bound address (useful when the configuration asked for port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the shutdown token fires.
    pub async fn serve(self) {
        let mut tasks = Vec::new();

        if let Some(socket) = self.udp {
            let handler = Arc::clone(&self.handler);
            let shutdown = self.shutdown.clone();
            tasks.push(tokio::spawn(udp_loop(socket, handler, shutdown)));
        }
        if let Some(listener) = self.tcp {
            let handler = Arc::clone(&self.handler);
            let shutdown = self.shutdown.clone();
            tasks.push(tokio::spawn(tcp_loop(listener, handler, shutdown)));
        }

        for task in tasks {
            let _ = task.await;
        }
        info!("DNS listeners stopped");
    }
}

/// UDP socket with enlarged kernel buffers. DNS bursts overrun the default
/// ~256KB receive buffer long before the process is saturated.
fn bind_udp(addr: SocketAddr) -> Result<UdpSocket, std::io::Error> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(8 * 1024 * 1024)?;
    socket.set_send_buffer_size(4 * 1024 * 1024)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

async fn udp_loop(socket: Arc<UdpSocket>, handler: Arc<QueryHandler>, shutdown: CancellationToken) {
    let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
    loop {
        let (len, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("UDP loop shutting down");
                return;
            }
            result = socket.recv_from(&mut buf) => match result {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "UDP receive failed");
                    continue;
                }
            },
        };

        let wire = bytes::Bytes::copy_from_slice(&buf[..len]);
        let socket = Arc::clone(&socket);
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Some(response) = dispatch(&handler, wire, peer.ip(), true).await {
                if let Err(e) = socket.send_to(&response, peer).await {
                    debug!(peer = %peer, error = %e, "UDP send failed");
                }
            }
        });
    }
}

async fn tcp_loop(
    listener: TcpListener,
    handler: Arc<QueryHandler>,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("TCP loop shutting down");
                return;
            }
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "TCP accept failed");
                    continue;
                }
            },
        };

        let handler = Arc::clone(&handler);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tcp_connection(stream, peer, handler, shutdown).await {
                debug!(peer = %peer, error = %e, "TCP connection ended");
            }
        });
    }
}

/// Serve length-prefixed queries on one connection until the client closes
/// it, a query is dropped, or shutdown fires.
async fn tcp_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<QueryHandler>,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    loop {
        let mut len_buf = [0u8; 2];
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            result = stream.read_exact(&mut len_buf) => {
                if result.is_err() {
                    return Ok(()); // client closed
                }
            }
        }
        let len = usize::from(u16::from_be_bytes(len_buf));
        if len == 0 || len > MAX_TCP_MESSAGE {
            return Ok(());
        }
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;

        match dispatch(&handler, bytes::Bytes::from(body), peer.ip(), false).await {
            Some(response) => {
                let frame_len = u16::try_from(response.len()).unwrap_or(u16::MAX);
                stream.write_all(&frame_len.to_be_bytes()).await?;
                stream.write_all(&response[..usize::from(frame_len)]).await?;
            }
            // Rate-limit drop: close instead of leaving the client hanging.
            None => return Ok(()),
        }
    }
}

/// Parse, run the pipeline behind a panic guard, and serialize the reply.
/// Returns `None` when the query was deliberately dropped.
async fn dispatch(
    handler: &Arc<QueryHandler>,
    wire: bytes::Bytes,
    client_ip: IpAddr,
    is_udp: bool,
) -> Option<Vec<u8>> {
    let request = match Message::from_vec(&wire) {
        Ok(message) => message,
        Err(e) => {
            debug!(client = %client_ip, error = %e, "Unparseable query");
            return raw_formerr(&wire);
        }
    };

    // EDNS buffer size advertised by the client, clamped to sane bounds.
    let udp_limit = request
        .extensions()
        .as_ref()
        .map(|edns| usize::from(edns.max_payload()))
        .unwrap_or(MIN_UDP_PAYLOAD)
        .clamp(MIN_UDP_PAYLOAD, MAX_UDP_PAYLOAD);

    let request_for_panic = request.clone();
    let reply = AssertUnwindSafe(handler.handle(request, wire, client_ip))
        .catch_unwind()
        .await;

    let wire_out = match reply {
        Ok(Reply::Drop) => return None,
        Ok(Reply::Wire(bytes)) => bytes.to_vec(),
        Ok(Reply::Message(message)) => match MessageBuilder::serialize(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to serialize response");
                return None;
            }
        },
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(client = %client_ip, panic = %reason, "Query task panicked; answering SERVFAIL");
            let servfail = crate::dns::message::ResponseBuilder::servfail(&request_for_panic);
            MessageBuilder::serialize(&servfail).ok()?
        }
    };

    if is_udp && wire_out.len() > udp_limit {
        if let Ok(parsed) = Message::from_vec(&wire_out) {
            return MessageBuilder::serialize(&truncated_copy(&parsed)).ok();
        }
    }
    Some(wire_out)
}

/// FORMERR for a query we could not parse: echo the id when the header is
/// readable, otherwise stay silent.
fn raw_formerr(wire: &[u8]) -> Option<Vec<u8>> {
    if wire.len() < 2 {
        return None;
    }
    let mut header = vec![0u8; 12];
    header[0] = wire[0];
    header[1] = wire[1];
    header[2] = 0x80; // QR
    header[3] = 0x01; // RCODE = FORMERR
    Some(header)
}
