//! Raw packet I/O for pingem.
//!
//! This crate owns everything that touches a real network interface:
//! resolving the simulator's own addresses, receiving raw frames and
//! injecting the generated replies. The engine talks to it through the
//! [`FrameSource`] and [`FrameSink`] traits so tests can substitute
//! in-memory implementations.

use std::{fmt, io, net::Ipv4Addr, sync::Arc};

use bytes::Bytes;
use ipnetwork::IpNetwork;
use parking_lot::Mutex;
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::util::MacAddr;
use tracing::debug;

use pingem_wire::ReplyFrame;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no interface named {0}")]
    InterfaceNotFound(String),
    #[error("interface {0} has no hardware address")]
    NoMacAddress(String),
    #[error("interface {0} has no IPv4 address")]
    NoIpv4Address(String),
    #[error("unsupported datalink channel type on {0}")]
    UnsupportedChannel(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The simulator's own network- and link-layer addresses on the capture
/// interface.
///
/// Resolved once at startup and passed by value into every component that
/// needs it; never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalIdentity {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
}

impl fmt::Display for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ip, self.mac)
    }
}

/// Looks up `name` among the host's interfaces and resolves the local
/// identity on it.
///
/// Failure here is startup-fatal: without an interface and its addresses
/// there is nothing to simulate on.
pub fn resolve_identity(name: &str) -> Result<(NetworkInterface, LocalIdentity)> {
    let interface = datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| Error::InterfaceNotFound(name.to_owned()))?;

    let mac = interface.mac.ok_or_else(|| Error::NoMacAddress(name.to_owned()))?;
    let ip = interface
        .ips
        .iter()
        .find_map(|net| match net {
            IpNetwork::V4(v4) => Some(v4.ip()),
            IpNetwork::V6(_) => None,
        })
        .ok_or_else(|| Error::NoIpv4Address(name.to_owned()))?;

    Ok((interface, LocalIdentity { ip, mac }))
}

/// Blocking source of raw inbound frames.
///
/// `Ok(None)` means the channel is closed and no more frames will ever
/// arrive; the live datalink source never reports this.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> io::Result<Option<Bytes>>;
}

/// Concurrency-safe transmit side of the packet I/O layer.
///
/// Implementations are responsible for sealing the checksums the reply
/// builder left unset: a frame must leave the process valid. Many reply
/// tasks share one sink, so `transmit` takes `&self`.
pub trait FrameSink: Send + Sync {
    fn transmit(&self, frame: ReplyFrame) -> io::Result<()>;
}

/// Capture side of a datalink channel.
pub struct PnetSource {
    rx: Box<dyn DataLinkReceiver>,
}

impl fmt::Debug for PnetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PnetSource").finish_non_exhaustive()
    }
}

impl FrameSource for PnetSource {
    fn next_frame(&mut self) -> io::Result<Option<Bytes>> {
        // The receiver lends a view into an internal buffer that is reused
        // by the next call; copy the frame out so downstream tasks own it.
        self.rx.next().map(|frame| Some(Bytes::copy_from_slice(frame)))
    }
}

/// Transmit side of a datalink channel.
///
/// The underlying pnet sender is not itself shareable, so sends from
/// concurrent reply tasks are serialized here. Cloning hands out another
/// handle to the same channel.
#[derive(Clone)]
pub struct PnetSink {
    tx: Arc<Mutex<Box<dyn DataLinkSender>>>,
}

impl fmt::Debug for PnetSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PnetSink").finish_non_exhaustive()
    }
}

impl FrameSink for PnetSink {
    fn transmit(&self, frame: ReplyFrame) -> io::Result<()> {
        let sealed = frame.seal();
        let mut tx = self.tx.lock();
        match tx.send_to(&sealed, None) {
            Some(result) => result,
            None => Err(io::Error::other("datalink channel closed")),
        }
    }
}

/// Opens an ethernet capture/transmit channel on `interface`.
pub fn open(interface: &NetworkInterface) -> Result<(PnetSource, PnetSink)> {
    match datalink::channel(interface, Config::default())? {
        Channel::Ethernet(tx, rx) => {
            debug!(iface = %interface.name, "opened datalink channel");
            Ok((PnetSource { rx }, PnetSink { tx: Arc::new(Mutex::new(tx)) }))
        }
        _ => Err(Error::UnsupportedChannel(interface.name.clone())),
    }
}
