//! Capability surface the engine calls back into.
//!
//! The engine never creates a tunnel or touches routing itself on mobile
//! hosts: the host app has already established the VPN interface and hands
//! over its descriptor. [`HostPlatform`] serves that descriptor back and
//! forwards engine log lines to the host.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use crate::config::options::TunInboundOptions;

/// Receives engine diagnostic lines, one call per line.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

const DEFAULT_TUN_MTU: u32 = 9000;

/// Tunnel parameters the engine requests when it opens its tun inbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunOptions {
    pub mtu: u32,
    pub address: Vec<String>,
    pub auto_route: bool,
    pub strict_route: bool,
}

impl TunOptions {
    #[must_use]
    pub fn from_inbound(inbound: &TunInboundOptions) -> Self {
        let address = inbound
            .address
            .iter()
            .chain(&inbound.inet4_address)
            .chain(&inbound.inet6_address)
            .cloned()
            .collect();
        Self {
            mtu: inbound.mtu.unwrap_or(DEFAULT_TUN_MTU),
            address,
            auto_route: inbound.auto_route,
            strict_route: inbound.strict_route,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Tcp,
    Udp,
}

impl IpProtocol {
    /// Map an IANA protocol number.
    #[must_use]
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

pub trait PlatformInterface: Send + Sync {
    /// Return the descriptor backing the requested tunnel.
    fn open_tun(&self, options: &TunOptions) -> io::Result<RawFd>;

    fn write_log(&self, message: &str);

    /// Whether the engine should route socket protection through
    /// [`auto_detect_interface_control`](Self::auto_detect_interface_control).
    fn use_platform_auto_detect_interface_control(&self) -> bool;

    fn auto_detect_interface_control(&self, fd: RawFd) -> io::Result<()>;

    /// Owning uid of a connection, `None` when unknown.
    fn find_connection_owner(
        &self,
        protocol: IpProtocol,
        source: SocketAddr,
        destination: SocketAddr,
    ) -> io::Result<Option<u32>>;

    /// Owner lookup keyed by the raw IP protocol number the engine reads
    /// off the packet. Only TCP and UDP are looked up.
    fn find_connection_owner_by_number(
        &self,
        protocol: u8,
        source: SocketAddr,
        destination: SocketAddr,
    ) -> io::Result<Option<u32>> {
        let protocol = IpProtocol::from_number(protocol).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported ip protocol {protocol}"),
            )
        })?;
        self.find_connection_owner(protocol, source, destination)
    }

    fn package_name_by_uid(&self, uid: u32) -> Option<String>;

    fn uid_by_package_name(&self, package_name: &str) -> Option<u32>;

    fn use_procfs(&self) -> bool;
}

/// Platform adapter backed by data handed over at `start`.
pub struct HostPlatform {
    tun_fd: Option<RawFd>,
    log_sink: LogSink,
}

impl HostPlatform {
    #[must_use]
    pub fn new(tun_fd: Option<RawFd>, log_sink: LogSink) -> Self {
        Self { tun_fd, log_sink }
    }

    #[must_use]
    pub fn tun_fd(&self) -> Option<RawFd> {
        self.tun_fd
    }
}

impl fmt::Debug for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostPlatform")
            .field("tun_fd", &self.tun_fd)
            .finish_non_exhaustive()
    }
}

impl PlatformInterface for HostPlatform {
    fn open_tun(&self, options: &TunOptions) -> io::Result<RawFd> {
        match self.tun_fd {
            Some(fd) => {
                tracing::debug!(fd, mtu = options.mtu, "open_tun_served_host_fd");
                Ok(fd)
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "host did not supply a tunnel descriptor",
            )),
        }
    }

    fn write_log(&self, message: &str) {
        (self.log_sink)(message);
    }

    fn use_platform_auto_detect_interface_control(&self) -> bool {
        false
    }

    fn auto_detect_interface_control(&self, _fd: RawFd) -> io::Result<()> {
        Ok(())
    }

    fn find_connection_owner(
        &self,
        _protocol: IpProtocol,
        _source: SocketAddr,
        _destination: SocketAddr,
    ) -> io::Result<Option<u32>> {
        Ok(None)
    }

    fn package_name_by_uid(&self, _uid: u32) -> Option<String> {
        None
    }

    fn uid_by_package_name(&self, _package_name: &str) -> Option<u32> {
        None
    }

    fn use_procfs(&self) -> bool {
        false
    }
}

/// Sink that forwards engine lines into this crate's own log pipeline.
#[must_use]
pub fn tracing_log_sink() -> LogSink {
    Arc::new(|line: &str| tracing::info!(target: "engine", "{}", line))
}
