//! Linux TAP device driven through `/dev/net/tun`.

use crate::FrameLink;
use async_trait::async_trait;
use fakenet_core::error::{FakenetError, FakenetResult};
use fakenet_core::wire::MTU;
use libc::{c_char, c_int, c_short};
use nix::sys::socket::{socket, AddressFamily, SockFlag, SockType};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use tokio::io::unix::AsyncFd;

const TUN_PATH: &str = "/dev/net/tun";

const IFF_UP: c_short = libc::IFF_UP as c_short;
const IFF_TAP: c_short = libc::IFF_TAP as c_short;
const IFF_NO_PI: c_short = libc::IFF_NO_PI as c_short;

nix::ioctl_write_ptr_bad!(
    tunsetiff,
    nix::request_code_write!(b'T', 202, std::mem::size_of::<c_int>()),
    libc::ifreq
);
nix::ioctl_read_bad!(siocgifflags, libc::SIOCGIFFLAGS, libc::ifreq);
nix::ioctl_write_ptr_bad!(siocsifflags, libc::SIOCSIFFLAGS, libc::ifreq);
nix::ioctl_write_ptr_bad!(siocsifmtu, libc::SIOCSIFMTU, libc::ifreq);

/// A TAP interface. The kernel side appears as a regular Ethernet interface.
pub struct TapDevice {
    file: AsyncFd<File>,
    control: OwnedFd,
    name: String,
}

impl TapDevice {
    /// Creates the interface and sets its MTU. `requested_name` may contain a
    /// `%d` template; the kernel picks `tapN` when it is `None`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(requested_name: Option<&str>) -> FakenetResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(TUN_PATH)
            .map_err(|e| FakenetError::Device(format!("failed to open {TUN_PATH}: {e}")))?;

        let mut ifr = new_ifreq(requested_name.unwrap_or(""))?;
        ifr.ifr_ifru.ifru_flags = IFF_TAP | IFF_NO_PI;

        // SAFETY: `ifr` is a fully initialised ifreq that outlives the call.
        unsafe { tunsetiff(file.as_raw_fd(), &ifr) }
            .map_err(|e| FakenetError::Device(format!("TUNSETIFF failed: {e}")))?;

        let name = ifreq_name(&ifr);

        let control = socket(
            AddressFamily::Inet,
            SockType::Datagram,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .map_err(|e| FakenetError::Device(format!("failed to open control socket: {e}")))?;

        let tap = Self {
            file: AsyncFd::new(file)?,
            control,
            name,
        };
        tap.set_mtu(MTU)?;

        tracing::info!(name = %tap.name, mtu = MTU, "tap device created");
        Ok(tap)
    }

    fn set_mtu(&self, mtu: usize) -> FakenetResult<()> {
        let mut ifr = new_ifreq(&self.name)?;
        ifr.ifr_ifru.ifru_mtu = mtu as c_int;

        // SAFETY: as above.
        unsafe { siocsifmtu(self.control.as_raw_fd(), &ifr) }
            .map_err(|e| FakenetError::Device(format!("SIOCSIFMTU on {} failed: {e}", self.name)))?;
        Ok(())
    }

    /// Brings the interface administratively up.
    pub fn up(&self) -> FakenetResult<()> {
        let mut ifr = new_ifreq(&self.name)?;

        // SAFETY: the kernel fills in `ifru_flags` of a valid ifreq.
        unsafe {
            siocgifflags(self.control.as_raw_fd(), &mut ifr).map_err(|e| {
                FakenetError::Device(format!("SIOCGIFFLAGS on {} failed: {e}", self.name))
            })?;
            ifr.ifr_ifru.ifru_flags |= IFF_UP;
            siocsifflags(self.control.as_raw_fd(), &ifr).map_err(|e| {
                FakenetError::Device(format!("SIOCSIFFLAGS on {} failed: {e}", self.name))
            })?;
        }

        tracing::debug!(name = %self.name, "interface up");
        Ok(())
    }
}

#[async_trait]
impl FrameLink for TapDevice {
    async fn recv_frame(&self, buf: &mut [u8]) -> FakenetResult<usize> {
        loop {
            let mut guard = self.file.readable().await?;
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(buf)
            }) {
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }

    async fn send_frame(&self, frame: &[u8]) -> FakenetResult<()> {
        loop {
            let mut guard = self.file.writable().await?;
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.write(frame)
            }) {
                Ok(result) => {
                    let written = result?;
                    if written != frame.len() {
                        return Err(FakenetError::Device(format!(
                            "short write on {}: {written} of {} bytes",
                            self.name,
                            frame.len()
                        )));
                    }
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn new_ifreq(name: &str) -> FakenetResult<libc::ifreq> {
    if name.len() >= libc::IFNAMSIZ || name.contains('\0') {
        return Err(FakenetError::InvalidInput(format!(
            "invalid interface name {name:?}"
        )));
    }

    // SAFETY: ifreq is plain old data; all-zero is a valid value.
    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name.bytes()) {
        *dst = src as c_char;
    }
    Ok(ifr)
}

fn ifreq_name(ifr: &libc::ifreq) -> String {
    let bytes: Vec<u8> = ifr
        .ifr_name
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
