//! The OS capabilities a scan needs, behind one trait so the batch logic never
//! branches on platform.
use std::io;
use std::net::SocketAddrV4;
use std::time::Duration;

/// Socket operations used by [`Batch`](super::Batch).
///
/// Dropping a `Socket` must close it. The batch relies on that to release
/// every handle exactly once, including on early returns.
pub trait Connector {
    /// Owned OS socket handle.
    type Socket;

    /// Creates a fresh IPv4 TCP socket.
    fn open(&mut self) -> io::Result<Self::Socket>;

    /// Puts `socket` in non-blocking mode.
    fn set_nonblocking(&mut self, socket: &Self::Socket) -> io::Result<()>;

    /// Starts a connect toward `target` without waiting for it.
    ///
    /// `Ok` means the connect is in flight (or already done). `Err` means it
    /// failed on the spot, e.g. no route to host.
    fn start_connect(&mut self, socket: &Self::Socket, target: SocketAddrV4) -> io::Result<()>;

    /// Blocks until at least one of `sockets` is writable or `timeout` passes.
    /// Returns how many were ready. A wait cut short by a signal returns an
    /// [`io::ErrorKind::Interrupted`] error.
    fn wait_writable(&mut self, sockets: &[&Self::Socket], timeout: Duration) -> io::Result<usize>;

    /// Zero-timeout check: has the connect on `socket` completed successfully?
    fn is_connected(&mut self, socket: &Self::Socket) -> bool;
}

#[cfg(any(unix, windows))]
pub use self::system::SystemConnector;

#[cfg(any(unix, windows))]
mod system {
    use super::{sys, Connector};
    use socket2::{Domain, Protocol, SockAddr, Socket, Type};
    use std::io;
    use std::net::SocketAddrV4;
    use std::time::Duration;

    /// [`Connector`] over real sockets. Readiness comes from `poll(2)` on Unix
    /// and `WSAPoll` on Windows.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SystemConnector;

    impl Connector for SystemConnector {
        type Socket = Socket;

        fn open(&mut self) -> io::Result<Socket> {
            Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        }

        fn set_nonblocking(&mut self, socket: &Socket) -> io::Result<()> {
            socket.set_nonblocking(true)
        }

        fn start_connect(&mut self, socket: &Socket, target: SocketAddrV4) -> io::Result<()> {
            match socket.connect(&SockAddr::from(target)) {
                Ok(()) => Ok(()),
                Err(e) if sys::in_progress(&e) => Ok(()),
                Err(e) => Err(e),
            }
        }

        fn wait_writable(&mut self, sockets: &[&Socket], timeout: Duration) -> io::Result<usize> {
            if sockets.is_empty() {
                return Ok(0);
            }
            let mut fds: Vec<sys::PollFd> = sockets.iter().map(|s| sys::pollout(s)).collect();
            sys::poll(&mut fds, poll_timeout(timeout))
        }

        fn is_connected(&mut self, socket: &Socket) -> bool {
            let mut fds = [sys::pollout(socket)];
            match sys::poll(&mut fds, 0) {
                Ok(ready) if ready > 0 => {}
                _ => return false,
            }
            if !sys::writable_without_error(&fds[0]) {
                return false;
            }
            // Refused connects are writable too; SO_ERROR tells them apart.
            matches!(socket.take_error(), Ok(None))
        }
    }

    /// Milliseconds for the poll call, rounded up so a sub-millisecond timeout
    /// still waits.
    pub(super) fn poll_timeout(timeout: Duration) -> i32 {
        let mut ms = timeout.as_millis();
        if timeout.subsec_nanos() % 1_000_000 != 0 {
            ms += 1;
        }
        i32::try_from(ms).unwrap_or(i32::MAX)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::net::{Ipv4Addr, TcpListener};

        fn loopback(port: u16) -> SocketAddrV4 {
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
        }

        fn launch(connector: &mut SystemConnector, target: SocketAddrV4) -> (Socket, io::Result<()>) {
            let socket = connector.open().unwrap();
            connector.set_nonblocking(&socket).unwrap();
            let started = connector.start_connect(&socket, target);
            (socket, started)
        }

        #[test]
        fn listening_port_is_connected() {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let mut connector = SystemConnector;

            let (socket, started) = launch(&mut connector, loopback(port));
            started.unwrap();
            let ready = connector
                .wait_writable(&[&socket], Duration::from_secs(2))
                .unwrap();
            assert_eq!(ready, 1);
            assert!(connector.is_connected(&socket));
        }

        #[test]
        fn closed_port_is_not_connected() {
            let port = {
                let listener = TcpListener::bind("127.0.0.1:0").unwrap();
                listener.local_addr().unwrap().port()
            };
            let mut connector = SystemConnector;

            let (socket, started) = launch(&mut connector, loopback(port));
            if started.is_ok() {
                // Windows retries refused loopback connects for a while before
                // reporting them, so the wait may well time out.
                let _ = connector.wait_writable(&[&socket], Duration::from_secs(2));
                assert!(!connector.is_connected(&socket));
            }
        }

        #[test]
        fn waiting_on_nothing_returns_at_once() {
            let ready = SystemConnector
                .wait_writable(&[], Duration::from_secs(60))
                .unwrap();
            assert_eq!(ready, 0);
        }

        #[test]
        fn poll_timeout_rounds_up_and_clamps() {
            assert_eq!(poll_timeout(Duration::ZERO), 0);
            assert_eq!(poll_timeout(Duration::from_millis(50)), 50);
            assert_eq!(poll_timeout(Duration::from_micros(1_500)), 2);
            assert_eq!(poll_timeout(Duration::from_secs(u64::MAX)), i32::MAX);
        }
    }
}

#[cfg(unix)]
mod sys {
    use socket2::Socket;
    use std::io;
    use std::os::fd::AsRawFd;

    pub(super) type PollFd = libc::pollfd;

    pub(super) fn in_progress(e: &io::Error) -> bool {
        e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == io::ErrorKind::WouldBlock
    }

    pub(super) fn pollout(socket: &Socket) -> PollFd {
        libc::pollfd {
            fd: socket.as_raw_fd(),
            events: libc::POLLOUT,
            revents: 0,
        }
    }

    pub(super) fn writable_without_error(fd: &PollFd) -> bool {
        fd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) == 0
            && fd.revents & libc::POLLOUT != 0
    }

    pub(super) fn poll(fds: &mut [PollFd], timeout_ms: i32) -> io::Result<usize> {
        // SAFETY: `fds` is a valid, initialised slice that outlives the call and
        // its length is passed alongside the pointer.
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        usize::try_from(ready).map_err(|_| io::Error::last_os_error())
    }
}

#[cfg(windows)]
mod sys {
    use socket2::Socket;
    use std::io;
    use std::os::windows::io::AsRawSocket;
    use windows_sys::Win32::Networking::WinSock::{
        WSAPoll, POLLERR, POLLHUP, POLLNVAL, POLLWRNORM, SOCKET, WSAPOLLFD,
    };

    pub(super) type PollFd = WSAPOLLFD;

    // WSAEWOULDBLOCK surfaces as `WouldBlock`.
    pub(super) fn in_progress(e: &io::Error) -> bool {
        e.kind() == io::ErrorKind::WouldBlock
    }

    pub(super) fn pollout(socket: &Socket) -> PollFd {
        WSAPOLLFD {
            fd: socket.as_raw_socket() as SOCKET,
            events: POLLWRNORM,
            revents: 0,
        }
    }

    pub(super) fn writable_without_error(fd: &PollFd) -> bool {
        fd.revents & (POLLERR | POLLHUP | POLLNVAL) == 0 && fd.revents & POLLWRNORM != 0
    }

    pub(super) fn poll(fds: &mut [PollFd], timeout_ms: i32) -> io::Result<usize> {
        let len = u32::try_from(fds.len()).unwrap_or(u32::MAX);
        // SAFETY: `fds` is a valid, initialised slice that outlives the call and
        // `len` never exceeds its length.
        let ready = unsafe { WSAPoll(fds.as_mut_ptr(), len, timeout_ms) };
        usize::try_from(ready).map_err(|_| io::Error::last_os_error())
    }
}
