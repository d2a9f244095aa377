//! In-memory [`Connector`] for tests: scripted outcomes, injected faults and a
//! ledger of every open and close.
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::io;
use std::net::SocketAddrV4;
use std::rc::Rc;
use std::time::Duration;

use super::Connector;

#[derive(Debug, Default)]
pub struct Ledger {
    pub opened: Cell<usize>,
    pub closed: RefCell<Vec<usize>>,
    pub connects: RefCell<Vec<SocketAddrV4>>,
    pub waits: RefCell<Vec<(usize, Duration)>>,
}

impl Ledger {
    /// Every opened socket closed, none twice.
    pub fn assert_balanced(&self) {
        let mut closed = self.closed.borrow().clone();
        closed.sort_unstable();
        assert_eq!(closed, (0..self.opened.get()).collect::<Vec<_>>());
    }
}

#[derive(Debug)]
pub struct FakeSocket {
    pub id: usize,
    ledger: Rc<Ledger>,
}

impl Drop for FakeSocket {
    fn drop(&mut self) {
        self.ledger.closed.borrow_mut().push(self.id);
    }
}

/// Socket ids count up from 0 across the whole scan, so with batches of 4 the
/// second batch holds ids 4..8.
#[derive(Debug, Default)]
pub struct FakeConnector {
    pub ledger: Rc<Ledger>,
    pub accepting: HashSet<usize>,
    pub refused_on_connect: HashSet<usize>,
    pub fail_open_at: Option<usize>,
    pub fail_nonblocking_at: Option<usize>,
    /// Alternate the answer of `is_connected` on every call.
    pub flaky: bool,
    pub flips: bool,
    /// How many waits to cut short with `Interrupted` before answering.
    pub interruptions: usize,
    pub wait_fails: bool,
    pub calls: usize,
}

impl FakeConnector {
    pub fn accepting(ids: impl IntoIterator<Item = usize>) -> Self {
        Self {
            accepting: ids.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Connector for FakeConnector {
    type Socket = FakeSocket;

    fn open(&mut self) -> io::Result<FakeSocket> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_open_at == Some(call) {
            return Err(io::Error::other("injected socket() failure"));
        }
        let id = self.ledger.opened.get();
        self.ledger.opened.set(id + 1);
        Ok(FakeSocket {
            id,
            ledger: Rc::clone(&self.ledger),
        })
    }

    fn set_nonblocking(&mut self, socket: &FakeSocket) -> io::Result<()> {
        if self.fail_nonblocking_at == Some(socket.id) {
            return Err(io::Error::other("injected fcntl() failure"));
        }
        Ok(())
    }

    fn start_connect(&mut self, socket: &FakeSocket, target: SocketAddrV4) -> io::Result<()> {
        self.ledger.connects.borrow_mut().push(target);
        if self.refused_on_connect.contains(&socket.id) {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        Ok(())
    }

    fn wait_writable(&mut self, sockets: &[&FakeSocket], timeout: Duration) -> io::Result<usize> {
        self.ledger.waits.borrow_mut().push((sockets.len(), timeout));
        if self.interruptions > 0 {
            self.interruptions -= 1;
            return Err(io::ErrorKind::Interrupted.into());
        }
        if self.wait_fails {
            return Err(io::Error::other("injected poll() failure"));
        }
        Ok(sockets
            .iter()
            .filter(|s| self.accepting.contains(&s.id))
            .count())
    }

    fn is_connected(&mut self, socket: &FakeSocket) -> bool {
        if self.flaky {
            self.flips = !self.flips;
            return self.flips;
        }
        self.accepting.contains(&socket.id)
    }
}
