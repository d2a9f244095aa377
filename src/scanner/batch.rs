//! One batch of in-flight connection attempts.
//!
//! A [`Batch`] owns its attempts and each attempt owns its socket, so the
//! sockets are closed when the batch is dropped or consumed. That holds on
//! every path out of a scan, including a setup failure halfway through a batch.
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::Connector;
use crate::error::{Result, ScanError};

/// Where an attempt is in its life. Closing is not a state: an attempt is
/// closed when it is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Socket is set up, connect not issued yet.
    Initiated,
    /// Connect issued, outcome unknown.
    AwaitingWritable,
    /// The target accepted the connection.
    Succeeded,
    /// Refused, unreachable, or still pending when the batch settled.
    Failed,
}

impl AttemptState {
    /// `Succeeded` and `Failed` never change again.
    pub fn is_settled(self) -> bool {
        matches!(self, AttemptState::Succeeded | AttemptState::Failed)
    }
}

/// A single probe toward `target`.
#[derive(Debug)]
pub struct Attempt<S> {
    address: String,
    state: AttemptState,
    socket: S,
}

impl<S> Attempt<S> {
    /// Opens a non-blocking socket and fires a connect at `target`.
    ///
    /// Socket creation and non-blocking setup failures are fatal for the scan.
    /// A connect that fails on the spot is not; the attempt just starts out
    /// [`AttemptState::Failed`].
    pub fn launch<C>(connector: &mut C, target: SocketAddrV4, slot: usize) -> Result<Self>
    where
        C: Connector<Socket = S>,
    {
        let setup = |source| ScanError::SocketSetup { slot, source };
        let socket = connector.open().map_err(setup)?;
        connector.set_nonblocking(&socket).map_err(setup)?;

        let mut attempt = Attempt {
            address: target.ip().to_string(),
            state: AttemptState::Initiated,
            socket,
        };
        attempt.state = match connector.start_connect(&attempt.socket, target) {
            Ok(()) => AttemptState::AwaitingWritable,
            Err(e) => {
                debug!("Connect to {} failed immediately: {}", target, e);
                AttemptState::Failed
            }
        };
        Ok(attempt)
    }

    /// Resolves a pending attempt with a zero-timeout check. Settled attempts
    /// keep their outcome.
    pub fn classify<C>(&mut self, connector: &mut C) -> AttemptState
    where
        C: Connector<Socket = S>,
    {
        if !self.state.is_settled() {
            self.state = if connector.is_connected(&self.socket) {
                AttemptState::Succeeded
            } else {
                AttemptState::Failed
            };
        }
        self.state
    }

    /// Numeric dotted-decimal form of the target address.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }
}

/// Fixed-size table of attempts sharing one wait.
#[derive(Debug)]
pub struct Batch<S> {
    attempts: Vec<Attempt<S>>,
}

impl<S> Batch<S> {
    /// Reserves room for `size` attempts and launches one per address pulled
    /// from `addresses`.
    ///
    /// If the table cannot be reserved nothing is launched. If a socket cannot
    /// be set up, the ones already opened are closed before the error returns.
    pub fn launch<C, A>(connector: &mut C, addresses: &mut A, port: u16, size: usize) -> Result<Self>
    where
        C: Connector<Socket = S>,
        A: Iterator<Item = Ipv4Addr>,
    {
        let mut attempts = Vec::new();
        attempts
            .try_reserve_exact(size)
            .map_err(|_| ScanError::Allocation { requested: size })?;

        for (slot, ip) in addresses.take(size).enumerate() {
            attempts.push(Attempt::launch(connector, SocketAddrV4::new(ip, port), slot)?);
        }
        Ok(Self { attempts })
    }

    /// Two-phase settle.
    ///
    /// Phase 1 blocks once, for up to `timeout`, until any pending socket is
    /// writable. That wakes on the first socket to resolve, so phase 2 then
    /// checks every attempt with a zero timeout. Anything still pending at that
    /// point is failed. Returns the number of successes.
    ///
    /// A wait cut short by a signal resumes with whatever is left of `timeout`.
    pub fn settle<C>(&mut self, connector: &mut C, timeout: Duration) -> usize
    where
        C: Connector<Socket = S>,
    {
        let pending: Vec<&S> = self
            .attempts
            .iter()
            .filter(|a| a.state == AttemptState::AwaitingWritable)
            .map(|a| &a.socket)
            .collect();

        if !pending.is_empty() {
            let deadline = Instant::now().checked_add(timeout);
            let mut remaining = timeout;
            loop {
                match connector.wait_writable(&pending, remaining) {
                    Ok(ready) => {
                        debug!("{} of {} sockets writable after wait", ready, pending.len());
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                        remaining = deadline.map_or(remaining, |d| {
                            d.saturating_duration_since(Instant::now())
                        });
                        debug!("Wait interrupted, resuming with {:?} left", remaining);
                    }
                    Err(e) => {
                        warn!("Waiting on {} sockets failed, classifying anyway: {}", pending.len(), e);
                        break;
                    }
                }
            }
        }

        self.attempts
            .iter_mut()
            .map(|attempt| attempt.classify(connector))
            .filter(|&state| state == AttemptState::Succeeded)
            .count()
    }

    pub fn attempts(&self) -> &[Attempt<S>] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Closes every socket and hands back the addresses that accepted, in
    /// slot order.
    pub fn into_responders(self) -> Vec<String> {
        self.attempts
            .into_iter()
            .filter(|a| a.state == AttemptState::Succeeded)
            .map(|a| a.address)
            .collect()
    }
}
