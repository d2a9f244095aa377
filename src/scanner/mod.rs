//! Core functionality for actual scanning behaviour.
//!
//! The scan runs on one thread. Each batch opens a non-blocking connect per
//! target, waits once for the whole batch and then sweeps it. Batches run one
//! after another and never share sockets.
use crate::error::Result;
use crate::generator::AddressGenerator;
use colored::Colorize;
use log::debug;
use std::num::NonZeroUsize;
use std::time::Duration;

mod batch;
mod connector;
#[cfg(test)]
mod fake;

pub use batch::{Attempt, AttemptState, Batch};
pub use connector::Connector;
#[cfg(any(unix, windows))]
pub use connector::SystemConnector;

/// Sizes of the batches needed to issue `total` attempts, `batch_size` at a
/// time. Only the last one can be smaller.
///
/// ```rust
/// # use std::num::NonZeroUsize;
/// # use randsweep::scanner::BatchPlan;
/// let plan = BatchPlan::new(NonZeroUsize::new(10).unwrap(), 25);
/// assert_eq!(plan.collect::<Vec<_>>(), vec![10, 10, 5]);
/// ```
#[derive(Debug, Clone)]
pub struct BatchPlan {
    batch_size: usize,
    remaining: usize,
}

impl BatchPlan {
    pub fn new(batch_size: NonZeroUsize, total: usize) -> Self {
        Self {
            batch_size: batch_size.get(),
            remaining: total,
        }
    }
}

impl Iterator for BatchPlan {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let size = self.batch_size.min(self.remaining);
        self.remaining -= size;
        Some(size)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let batches = self.remaining.div_ceil(self.batch_size);
        (batches, Some(batches))
    }
}

impl ExactSizeIterator for BatchPlan {}

/// What a finished scan found.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Connection attempts issued.
    pub scanned: usize,
    /// Batches run.
    pub batches: usize,
    /// Addresses that accepted, in the order they were probed.
    pub responders: Vec<String>,
}

impl ScanReport {
    pub fn successes(&self) -> usize {
        self.responders.len()
    }
}

/// The class for the scanner
/// port is the TCP port probed on every target
/// batch_size is how many connects are in flight at once, and so how many sockets are open
/// total is how many targets are probed over the whole run
/// timeout is how long each batch waits before its pending connects count as failed
/// greppable and accessible control how responders are printed as they come in
#[derive(Debug)]
pub struct Scanner<C: Connector> {
    connector: C,
    port: u16,
    batch_size: NonZeroUsize,
    total: usize,
    timeout: Duration,
    greppable: bool,
    accessible: bool,
}

// Allowing too many arguments for clippy.
#[allow(clippy::too_many_arguments)]
impl<C: Connector> Scanner<C> {
    pub fn new(
        connector: C,
        port: u16,
        batch_size: usize,
        total: usize,
        timeout: Duration,
        greppable: bool,
        accessible: bool,
    ) -> Self {
        Self {
            connector,
            port,
            batch_size: NonZeroUsize::new(batch_size).unwrap_or(NonZeroUsize::MIN),
            total,
            timeout,
            greppable,
            accessible,
        }
    }

    /// Runs batches until `total` attempts have been issued.
    ///
    /// Fails on the first allocation or socket setup error, after closing
    /// whatever the current batch had opened. No partial report is returned.
    pub fn run(&mut self, generator: &mut AddressGenerator) -> Result<ScanReport> {
        let plan = BatchPlan::new(self.batch_size, self.total);
        debug!(
            "Start scanning. \nPort {}\nBatch size {}\nTotal {}\nBatches {}\nTimeout {:?}",
            self.port,
            self.batch_size,
            self.total,
            plan.len(),
            self.timeout
        );

        let mut report = ScanReport::default();
        for size in plan {
            let mut batch = Batch::launch(&mut self.connector, generator, self.port, size)?;
            report.scanned += size;
            report.batches += 1;

            let replied = batch.settle(&mut self.connector, self.timeout);
            debug!(
                "Batch {} settled, {}/{} replied",
                report.batches, replied, size
            );

            for address in batch.into_responders() {
                self.fmt_responder(&address);
                report.responders.push(address);
            }
        }

        debug!(
            "Scanned {} addresses, {} replied",
            report.scanned,
            report.successes()
        );
        Ok(report)
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Formats and prints a responder
    fn fmt_responder(&self, address: &str) {
        if !self.greppable {
            if self.accessible {
                println!("Open {address}");
            } else {
                println!("Open {}", address.purple());
            }
        }
    }
}
