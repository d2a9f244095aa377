//! This crate exposes the internal functionality of randsweep, a tool that
//! probes random public IPv4 addresses for one open TCP port.
//!
//! ## Architecture Overview
//!
//! Two pieces do the work:
//!
//! 1. **Address generation**: [`AddressGenerator`](crate::generator::AddressGenerator)
//!    draws from a xorshift PRNG and drops anything inside the
//!    [`ExclusionTable`](crate::exclusion::ExclusionTable) (private, loopback,
//!    shared and documentation space, plus whatever the user adds).
//! 2. **Batch scanning**: [`Scanner`](crate::scanner::Scanner) pulls addresses
//!    a batch at a time, fires a non-blocking connect at each, waits once for
//!    the whole batch and then sweeps it with zero-timeout checks.
//!
//! Everything runs on one thread. The OS does the concurrent part.
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use randsweep::exclusion::ExclusionTable;
//! use randsweep::generator::AddressGenerator;
//! use randsweep::scanner::{Scanner, SystemConnector};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut generator = AddressGenerator::new(ExclusionTable::reserved());
//!
//!     let mut scanner = Scanner::new(
//!         SystemConnector,
//!         80,                          // Target port
//!         500,                         // Batch size (sockets open at once)
//!         10_000,                      // Addresses to probe in total
//!         Duration::from_millis(1500), // Wait per batch
//!         true,                        // Greppable output (quiet mode)
//!         true,                        // Accessibility mode
//!     );
//!
//!     let report = scanner.run(&mut generator)?;
//!     println!("{}/{} replied", report.successes(), report.scanned);
//!     for address in &report.responders {
//!         println!("  {address}");
//!     }
//!     Ok(())
//! }
//! ```
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod input;

pub mod scanner;

pub mod generator;

pub mod exclusion;

pub mod error;
