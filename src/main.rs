#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown, clippy::if_not_else, clippy::non_ascii_literal)]

use randsweep::exclusion::ExclusionTable;
use randsweep::generator::AddressGenerator;
use randsweep::input::{Config, Opts};
use randsweep::scanner::{Scanner, SystemConnector};
use randsweep::{detail, output, warning};

use anyhow::{anyhow, Context};
use log::debug;
use std::time::Instant;

// Descriptors the process needs besides the sockets of one batch.
const FILE_DESCRIPTOR_HEADROOM: u64 = 100;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut opts: Opts = Opts::read();
    if !opts.no_config {
        let config =
            Config::read(opts.config_path.clone()).context("Invalid configuration file")?;
        opts.merge(&config);
    }
    opts.validate().map_err(|e| anyhow!(e))?;
    let port = opts.port.context("No target port given")?;

    debug!("Main() `opts` arguments are {opts:?}");

    if !opts.greppable && !opts.accessible && !opts.no_banner {
        print_opening(&opts);
    }

    let exclusions = ExclusionTable::with_extra(opts.exclude_addresses.iter().flatten())?;
    let mut generator = match opts.seed {
        Some(seed) => AddressGenerator::from_seed(seed, exclusions),
        None => AddressGenerator::new(exclusions),
    };

    let ulimit = adjust_ulimit_size(&opts);
    let batch_size = infer_batch_size(&opts, ulimit);

    detail!(
        format!(
            "port - {port}, per batch - {batch_size}, total - {}, timeout - {}ms",
            opts.total, opts.timeout
        ),
        opts.greppable,
        opts.accessible
    );

    let mut scanner = Scanner::new(
        SystemConnector,
        port,
        batch_size,
        usize::try_from(opts.total).unwrap_or(usize::MAX),
        opts.timeout_duration(),
        opts.greppable,
        opts.accessible,
    );

    let started = Instant::now();
    let report = scanner.run(&mut generator).context("Scan aborted")?;
    let elapsed = started.elapsed();
    debug!("Scan took {elapsed:?}");

    if opts.greppable {
        for address in &report.responders {
            println!("{address}");
        }
    }

    output!(
        format!("total/replied - {}/{}", report.scanned, report.successes()),
        opts.greppable,
        opts.accessible
    );
    detail!(
        format!("time taken - {:.2}s", elapsed.as_secs_f64()),
        opts.greppable,
        opts.accessible
    );

    Ok(())
}

/// Prints the opening title.
fn print_opening(opts: &Opts) {
    debug!("Printing opening");
    let title = format!("randsweep {}", env!("CARGO_PKG_VERSION"));
    println!("{}", ansi_term::Style::new().bold().paint(title));
    println!("Random IPv4 reachability sweeps.");
    println!("------------------------------------------------------");

    if let Some(path) = opts.config_path.clone().or_else(randsweep::input::default_config_path) {
        detail!(
            format!("The config file is expected to be at {path:?}"),
            opts.greppable,
            opts.accessible
        );
    }
}

#[cfg(unix)]
fn adjust_ulimit_size(opts: &Opts) -> Option<u64> {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                opts.greppable,
                opts.accessible
            );
        } else {
            warning!(
                "ERROR. Failed to set ulimit value.",
                opts.greppable,
                opts.accessible
            );
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => Some(soft),
        Err(e) => {
            debug!("Could not read the open file limit: {e}");
            None
        }
    }
}

#[cfg(not(unix))]
fn adjust_ulimit_size(_opts: &Opts) -> Option<u64> {
    None
}

/// Every attempt in a batch holds a socket, so the batch has to fit under the
/// open file limit with some room to spare.
fn infer_batch_size(opts: &Opts, ulimit: Option<u64>) -> usize {
    let requested = u64::from(opts.batch_size);
    let Some(ulimit) = ulimit else {
        return usize::from(opts.batch_size);
    };

    if ulimit >= requested + FILE_DESCRIPTOR_HEADROOM {
        return usize::from(opts.batch_size);
    }

    let reduced = ulimit.saturating_sub(FILE_DESCRIPTOR_HEADROOM).max(1);
    warning!(
        format!(
            "File limit {ulimit} is too low for a batch size of {requested}, lowering it to {reduced}. Consider upping it with --ulimit."
        ),
        opts.greppable,
        opts.accessible
    );
    usize::try_from(reduced).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::infer_batch_size;
    use randsweep::input::Opts;

    fn opts(batch_size: u16) -> Opts {
        Opts {
            batch_size,
            ..Opts::default()
        }
    }

    #[test]
    fn batch_size_kept_when_limit_is_roomy() {
        assert_eq!(infer_batch_size(&opts(500), Some(8_000)), 500);
        assert_eq!(infer_batch_size(&opts(500), Some(600)), 500);
    }

    #[test]
    fn batch_size_kept_when_limit_is_unknown() {
        assert_eq!(infer_batch_size(&opts(10_000), None), 10_000);
    }

    #[test]
    fn batch_size_lowered_under_small_limit() {
        assert_eq!(infer_batch_size(&opts(5_000), Some(1_024)), 924);
        assert_eq!(infer_batch_size(&opts(5_000), Some(599)), 499);
    }

    #[test]
    fn batch_size_never_drops_to_zero() {
        assert_eq!(infer_batch_size(&opts(100), Some(50)), 1);
    }
}
