//! Console consumer: prints fragments as they arrive and reports usage.
//!
//! Generated text goes to the primary writer (stdout) unframed. Usage, cost
//! and throughput go to the diagnostic writer (stderr) so redirecting the
//! text to a file never captures them.

use crate::client::Exchange;
use crate::cost::{tokens_per_second, Cost, PricingRegistry};
use crate::error::Error;
use crate::types::{Fragment, Usage};
use std::io::Write;
use std::time::Duration;

/// Final figures for one exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub usage: Usage,
    pub cost: Cost,
    pub elapsed: Duration,
    pub tokens_per_second: f64,
}

impl Summary {
    pub fn new(usage: Usage, cost: Cost, elapsed: Duration) -> Self {
        Self {
            usage,
            cost,
            elapsed,
            tokens_per_second: tokens_per_second(usage.output_tokens, elapsed),
        }
    }
}

/// Writes fragments to `out` and the end-of-run summary to `diag`.
pub struct Reporter<O, D> {
    out: O,
    diag: D,
    verbose: bool,
    bytes_written: usize,
}

impl<O: Write, D: Write> Reporter<O, D> {
    pub fn new(out: O, diag: D, verbose: bool) -> Self {
        Self {
            out,
            diag,
            verbose,
            bytes_written: 0,
        }
    }

    /// Write one fragment immediately. Returns `false` once the completion
    /// sentinel arrives.
    pub fn write_fragment(&mut self, fragment: &Fragment) -> Result<bool, Error> {
        match fragment {
            Fragment::Text(text) => {
                self.out.write_all(text.as_bytes())?;
                self.out.flush()?;
                self.bytes_written += text.len();
                Ok(true)
            }
            Fragment::Done => Ok(false),
        }
    }

    /// Print fragments in arrival order until the sentinel arrives or the
    /// channel closes.
    pub async fn drain(&mut self, exchange: &mut Exchange) -> Result<(), Error> {
        while let Some(fragment) = exchange.recv().await {
            if !self.write_fragment(&fragment)? {
                break;
            }
        }
        Ok(())
    }

    /// Write the usage, cost and throughput lines. Silent unless verbose.
    pub fn report(&mut self, summary: &Summary) -> Result<(), Error> {
        if !self.verbose {
            return Ok(());
        }
        if self.bytes_written > 0 {
            writeln!(self.diag)?;
        }
        writeln!(
            self.diag,
            "Usage: {}, Total Cost: ${:.6}",
            summary.usage,
            summary.cost.total()
        )?;
        writeln!(
            self.diag,
            "Tokens per second: {:.2}",
            summary.tokens_per_second
        )?;
        self.diag.flush()?;
        Ok(())
    }

    /// Bytes of generated text written so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Release the writers.
    pub fn into_inner(self) -> (O, D) {
        (self.out, self.diag)
    }
}

/// Drain an exchange to the console, then compute and report its cost.
///
/// Text already written is kept if the stream fails part-way.
pub async fn consume<O: Write, D: Write>(
    mut exchange: Exchange,
    reporter: &mut Reporter<O, D>,
    pricing: &PricingRegistry,
) -> Result<Summary, Error> {
    reporter.drain(&mut exchange).await?;

    let model = exchange.spec().model;
    let (usage, elapsed) = exchange.finish().await?;
    let summary = Summary::new(usage, pricing.cost_or_zero(model, &usage), elapsed);
    reporter.report(&summary)?;
    Ok(summary)
}
