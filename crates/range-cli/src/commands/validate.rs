//! Validate command

use anyhow::{Context, Result};

use ddi_range_core::{AddressRange, CidrBlock, Ipv4Address};

use crate::output::{OutputFormat, RangeReport};

/// Validate command implementation
///
/// Checks bounds locally without contacting the backend.
pub struct ValidateCommand {
    format: OutputFormat,
}

impl ValidateCommand {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Execute validate command
    pub fn execute(
        &self,
        cidr: CidrBlock,
        start: Ipv4Address,
        end: Ipv4Address,
    ) -> Result<RangeReport> {
        let range = AddressRange::new(cidr, start, end)
            .with_context(|| format!("Range {}-{} is not valid in {}", start, end, cidr))?;

        let report = RangeReport::new(&range);
        match self.format {
            OutputFormat::Text => {
                println!("✓ {} is a valid range", report.render(self.format)?);
            }
            OutputFormat::Json => println!("{}", report.render(self.format)?),
        }

        Ok(report)
    }
}
