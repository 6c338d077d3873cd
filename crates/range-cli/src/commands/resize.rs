//! Resize command

use anyhow::{bail, Result};
use std::sync::Arc;

use ddi_range_core::{AddressRange, CidrBlock, Ipv4Address, ManagedRange, RangeChange};

use crate::context::CliContext;
use crate::output::RangeReport;

/// Current bounds of the range plus the requested change
#[derive(Debug, Clone)]
pub struct ResizeArgs {
    pub reference: Option<String>,
    pub cidr: CidrBlock,
    pub start: Ipv4Address,
    pub end: Ipv4Address,
    pub change: RangeChange,
    pub dry_run: bool,
}

/// Resize command implementation
pub struct ResizeCommand {
    context: Arc<CliContext>,
}

impl ResizeCommand {
    pub fn new(context: Arc<CliContext>) -> Self {
        Self { context }
    }

    /// Execute resize command
    ///
    /// A rejected change is reported together with the range that was kept.
    pub async fn execute(&self, args: &ResizeArgs) -> Result<RangeReport> {
        if args.change.is_empty() {
            bail!("Specify at least one of --count, --new-start or --new-end");
        }

        let current = AddressRange::new(args.cidr, args.start, args.end)?;
        self.context.prepare_network(args.cidr).await?;

        let mut managed = ManagedRange::new(current);
        if !args.dry_run {
            match &args.reference {
                Some(reference) => managed = managed.with_reference(reference.clone()),
                None => bail!("--reference is required unless --dry-run is given"),
            }
        }

        let resizer = self.context.resizer();
        if let Err(rejection) = managed.apply(&resizer, &args.change).await {
            eprintln!(
                "Keeping {}",
                RangeReport::new(&rejection.retained).render(self.context.format)?
            );
            return Err(rejection.into());
        }

        let mut report = RangeReport::new(managed.range());
        if let Some(reference) = managed.reference() {
            report = report.with_reference(reference);
            report.committed = true;
        }

        println!("{}", report.render(self.context.format)?);
        Ok(report)
    }
}
