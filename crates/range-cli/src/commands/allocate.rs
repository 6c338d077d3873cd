//! Allocate command

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use ddi_range_core::{AllocationRequest, CidrBlock, Ipv4Address, RangeSpec};

use crate::context::CliContext;
use crate::output::RangeReport;

#[derive(Debug, Clone, Default)]
pub struct AllocateArgs {
    pub cidr: Option<CidrBlock>,
    pub count: Option<u32>,
    pub start: Option<Ipv4Address>,
    pub end: Option<Ipv4Address>,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub dry_run: bool,
}

impl AllocateArgs {
    fn request(&self) -> Result<AllocationRequest> {
        let cidr = self.cidr.context("--cidr is required")?;
        match (self.count, self.start, self.end) {
            (Some(count), None, None) => Ok(AllocationRequest::sequential(cidr, count)),
            (None, Some(start), Some(end)) => Ok(AllocationRequest::explicit(cidr, start, end)),
            _ => bail!("Specify either --count or both --start and --end"),
        }
    }
}

/// Allocate command implementation
pub struct AllocateCommand {
    context: Arc<CliContext>,
}

impl AllocateCommand {
    pub fn new(context: Arc<CliContext>) -> Self {
        Self { context }
    }

    /// Execute allocate command
    pub async fn execute(&self, args: &AllocateArgs) -> Result<RangeReport> {
        let request = args.request()?;
        self.context.prepare_network(*request.cidr()).await?;
        let allocator = self.context.allocator();

        let report = if args.dry_run {
            let range = allocator
                .allocate(&request)
                .await
                .context("Range allocation failed")?;
            log::info!("Dry run, not creating {}", range);
            RangeReport::new(&range)
        } else {
            let spec = RangeSpec {
                name: args.name.clone(),
                comment: args.comment.clone(),
                ..Default::default()
            };
            let allocated = allocator
                .allocate_and_create(&request, &spec)
                .await
                .context("Range allocation failed")?;
            RangeReport::new(&allocated.range).with_record(&allocated.record)
        };

        println!("{}", report.render(self.context.format)?);
        Ok(report)
    }
}
