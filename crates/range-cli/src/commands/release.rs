//! Release command

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::context::CliContext;

pub struct ReleaseCommand {
    context: Arc<CliContext>,
}

impl ReleaseCommand {
    pub fn new(context: Arc<CliContext>) -> Self {
        Self { context }
    }

    /// Delete the range record `reference`
    pub async fn execute(&self, reference: &str) -> Result<()> {
        self.context
            .allocator()
            .release(reference)
            .await
            .with_context(|| format!("Failed to release {}", reference))?;

        println!("✓ Released {}", reference);
        Ok(())
    }
}
