//! The review resolution loop.
//!
//! Consumes the review phase's blocking findings and drives one corrective
//! sub-cycle per finding: synthesize a patch request from the finding's
//! resolution hint, ask the gateway to generate and apply it, and mark the
//! finding resolved only if the gateway reports success. The loop never
//! re-runs review to discover new findings; a fresh finding set requires a
//! fresh orchestrator pass, which bounds the work to one attempt per finding
//! per cycle.

use std::path::Path;
use tracing::{error, info, warn};

use crate::agent::{AgentGateway, AgentRequest};
use crate::errors::ResolutionError;
use crate::review::ReviewOutcome;

pub struct ReviewResolver<'a> {
    gateway: &'a dyn AgentGateway,
    skip_resolution: bool,
}

impl<'a> ReviewResolver<'a> {
    pub fn new(gateway: &'a dyn AgentGateway, skip_resolution: bool) -> Self {
        Self {
            gateway,
            skip_resolution,
        }
    }

    /// Resolve every blocking finding in `outcome`, in the order received.
    ///
    /// Returns the number of patch calls made. With resolution skipped, one
    /// or more blockers abort immediately with their count and descriptions,
    /// and zero patch calls are made. A failed patch aborts with that
    /// finding's description; already-applied patches are not rolled back.
    /// On success the resolved blockers are dropped from `outcome` so
    /// persisted state reflects what remains outstanding.
    pub async fn resolve(
        &self,
        run_id: &str,
        workspace: &Path,
        spec_ref: Option<&str>,
        outcome: &mut ReviewOutcome,
    ) -> Result<u32, ResolutionError> {
        let blocking: Vec<_> = outcome.blocking().into_iter().cloned().collect();
        if blocking.is_empty() {
            return Ok(0);
        }

        if self.skip_resolution {
            error!(
                count = blocking.len(),
                "blocking findings present, resolution skipped"
            );
            for finding in &blocking {
                error!(index = finding.index, "  - {}", finding.description);
            }
            return Err(ResolutionError::Unresolved {
                count: blocking.len(),
            });
        }

        warn!(
            count = blocking.len(),
            "blocking findings present, attempting resolution"
        );

        let mut patch_calls = 0u32;
        for finding in &blocking {
            info!(
                index = finding.index,
                description = %finding.description,
                "resolving blocking finding"
            );

            let mut args = vec![
                finding.resolution_hint.clone(),
                spec_ref.unwrap_or_default().to_string(),
            ];
            if let Some(evidence) = &finding.evidence_ref {
                args.push(evidence.clone());
            }

            let request = AgentRequest::new("review_patcher", "/patch", run_id)
                .with_args(args)
                .with_working_dir(workspace.to_path_buf());

            let response = self.gateway.invoke(&request).await?;
            patch_calls += 1;

            if !response.success {
                error!(
                    index = finding.index,
                    output = %response.output,
                    "patch failed to apply"
                );
                return Err(ResolutionError::PatchFailed {
                    index: finding.index,
                    description: finding.description.clone(),
                });
            }

            info!(index = finding.index, "blocking finding resolved");
        }

        outcome.clear_blockers();
        Ok(patch_calls)
    }
}
