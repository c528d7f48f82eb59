//! Run a whole script batch by batch against an executor.

use crate::error::Result;
use crate::retry::{LogCallback, RetryPolicy, with_retry};
use crate::splitter::split;

/// Target that can run one batch.
///
/// Implementations return [`Error::Busy`](crate::Error::Busy) when the
/// target is locked so the runner can retry.
pub trait BatchExecutor {
    /// Run a single batch
    fn execute(&mut self, index: usize, batch: &str) -> Result<()>;
}

/// Split `script` and run every batch in order.
///
/// The script is split completely before anything runs, so a script with
/// an unterminated comment or quote executes nothing. Returns the number of
/// batches run.
pub fn run_script<E>(executor: &mut E, script: &str, policy: &RetryPolicy) -> Result<usize>
where
    E: BatchExecutor + ?Sized,
{
    let batches = split(script).collect::<Result<Vec<_>>>()?;
    for (index, batch) in batches.iter().enumerate() {
        log::debug!("Running batch {}/{}", index + 1, batches.len());
        with_retry(policy, Some(&LogCallback), || executor.execute(index, batch))?;
    }
    Ok(batches.len())
}
