//! One source object through read, convert, write and (optionally) remove.

use std::fmt;
use tracing::{debug, error, info, instrument, warn};

use crate::convert::{self, output_object, SourceFormat};
use crate::error::Result;
use crate::storage::{ObjectRef, Storage};

/// Where an item is in its lifecycle. Logged with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStage {
    Pending,
    Reading,
    Converting,
    Writing,
    Removing,
    Done,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Reading => "reading",
            Self::Converting => "converting",
            Self::Writing => "writing",
            Self::Removing => "removing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal state of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Every output was written (and the source removed, if requested).
    Converted { outputs: Vec<ObjectRef> },
    /// No converter handles the object's extension.
    Skipped,
    /// Some stage failed; outputs already written are left in place.
    Failed { stage: ItemStage },
    /// The batch was cancelled before the item started.
    Cancelled,
}

/// Drive `object` to a terminal state. Errors are logged here and never
/// propagate to the caller.
#[instrument(level = "debug", skip_all, fields(object = %object))]
pub async fn process(storage: &dyn Storage, object: &str, remove_source: bool) -> ItemOutcome {
    let format = match SourceFormat::from_object(object) {
        Ok(format) => format,
        Err(e) => {
            warn!(object = %object, error = %e, "skipping");
            return ItemOutcome::Skipped;
        }
    };

    let mut stage = ItemStage::Pending;
    match run_stages(storage, object, format, remove_source, &mut stage).await {
        Ok(outputs) => {
            info!(object = %object, outputs = ?outputs, "converted");
            ItemOutcome::Converted { outputs }
        }
        Err(e) => {
            error!(object = %object, stage = %stage, error = %e.report(), "conversion failed");
            ItemOutcome::Failed { stage }
        }
    }
}

async fn run_stages(
    storage: &dyn Storage,
    object: &str,
    format: SourceFormat,
    remove_source: bool,
    stage: &mut ItemStage,
) -> Result<Vec<ObjectRef>> {
    *stage = ItemStage::Reading;
    let buffer = storage.read(object).await?;
    debug!(stage = %stage, bytes = buffer.len(), "read source");

    *stage = ItemStage::Converting;
    let outputs =
        tokio::task::spawn_blocking(move || convert::convert(format, &buffer)).await??;

    *stage = ItemStage::Writing;
    let mut written = Vec::with_capacity(outputs.len());
    for output in outputs {
        let target = output_object(object, format, output.extension);
        storage.write(&target, output.buffer).await?;
        debug!(stage = %stage, target = %target, "wrote output");
        written.push(target);
    }

    if remove_source {
        *stage = ItemStage::Removing;
        storage.remove(object).await?;
        debug!(stage = %stage, "removed source");
    }

    *stage = ItemStage::Done;
    Ok(written)
}
