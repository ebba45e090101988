//! The assembler: materialize the output tree for a finished fetch
//! session and hand the result back to the caller.

use std::path::PathBuf;

use airlift_core::BundleConfig;
use airlift_fetch::FetchReport;
use airlift_util::error::AirliftError;
use airlift_util::fs::{ensure_dir, is_non_empty_dir};

use crate::{archive, layout, scripts};

/// Where the sealed bundle ended up.
#[derive(Debug, Clone)]
pub struct BundleOutcome {
    pub output_path: PathBuf,
    pub placed: usize,
}

/// Lay the fetched artifacts into `config.output_dir`, write install
/// scripts if requested, and package the tree.
///
/// The output directory is owned exclusively by one session: a non-empty
/// directory is refused unless the caller passed `allow_existing`.
/// Failed artifacts are skipped; a cancelled report never reaches here.
pub fn assemble(
    config: &BundleConfig,
    report: &FetchReport,
    allow_existing: bool,
) -> miette::Result<BundleOutcome> {
    let output = &config.output_dir;
    if is_non_empty_dir(output) && !allow_existing {
        return Err(AirliftError::InvalidRequest {
            message: format!(
                "output directory {} is not empty; confirm overwrite first",
                output.display()
            ),
        }
        .into());
    }
    ensure_dir(output).map_err(AirliftError::Io)?;

    let completed: Vec<_> = report
        .results
        .iter()
        .filter(|r| !r.files.is_empty())
        .cloned()
        .collect();
    layout::place_all(output, &completed)?;

    if config.include_scripts {
        scripts::write_scripts(output, &completed)?;
    }

    let output_path = archive::package(output, config.output_format)?;
    tracing::info!(
        "bundle sealed at {} with {} artifacts",
        output_path.display(),
        completed.len()
    );
    Ok(BundleOutcome {
        output_path,
        placed: completed.len(),
    })
}
