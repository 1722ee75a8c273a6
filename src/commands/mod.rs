//! Command handlers module.
//!
//! - `run.rs`: executes policies against the mounted shares
//! - `check.rs`: validates settings and policies without touching any share

mod check;
mod run;

use std::path::{Path, PathBuf};

use mirrorkeep::config::MirrorkeepConfig;
use mirrorkeep::{MirrorPolicy, load_policies};

pub use check::cmd_check;
pub use run::cmd_run;

/// Loads the policy file named on the command line, or the configured one.
fn load_selected_policies(
    config: &MirrorkeepConfig,
    policies: Option<&Path>,
) -> Result<(PathBuf, Vec<MirrorPolicy>), Box<dyn std::error::Error>> {
    let path = policies.map_or_else(|| config.policies_path.clone(), Path::to_path_buf);
    let loaded = load_policies(&path)?;
    Ok((path, loaded))
}
