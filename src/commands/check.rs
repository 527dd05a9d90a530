//! `dsm-host check`: validate policy files.

use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;

use crate::backend::is_library;
use crate::config;
use crate::output::Output;
use crate::policy::ServicePolicy;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Policy files to check
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Directory of backend libraries (default: $DSM_PLUGIN_DIR or /usr/lib/dsm/plugins)
    #[arg(long)]
    pub plugin_dir: Option<PathBuf>,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let plugin_dir = config::plugin_dir(args.plugin_dir);
    let mut invalid = 0;

    for file in &args.files {
        match ServicePolicy::load(file) {
            Ok(policy) => {
                let module = policy.module_path(&plugin_dir);
                let backend = if is_library(&module) {
                    "library"
                } else {
                    "no library"
                };
                Output::success(&policy.name);
                Output::kv("Bus", policy.bus.to_string());
                if let Some(bus_override) = policy.bus_override() {
                    Output::kv("Override", bus_override);
                }
                Output::kv("Backend", format!("{} ({})", module.display(), backend));
            }
            Err(e) => {
                Output::error(format!("{}: {}", file.display(), e));
                invalid += 1;
            }
        }
    }

    if invalid > 0 {
        bail!("{} of {} policies invalid", invalid, args.files.len());
    }
    Ok(())
}
