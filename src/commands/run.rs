//! `dsm-host run`: host services until interrupted.

use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use crate::backend::DylibLoader;
use crate::bus::BusRegistry;
use crate::config;
use crate::host::ServiceHost;
use crate::output::Output;
use crate::policy::ServicePolicy;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Directory of service policies (default: $DSM_POLICY_DIR or /usr/share/dsm/services)
    #[arg(long)]
    pub policy_dir: Option<PathBuf>,

    /// Directory of backend libraries (default: $DSM_PLUGIN_DIR or /usr/lib/dsm/plugins)
    #[arg(long)]
    pub plugin_dir: Option<PathBuf>,

    /// Only host this service (repeatable)
    #[arg(long = "service", short = 's')]
    pub services: Vec<String>,
}

pub fn run(args: RunArgs) -> Result<()> {
    let policy_dir = config::policy_dir(args.policy_dir);
    let plugin_dir = config::plugin_dir(args.plugin_dir);

    let set = ServicePolicy::load_dir(&policy_dir)
        .with_context(|| format!("Failed to read policies from {}", policy_dir.display()))?;
    for (path, err) in &set.rejected {
        Output::warning(format!("Skipping {}: {}", path.display(), err));
    }

    let policies = select(set.policies, &args.services)?;
    if policies.is_empty() {
        bail!("No services to host in {}", policy_dir.display());
    }

    let (stop, stopped) = mpsc::channel();
    ctrlc::set_handler(move || {
        // The receiver is gone once `run` has returned.
        let _ = stop.send(());
    })
    .context("Failed to set signal handler")?;

    Output::info(format!(
        "Hosting {} service(s), plugins from {}",
        policies.len(),
        plugin_dir.display()
    ));
    let host = ServiceHost::start(
        policies,
        Arc::new(BusRegistry::zbus()),
        Arc::new(DylibLoader),
        plugin_dir,
    )?;

    // A dropped handler ends the wait the same as a signal.
    let _ = stopped.recv();
    eprintln!("\nReceived shutdown signal");

    for report in host.stop() {
        if !report.initialized {
            Output::error(format!("{}: not started", report.service));
        } else if report.registered && report.released {
            Output::success(&report.service);
        } else if report.registered {
            Output::warning(format!("{}: backend refused to unregister", report.service));
        } else {
            Output::warning(format!("{}: ran without a backend", report.service));
        }
    }
    Ok(())
}

/// Keep only the requested services, in policy order. Empty means all.
fn select(policies: Vec<ServicePolicy>, wanted: &[String]) -> Result<Vec<ServicePolicy>> {
    if wanted.is_empty() {
        return Ok(policies);
    }
    for name in wanted {
        if !policies.iter().any(|p| &p.name == name) {
            bail!("No policy for service '{}'", name);
        }
    }
    Ok(policies
        .into_iter()
        .filter(|p| wanted.contains(&p.name))
        .collect())
}
