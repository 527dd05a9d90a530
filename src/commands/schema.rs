//! `dsm-host schema`: print the policy JSON schema.

use anyhow::{Context, Result};
use schemars::schema_for;

use crate::policy::ServicePolicy;

pub fn run() -> Result<()> {
    let schema = schema_for!(ServicePolicy);
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    println!("{}", json);
    Ok(())
}
