//! `switchyard export`: print or write one versioned topic

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use tracing::info;

use crate::config::AppConfig;
use crate::control_plane::ControlPlane;
use crate::export::gslb_topic;

/// Topic name accepted together with `--bfe-cluster`
const GSLB_SHORT_TOPIC: &str = "gslb";

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Topic: route_rule, host_table, cluster_table, instance_table,
    /// certificate, gslb (with --bfe-cluster) or gslb.<bfe cluster>
    pub topic: String,

    /// BFE cluster whose GSLB row to export
    #[arg(long)]
    pub bfe_cluster: Option<String>,

    /// Version the caller already holds; an unchanged topic prints nothing
    #[arg(long)]
    pub last_version: Option<String>,

    /// Write the payload to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ExportArgs {
    /// Full topic name
    pub fn resolved_topic(&self) -> anyhow::Result<String> {
        match (self.topic.as_str(), self.bfe_cluster.as_deref()) {
            (GSLB_SHORT_TOPIC, Some(bfe_cluster)) => Ok(gslb_topic(bfe_cluster)),
            (GSLB_SHORT_TOPIC, None) => bail!("Topic 'gslb' needs --bfe-cluster"),
            (topic, None) => Ok(topic.to_string()),
            (topic, Some(_)) => bail!(
                "--bfe-cluster only applies to the 'gslb' topic, not '{}'",
                topic
            ),
        }
    }
}

pub(crate) async fn handle_export_command(
    args: ExportArgs,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let topic = args.resolved_topic()?;
    let plane = ControlPlane::from_config(config).await?;

    let last_version = args.last_version.as_deref();
    let Some(payload) = plane.exports().export_topic(&topic, last_version).await? else {
        println!("Topic '{}' unchanged", topic);
        return Ok(());
    };

    let body = serde_json::to_string_pretty(&payload).context("Failed to render export payload")?;
    match &args.output {
        Some(path) => {
            write_payload(path, &body)?;
            info!(topic = %topic, path = %path.display(), "Wrote export payload");
        }
        None => println!("{}", body),
    }

    Ok(())
}

fn write_payload(path: &Path, body: &str) -> anyhow::Result<()> {
    std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}
