//! Scale command (converge a service group onto a count).

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use tsg_reconcile::{Instance, ReconcileOutcome, Reconciler, TracingSink};
use tsg_triton::{Signer, TritonClient, TritonConfig};

use crate::config::ScaleConfig;
use crate::output::{print_info, print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Scale command - run one reconciliation pass for a service group.
#[derive(Debug, Args)]
pub struct ScaleCommand {
    /// Service group name (value of the `tsg.name` tag).
    #[arg(long)]
    tsg_name: String,

    /// Template the new instances are created from.
    #[arg(long)]
    template_id: String,

    /// Expected number of instances.
    #[arg(short = 'c', long)]
    count: String,

    /// Instance tag as key=value. Repeatable.
    #[arg(short = 't', long = "tag", value_delimiter = ',')]
    tags: Vec<String>,

    /// Only count instances in this state (e.g. running).
    #[arg(long)]
    state: Option<String>,

    /// Package for new instances.
    #[arg(long = "pkg-id")]
    package: Option<String>,

    /// Image for new instances.
    #[arg(long = "img-id")]
    image: Option<String>,

    /// Enable the cloud firewall on new instances.
    #[arg(long)]
    firewall: bool,

    /// Network ids. Repeatable or comma-separated.
    #[arg(short = 'N', long, value_delimiter = ',')]
    networks: Vec<String>,

    /// Base64-encoded key=value metadata. Repeatable.
    #[arg(short = 'm', long, value_delimiter = ',')]
    metadata: Vec<String>,

    /// Affinity rules. Repeatable.
    #[arg(long, value_delimiter = ',')]
    affinity: Vec<String>,

    /// Base64-encoded user script.
    #[arg(long)]
    userdata: Option<String>,
}

impl ScaleCommand {
    fn into_config(self) -> ScaleConfig {
        ScaleConfig {
            tsg_name: self.tsg_name,
            template_id: self.template_id,
            count: self.count,
            tags: self.tags,
            state: self.state,
            package: self.package,
            image: self.image,
            firewall: self.firewall,
            networks: self.networks,
            metadata: self.metadata,
            affinity: self.affinity,
            userdata: self.userdata,
        }
    }

    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let connection = ctx.connection()?;
        let desired = self.into_config().resolve(&connection.account)?;

        let signer = Signer::select(&connection.key_id, connection.key_material.as_deref())?;
        signer.check().await?;
        let config = TritonConfig::new(connection.url, connection.account.clone());
        let client = TritonClient::new(&config, signer)?;

        info!(
            tsg_name = %desired.group_name,
            target = desired.target_count,
            account = %desired.account,
            "Reconciling service group"
        );
        let outcome = Reconciler::new(client, TracingSink)
            .reconcile(&desired)
            .await?;

        render(&desired.group_name, &outcome, ctx.format);
        Ok(())
    }
}

/// One affected instance.
#[derive(Debug, Serialize, Tabled)]
struct InstanceRow {
    #[tabled(rename = "Action")]
    action: &'static str,

    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "Name")]
    name: String,
}

impl InstanceRow {
    fn created(instance: &Instance) -> Self {
        Self {
            action: "created",
            id: instance.id.clone(),
            name: instance.name_tag().unwrap_or("-").to_string(),
        }
    }

    fn deleted(id: &str) -> Self {
        Self {
            action: "deleted",
            id: id.to_string(),
            name: "-".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ScaleReport<'a> {
    tsg_name: &'a str,
    #[serde(flatten)]
    outcome: &'a ReconcileOutcome,
}

fn rows(outcome: &ReconcileOutcome) -> Vec<InstanceRow> {
    match outcome {
        ReconcileOutcome::ScaledUp { created } => created.iter().map(InstanceRow::created).collect(),
        ReconcileOutcome::ScaledDown { deleted } => {
            deleted.iter().map(|id| InstanceRow::deleted(id)).collect()
        }
        ReconcileOutcome::NoOp { .. } => Vec::new(),
    }
}

fn render(tsg_name: &str, outcome: &ReconcileOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_single(&ScaleReport { tsg_name, outcome }),
        OutputFormat::Table => match outcome {
            ReconcileOutcome::NoOp { found, .. } => {
                print_info(&format!(
                    "TSG '{}' already has {} instance(s); nothing to do",
                    tsg_name, found
                ));
            }
            ReconcileOutcome::ScaledUp { created } => {
                print_success(&format!(
                    "Created {} instance(s) in TSG '{}'",
                    created.len(),
                    tsg_name
                ));
                print_output(&rows(outcome), format);
            }
            ReconcileOutcome::ScaledDown { deleted } => {
                print_success(&format!(
                    "Deleted {} instance(s) from TSG '{}'",
                    deleted.len(),
                    tsg_name
                ));
                print_output(&rows(outcome), format);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use clap::Parser;
    use rstest::rstest;

    use super::*;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        scale: ScaleCommand,
    }

    fn parse(args: &[&str]) -> Result<ScaleCommand, clap::Error> {
        let base = ["scale", "--tsg-name", "web", "--template-id", "abcdefgh1234"];
        Harness::try_parse_from(base.iter().chain(args)).map(|h| h.scale)
    }

    #[test]
    fn test_parses_repeated_and_delimited_values() {
        let cmd = parse(&[
            "-c",
            "3",
            "-t",
            "role=web",
            "--tag",
            "tier=front,zone=a",
            "-N",
            "net-1,net-2",
            "--firewall",
        ])
        .unwrap();
        let config = cmd.into_config();

        assert_eq!(config.count, "3");
        assert_eq!(config.tags, vec!["role=web", "tier=front", "zone=a"]);
        assert_eq!(config.networks, vec!["net-1", "net-2"]);
        assert!(config.firewall);
        assert_eq!(config.userdata, None);
    }

    #[rstest]
    #[case(&[])]
    #[case(&["--count"])]
    fn test_count_is_required(#[case] args: &[&str]) {
        assert!(parse(args).is_err());
    }

    #[test]
    fn test_rows_for_scale_up() {
        let instance = Instance {
            id: "c3d4e5f6-0000".to_string(),
            name: None,
            state: Some("provisioning".to_string()),
            created: Utc.timestamp_opt(1_500_000_000, 0).unwrap(),
            tags: BTreeMap::from([("name".to_string(), "tsg-abcdefgh-c3d4e5f6".to_string())]),
        };
        let outcome = ReconcileOutcome::ScaledUp {
            created: vec![instance],
        };

        let rows = rows(&outcome);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "created");
        assert_eq!(rows[0].name, "tsg-abcdefgh-c3d4e5f6");
    }

    #[test]
    fn test_json_report_is_flat() {
        let outcome = ReconcileOutcome::ScaledDown {
            deleted: vec!["a1".to_string()],
        };
        let value = serde_json::to_value(ScaleReport {
            tsg_name: "web",
            outcome: &outcome,
        })
        .unwrap();

        assert_eq!(
            value,
            serde_json::json!({ "tsg_name": "web", "outcome": "scaled_down", "deleted": ["a1"] })
        );
    }
}
