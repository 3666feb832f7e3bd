/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Command-line entry point for the snapshot lifecycle tool

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use snapshot_lifecycle::{
    ArmComputeClient, ClientSecretCredential, DefaultCredential, LifecycleConfig,
    SnapshotManager, TokenCredential,
};

#[derive(Debug, Parser)]
#[command(name = "snapcopy")]
#[command(about = "Copy disk snapshots across regions and expire old copies", long_about = None)]
#[command(version)]
struct Cli {
    /// Subscription id (falls back to SUBSCRIPTION_ID)
    #[arg(short = 's', long)]
    subscription_id: Option<String>,

    /// Source resource group (falls back to RESOURCE_GROUP)
    #[arg(short = 'g', long)]
    resource_group: Option<String>,

    /// Destination resource group for the copies (falls back to
    /// DESTINATION_RESOURCE_GROUP)
    #[arg(short = 'd', long)]
    destination_resource_group: Option<String>,

    /// Destination region for the copies (falls back to DESTINATION_REGION)
    #[arg(short = 'r', long)]
    destination_region: Option<String>,

    /// Service principal client id (falls back to CLIENT_ID)
    #[arg(short = 'c', long)]
    client_id: Option<String>,

    /// Service principal client secret (falls back to CLIENT_SECRET)
    #[arg(short = 'e', long)]
    client_secret: Option<String>,

    /// Service principal tenant id (falls back to TENANT_ID)
    #[arg(short = 't', long)]
    tenant_id: Option<String>,

    /// Skip deletion of expired destination snapshots
    #[arg(short = 'i', long)]
    skip_snapshots_deletion: bool,

    /// Retention window in days for destination snapshots
    #[arg(short = 'x', long, default_value_t = LifecycleConfig::DEFAULT_EXPIRE_DAYS)]
    expire_days: i64,

    /// Name prefix for newly copied snapshots
    #[arg(short = 'p', long, default_value = LifecycleConfig::DEFAULT_NAME_PREFIX)]
    snapshot_name_prefix: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Cli::parse();

    let config = LifecycleConfig {
        subscription_id: required("subscription-id", args.subscription_id, "SUBSCRIPTION_ID"),
        resource_group: required("resource-group", args.resource_group, "RESOURCE_GROUP"),
        destination_resource_group: required(
            "destination-resource-group",
            args.destination_resource_group,
            "DESTINATION_RESOURCE_GROUP",
        ),
        destination_region: required(
            "destination-region",
            args.destination_region,
            "DESTINATION_REGION",
        ),
        snapshot_name_prefix: args.snapshot_name_prefix,
        expire_days: args.expire_days,
        skip_deletion: args.skip_snapshots_deletion,
    };

    let credential = select_credential(
        optional(args.client_id, "CLIENT_ID"),
        optional(args.client_secret, "CLIENT_SECRET"),
        optional(args.tenant_id, "TENANT_ID"),
    );

    let client = match ArmComputeClient::new(&config.subscription_id, credential) {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "failed to construct management client");
            std::process::exit(1);
        }
    };

    if let Err(err) = client.authenticate().await {
        error!(error = %err, "authentication failed");
        std::process::exit(1);
    }

    let manager = SnapshotManager::new(Arc::new(client), config);
    if let Err(err) = manager.run().await {
        error!(error = %err, "lifecycle run failed");
        std::process::exit(1);
    }
}

fn select_credential(
    client_id: Option<String>,
    client_secret: Option<String>,
    tenant_id: Option<String>,
) -> Arc<dyn TokenCredential> {
    match (client_id, client_secret, tenant_id) {
        (Some(client_id), Some(client_secret), Some(tenant_id)) => {
            info!("authenticating with service principal");
            Arc::new(ClientSecretCredential::new(tenant_id, client_id, client_secret))
        }
        _ => {
            info!("authenticating with default credentials");
            Arc::new(DefaultCredential)
        }
    }
}

/// Flag value, environment fallback, or a fatal usage message.
fn required(flag: &str, value: Option<String>, env_var: &str) -> String {
    value
        .or_else(|| std::env::var(env_var).ok())
        .unwrap_or_else(|| {
            eprintln!("No {flag} specified. Use --{flag} or set the {env_var} environment variable.");
            std::process::exit(1);
        })
}

fn optional(value: Option<String>, env_var: &str) -> Option<String> {
    value.or_else(|| std::env::var(env_var).ok())
}
