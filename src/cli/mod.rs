//! # ctl
//!
//! Command-line companion to the controller binary: inspect the
//! `EncryptionMigrationController` status, list a component's key
//! secrets and their derived roles, and nudge an immediate resync.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use encryption_migration_controller::crd::EncryptionMigrationController;
use encryption_migration_controller::model::GroupResource;
use encryption_migration_controller::store::KeySecretStore;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;

#[derive(Parser)]
#[command(name = "ctl")]
#[command(about = "Encryption migration controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Namespace the component's key secrets live in.
    #[arg(short, long, global = true, default_value = "openshift-config-managed")]
    namespace: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the conditions on a EncryptionMigrationController resource.
    Status {
        /// Name of the EncryptionMigrationController resource.
        #[arg(short, long, default_value = "cluster")]
        name: String,
    },
    /// List a component's key secrets and their derived write/read roles.
    ListKeys {
        /// Component selector value, e.g. kube-apiserver.
        #[arg(short, long)]
        component: String,
    },
    /// Force an immediate resync by bumping a trigger annotation.
    Sync {
        #[arg(short, long, default_value = "cluster")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ctl=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let client = Client::try_default()
        .await
        .context("failed to build Kubernetes client, check kubeconfig")?;

    match cli.command {
        Commands::Status { name } => status_command(client, &name).await,
        Commands::ListKeys { component } => list_keys_command(client, &cli.namespace, &component).await,
        Commands::Sync { name } => sync_command(client, &name).await,
    }
}

async fn status_command(client: Client, name: &str) -> Result<()> {
    let api: Api<EncryptionMigrationController> = Api::all(client);
    let resource = api
        .get(name)
        .await
        .with_context(|| format!("fetching EncryptionMigrationController '{name}'"))?;

    println!("EncryptionMigrationController/{name}");
    match resource.status {
        Some(status) => {
            if let Some(last_sync) = &status.last_sync_time {
                println!("  Last sync: {last_sync}");
            }
            if status.conditions.is_empty() {
                println!("  (no conditions reported yet)");
            }
            for condition in &status.conditions {
                println!("  {}: {:?}", condition.r#type, condition.status);
                if let Some(message) = &condition.message {
                    println!("    {message}");
                }
            }
        }
        None => println!("  (no status yet)"),
    }
    Ok(())
}

async fn list_keys_command(client: Client, namespace: &str, component: &str) -> Result<()> {
    let store = KeySecretStore::new(client, namespace, component);
    let keys = store.list_keys().await?;
    if keys.is_empty() {
        println!("No key secrets found for component '{component}' in namespace '{namespace}'.");
        return Ok(());
    }
    println!("{:<28} {:<6} {:<10} {:<12}", "SECRET", "ID", "MODE", "MIGRATED FOR");
    for (idx, raw) in keys.iter().enumerate() {
        let role = if idx == 0 { "write" } else { "read/migrated" };
        let migrated: Vec<String> = raw
            .annotations
            .migrated_resources
            .iter()
            .map(GroupResource::human)
            .collect();
        println!(
            "{:<28} {:<6} {:<10} {}",
            raw.key.secret_name,
            raw.key.id,
            role,
            migrated.join(",")
        );
    }
    Ok(())
}

async fn sync_command(client: Client, name: &str) -> Result<()> {
    let api: Api<EncryptionMigrationController> = Api::all(client);
    let timestamp = chrono::Utc::now().to_rfc3339();
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                "encryption.operator.openshift.io/force-sync": timestamp,
            }
        }
    });
    api.patch(name, &PatchParams::apply("ctl").force(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("patching EncryptionMigrationController '{name}'"))?;
    println!("Requested immediate resync of '{name}' at {timestamp}");
    Ok(())
}
