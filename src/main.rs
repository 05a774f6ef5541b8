use encryption_migration_controller::config::ControllerConfig;
use encryption_migration_controller::runtime::initialize;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ControllerConfig::from_env();
    initialize(config).await
}
