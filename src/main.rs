use anyhow::Context;
use doozer::cli::{Args, DeployRequest, DeployTarget, ExecutionMode};
use doozer::config::{ConfigDiscovery, DeployerConfig};
use doozer::deployment::Deployer;
use doozer::template::TemplateCatalog;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries JSON only.
    let default_filter = if args.verbose { "doozer=debug" } else { "doozer=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    if mode == ExecutionMode::ShowConfig {
        ConfigDiscovery::show_discovery_info(args.config.as_deref());
        return Ok(());
    }

    if mode == ExecutionMode::InitConfig {
        let path = ConfigDiscovery::create_default_user_config()?;
        println!("{}", path.display());
        return Ok(());
    }

    let config = ConfigDiscovery::load(args.config.as_deref())?;
    let catalog = config.template_catalog();

    if mode == ExecutionMode::Templates {
        let templates: Vec<_> = catalog.all().collect();
        return print_json(&templates);
    }

    let deployer = connect(&config).await?;

    match mode {
        ExecutionMode::Deploy(request) => run_deploy(&deployer, &catalog, request).await,
        ExecutionMode::List => print_json(&deployer.list_deployments().await),
        ExecutionMode::Get(id) => match deployer.get_deployment(&id).await {
            Some(deployment) => print_json(&deployment),
            None => {
                eprintln!("Deployment '{}' not found", id);
                std::process::exit(1);
            }
        },
        ExecutionMode::Templates | ExecutionMode::ShowConfig | ExecutionMode::InitConfig => {
            Ok(())
        }
    }
}

async fn connect(config: &DeployerConfig) -> anyhow::Result<Deployer> {
    let deployer = Deployer::connect(config)
        .await
        .context("Failed to initialise deployer")?;

    let dirs = deployer.state_directories();
    info!("Local state directory is '{}'", dirs.local_root().display());
    info!("Host state directory is '{}'", dirs.host_root().display());

    Ok(deployer)
}

async fn run_deploy(
    deployer: &Deployer,
    catalog: &TemplateCatalog,
    request: DeployRequest,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling deployment");
            interrupt.cancel();
        }
    });

    let result = match &request.target {
        DeployTarget::Template(template_id) => {
            if let Some(template) = catalog.get(*template_id) {
                for name in template.mismatched_parameters(&request.parameters) {
                    warn!(
                        "Parameter '{}' does not look like the declared type for template {}",
                        name, template_id
                    );
                }
            }
            deployer
                .deploy_template(
                    catalog,
                    *template_id,
                    &request.deployment_id,
                    &request.parameters,
                    cancel,
                )
                .await?
        }
        DeployTarget::Image(image) => {
            deployer
                .deploy_with_cancellation(
                    &request.deployment_id,
                    image,
                    &request.parameters,
                    cancel,
                )
                .await?
        }
    };

    print_json(&result)?;
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
