mod commands;
mod context;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skybridge")]
#[command(about = "Run local instances on a remote provider cloud", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (otherwise discovered)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    tenant: TenantArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Tenant the request is made for
#[derive(Args, Debug, Clone, Default)]
pub struct TenantArgs {
    /// Tenant project id
    #[arg(long = "project", env = "OS_PROJECT_ID", global = true)]
    pub project_id: Option<String>,

    /// Tenant user id (trustor for `trust create`)
    #[arg(long = "user-id", env = "OS_USER_ID", global = true)]
    pub user_id: Option<String>,

    /// Existing bearer token
    #[arg(long, env = "OS_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "OS_USERNAME", global = true)]
    pub username: Option<String>,

    #[arg(long, env = "OS_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Delegation trust to impersonate through
    #[arg(long = "trust", env = "OS_TRUST_ID", global = true)]
    pub trust_id: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the remote counterpart of a local instance
    Spawn {
        /// Instance descriptor (JSON)
        instance: PathBuf,
        /// Image descriptor (JSON)
        #[arg(short, long)]
        image: PathBuf,
        /// Block device descriptors (JSON array)
        #[arg(short, long)]
        block_devices: Option<PathBuf>,
        /// File to inject, as GUEST_PATH=LOCAL_PATH
        #[arg(long = "inject", value_name = "GUEST_PATH=LOCAL_PATH")]
        inject: Vec<String>,
    },
    /// Delete the remote counterpart of a local instance
    Destroy {
        /// Instance descriptor (JSON)
        instance: PathBuf,
    },
    /// Start a stopped instance
    PowerOn {
        /// Instance descriptor (JSON)
        instance: PathBuf,
    },
    /// Stop a running instance
    PowerOff {
        /// Instance descriptor (JSON)
        instance: PathBuf,
    },
    /// Soft-reboot a running instance
    Reboot {
        /// Instance descriptor (JSON)
        instance: PathBuf,
    },
    /// Show the power state of an instance
    Inspect {
        /// Instance descriptor (JSON)
        instance: PathBuf,
    },
    /// List remote instances visible to the tenant
    List,
    /// Attach a volume to an instance
    Attach {
        /// Instance descriptor (JSON)
        instance: PathBuf,
        /// Volume connection info (JSON)
        volume: PathBuf,
        /// Guest device, e.g. /dev/vdb
        #[arg(short, long, default_value = "")]
        mountpoint: String,
    },
    /// Detach a volume from an instance
    Detach {
        /// Instance descriptor (JSON)
        instance: PathBuf,
        /// Volume connection info (JSON)
        volume: PathBuf,
        #[arg(short, long, default_value = "")]
        mountpoint: String,
    },
    /// Show the static capacity advertised for a node
    Capacity {
        /// Node name reported as hypervisor hostname
        #[arg(default_value = "skybridge")]
        node: String,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage per-project service users
    #[command(subcommand)]
    ServiceUser(ServiceUserCommands),
    /// Manage delegation trusts
    #[command(subcommand)]
    Trust(TrustCommands),
}

#[derive(Subcommand)]
pub enum ServiceUserCommands {
    /// Create a service user in a project
    Create {
        /// Target project id
        project: String,
        /// User name
        name: String,
        /// User password
        #[arg(long, env = "SKYBRIDGE_SERVICE_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Delete a service user
    Delete {
        /// Remote user id
        user_id: String,
    },
}

#[derive(Subcommand)]
pub enum TrustCommands {
    /// Create an impersonating trust from the tenant user
    Create {
        /// Trustee user id
        trustee: String,
        /// Delegated role (repeatable)
        #[arg(short, long = "role")]
        roles: Vec<String>,
    },
    /// Delete a trust
    Delete {
        /// Trust id
        trust_id: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = context::load_config(cli.config.as_deref())?;
    let driver = context::build_driver(&config)?;
    let tenant = cli.tenant;

    match cli.command {
        Commands::Spawn {
            instance,
            image,
            block_devices,
            inject,
        } => {
            commands::instance::spawn(
                &driver,
                &tenant,
                &instance,
                &image,
                block_devices.as_deref(),
                &inject,
            )
            .await?;
        }
        Commands::Destroy { instance } => {
            commands::instance::destroy(&driver, &tenant, &instance).await?;
        }
        Commands::PowerOn { instance } => {
            commands::instance::power_on(&driver, &tenant, &instance).await?;
        }
        Commands::PowerOff { instance } => {
            commands::instance::power_off(&driver, &tenant, &instance).await?;
        }
        Commands::Reboot { instance } => {
            commands::instance::reboot(&driver, &tenant, &instance).await?;
        }
        Commands::Inspect { instance } => {
            commands::instance::inspect(&driver, &tenant, &instance).await?;
        }
        Commands::List => {
            commands::instance::list(&driver, &tenant).await?;
        }
        Commands::Attach {
            instance,
            volume,
            mountpoint,
        } => {
            commands::volume::attach(&driver, &tenant, &instance, &volume, &mountpoint).await?;
        }
        Commands::Detach {
            instance,
            volume,
            mountpoint,
        } => {
            commands::volume::detach(&driver, &tenant, &instance, &volume, &mountpoint).await?;
        }
        Commands::Capacity { node, json } => {
            commands::instance::capacity(&driver, &node, json)?;
        }
        Commands::ServiceUser(cmd) => {
            commands::identity::service_user(&driver, cmd).await?;
        }
        Commands::Trust(cmd) => {
            commands::identity::trust(&driver, &tenant, cmd).await?;
        }
    }

    Ok(())
}
