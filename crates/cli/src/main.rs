mod config_commands;

use {
    clap::{Parser, Subcommand},
    std::path::PathBuf,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    wicket_client::Client,
    wicket_config::WicketConfig,
};

#[derive(Parser)]
#[command(name = "wicket", about = "wicket: a hot-reloadable plug-based IRC bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Only look for the config file in this directory.
    #[arg(long, global = true, env = "WICKET_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the server and run until shut down.
    Run {
        /// Override the configured server host.
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        nickname: Option<String>,
    },
    /// List available plugs and the autoload list.
    Plugs,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn apply_overrides(
    config: &mut WicketConfig,
    server: Option<String>,
    port: Option<u16>,
    nickname: Option<String>,
) {
    if let Some(server) = server {
        config.server = server;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(nickname) = nickname {
        config.nickname = nickname;
    }
}

async fn run(config: WicketConfig) -> anyhow::Result<()> {
    let catalog = wicket_builtins::catalog();
    for name in &config.plugs.autoload {
        if !catalog.contains(name) {
            warn!(plug = %name, "autoload plug has no implementation");
        }
    }

    let client = Client::new(&config, catalog)?;
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    client.run(interrupt).await?;
    Ok(())
}

fn list_plugs(config: &WicketConfig) {
    let catalog = wicket_builtins::catalog();
    println!("available: {}", catalog.names().join(", "));
    println!("autoload:  {}", config.plugs.autoload.join(", "));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(dir) = &cli.config_dir {
        wicket_config::set_config_dir(dir.clone());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "wicket starting");

    match cli.command {
        Commands::Run {
            server,
            port,
            nickname,
        } => {
            let mut config = wicket_config::discover_and_load();
            apply_overrides(&mut config, server, port, nickname);
            run(config).await
        },
        Commands::Plugs => {
            list_plugs(&wicket_config::discover_and_load());
            Ok(())
        },
        Commands::Config { action } => config_commands::handle_config(action),
    }
}
