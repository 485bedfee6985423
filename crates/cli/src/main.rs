mod key_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    persisto_config::PersistoConfig,
    persisto_memory::{MemoryStore, store_sqlite::SqliteMemoryStore},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "persisto", about = "Persisto: multi-tenant semantic memory")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: discover persisto.{toml,yaml,yml,json}).
    #[arg(long, global = true, env = "PERSISTO_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Overrides `server.port`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// API key management.
    Keys {
        #[command(subcommand)]
        action: key_commands::KeyAction,
    },
    /// List a tenant's namespaces.
    Namespaces {
        #[arg(long)]
        tenant: String,
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

fn load_config(cli: &Cli) -> anyhow::Result<PersistoConfig> {
    match &cli.config {
        Some(path) => persisto_config::load_config(path),
        None => persisto_config::discover_and_load(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "persisto starting");
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Gateway { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            persisto_gateway::start_gateway(config).await
        },
        Commands::Keys { action } => key_commands::handle_keys(action, &config.database.url).await,
        Commands::Namespaces { tenant } => {
            let store = SqliteMemoryStore::connect(&config.database.url).await?;
            for ns in store.list_namespaces(&tenant).await? {
                println!("{ns}");
            }
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::key_commands::KeyAction};

    #[test]
    fn parses_gateway_overrides() {
        let cli = Cli::try_parse_from(["persisto", "gateway", "--port", "9090", "--bind", "::1"])
            .unwrap();
        match cli.command {
            Commands::Gateway { bind, port } => {
                assert_eq!(bind.as_deref(), Some("::1"));
                assert_eq!(port, Some(9090));
            },
            _ => panic!("expected gateway command"),
        }
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
    }

    #[test]
    fn gateway_port_must_fit_u16() {
        assert!(Cli::try_parse_from(["persisto", "gateway", "--port", "70000"]).is_err());
    }

    #[test]
    fn parses_keys_create() {
        let cli = Cli::try_parse_from([
            "persisto", "keys", "create", "--tenant", "alice", "--label", "ci",
        ])
        .unwrap();
        match cli.command {
            Commands::Keys {
                action: KeyAction::Create { tenant, label },
            } => {
                assert_eq!(tenant, "alice");
                assert_eq!(label.as_deref(), Some("ci"));
            },
            _ => panic!("expected keys create"),
        }
    }

    #[test]
    fn keys_create_requires_tenant() {
        assert!(Cli::try_parse_from(["persisto", "keys", "create"]).is_err());
    }

    #[test]
    fn parses_keys_revoke_positional() {
        let cli = Cli::try_parse_from(["persisto", "keys", "revoke", "pk_abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Keys {
                action: KeyAction::Revoke { key },
            } if key == "pk_abc"
        ));
    }

    #[test]
    fn parses_namespaces_with_globals_after_subcommand() {
        let cli = Cli::try_parse_from([
            "persisto",
            "namespaces",
            "--tenant",
            "bob",
            "--log-level",
            "debug",
            "--json-logs",
            "--config",
            "/tmp/persisto.toml",
        ])
        .unwrap();
        assert!(matches!(&cli.command, Commands::Namespaces { tenant } if tenant == "bob"));
        assert_eq!(cli.log_level, "debug");
        assert!(cli.json_logs);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/persisto.toml")));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["persisto"]).is_err());
    }
}
