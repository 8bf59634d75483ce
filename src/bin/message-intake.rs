use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use message_intake::config::Config;
use message_intake::error::Result;
use message_intake::interfaces::transport::MessageSource;
use message_intake::services::rest_client::RestMessageClient;
use message_intake::services::validator::EnvelopeValidator;

#[derive(Parser, Debug)]
#[command(name = "message-intake")]
#[command(about = "Inspect the message intake pipeline against a delivery server")]
struct Cli {
    #[arg(long, default_value = "./data/message-intake.json")]
    config: String,

    #[arg(long, env = "MESSAGE_INTAKE_PASSWORD")]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print the configured server and local identities.
    Status,
    /// Fetch one batch and classify each envelope without decrypting or acknowledging.
    Peek,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,message_intake=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut config = Config::from_file(&cli.config)?;
    if cli.password.is_some() {
        config.server.password = cli.password.clone();
    }

    match cli.command {
        Commands::Status => {
            let ack = config.ack_config();
            let status = json!({
                "server": config.server.base_url,
                "primary_identity": config.identities.primary,
                "secondary_identity": config.identities.secondary,
                "ack": {
                    "max_concurrent": ack.max_concurrent,
                    "max_attempts": ack.max_attempts,
                    "initial_backoff_ms": ack.initial_backoff_ms,
                },
            });
            println!("{status:#}");
        }
        Commands::Peek => {
            let client = RestMessageClient::new(&config.server)?;
            let validator = EnvelopeValidator::new(config.local_identities());
            let batch = client.fetch_batch().await?;
            for raw in &batch.envelopes {
                let line = match validator.validate(raw) {
                    Ok(envelope) => json!({
                        "timestamp": envelope.timestamp(),
                        "server_guid": envelope.server_guid(),
                        "kind": format!("{:?}", envelope.kind()),
                        "local_identity": format!("{:?}", envelope.local_identity()),
                        "story": envelope.is_story(),
                    }),
                    Err(err) => json!({
                        "timestamp": raw.timestamp,
                        "server_guid": raw.guid,
                        "rejected": err.to_string(),
                    }),
                };
                println!("{line}");
            }
            for entry in &batch.malformed {
                let line = json!({
                    "timestamp": entry.timestamp,
                    "server_guid": entry.server_guid,
                    "rejected": entry.reason,
                });
                println!("{line}");
            }
            println!(
                "{}",
                json!({
                    "count": batch.len(),
                    "more": batch.has_more,
                    "server_delivery_timestamp": batch.server_delivery_timestamp,
                })
            );
        }
    }
    Ok(())
}
