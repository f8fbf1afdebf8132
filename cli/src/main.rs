use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod util;

use commands::session::SessionTarget;
use util::exit_error;

#[derive(Parser)]
#[command(name = "socra", version, about = "Socra CLI: drive a tutoring session from the terminal")]
struct Cli {
    /// API base URL
    #[arg(long, env = "SOCRA_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Learner identifier
    #[arg(long, env = "SOCRA_LEARNER_ID", global = true)]
    learner_id: Option<String>,

    /// Diagnostic session identifier
    #[arg(long, env = "SOCRA_SESSION_ID", global = true)]
    session_id: Option<String>,

    /// Print compact JSON instead of pretty-printed
    #[arg(long, global = true)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Start a session from the learner's diagnostic results
    Start,
    /// Run one action against the session
    Act {
        /// Action name (e.g. start_practice, text_input, next_concept)
        action: String,
        /// Action payload, usually a concept name
        #[arg(long)]
        data: Option<String>,
        /// Free text as the learner would type it
        #[arg(long)]
        text: Option<String>,
    },
    /// Show the current session state
    Show,
    /// Drop the session on the server
    End,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api_url = cli.api_url.trim_end_matches('/');

    let code = match &cli.command {
        Commands::Health => commands::health::run(api_url, cli.raw).await,
        Commands::Start => commands::session::start(api_url, &session_target(&cli), cli.raw).await,
        Commands::Act { action, data, text } => {
            commands::session::act(
                api_url,
                &session_target(&cli),
                action,
                data.as_deref(),
                text.as_deref(),
                cli.raw,
            )
            .await
        }
        Commands::Show => commands::session::show(api_url, &session_target(&cli), cli.raw).await,
        Commands::End => commands::session::end(api_url, &session_target(&cli), cli.raw).await,
    };

    std::process::exit(code);
}

fn session_target(cli: &Cli) -> SessionTarget<'_> {
    let learner_id = cli.learner_id.as_deref().unwrap_or_else(|| {
        exit_error(
            "learner_id is required for session commands",
            Some("Set --learner-id or SOCRA_LEARNER_ID env var"),
        )
    });
    let session_id = cli.session_id.as_deref().unwrap_or_else(|| {
        exit_error(
            "session_id is required for session commands",
            Some("Set --session-id or SOCRA_SESSION_ID env var"),
        )
    });
    SessionTarget {
        learner_id,
        session_id,
    }
}
