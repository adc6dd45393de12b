use std::io::Write as _;

use clap::{Parser, Subcommand};
use console_realtime::prelude::*;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "console-realtime")]
#[command(about = "Stream assistant replies and watch job notifications from the console API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream an assistant reply to stdout
    Chat {
        #[arg(long, short)]
        message: String,
        #[arg(long)]
        system_prompt: Option<String>,
    },
    /// Print push notifications until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    console_realtime::init_observability();

    let cli = Cli::parse();
    let config = ConsoleConfig::from_env()?;
    match cli.command {
        Commands::Chat {
            message,
            system_prompt,
        } => chat(config, message, system_prompt).await?,
        Commands::Watch => watch(config).await?,
    }
    Ok(())
}

async fn chat(
    config: ConsoleConfig,
    message: String,
    system_prompt: Option<String>,
) -> Result<(), ConsoleError> {
    let assistant = AssistantClient::new(config)?;
    let mut request = ChatRequest::new().user_text(message);
    if let Some(prompt) = system_prompt {
        request = request.system_prompt(prompt);
    }

    let session = assistant
        .session()
        .on_chunk(|text| {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        })
        .on_error(|message| error!(%message, "assistant stream failed"));
    let abort = session.abort_handle();
    let reply = assistant.chat_stream(request, session);
    tokio::pin!(reply);

    let outcome = tokio::select! {
        outcome = &mut reply => outcome?,
        _ = tokio::signal::ctrl_c() => {
            abort.abort();
            match reply.await {
                Err(ConsoleError::Stream(StreamError::Cancelled { .. })) => {
                    println!();
                    return Ok(());
                }
                other => other?,
            }
        }
    };
    println!();
    if let StreamEnding::Failed(message) = outcome.ending {
        return Err(ConsoleError::Protocol(message));
    }
    Ok(())
}

async fn watch(config: ConsoleConfig) -> Result<(), ConsoleError> {
    let socket = SocketClient::new(&config);
    socket.on_message(|msg| match serde_json::to_string(msg) {
        Ok(line) => println!("{line}"),
        Err(e) => error!(error = %e, "failed to print push message"),
    });
    socket.on_error(|message| error!(%message, "server reported an error"));

    match socket.connect().await {
        Ok(()) => {}
        Err(ConsoleError::Socket(SocketError::Connect(reason))) => {
            warn!(%reason, "initial connection failed; retrying in the background");
        }
        Err(e) => return Err(e),
    }

    let mut states = socket.watch_state();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = states.wait_for(|s| *s == ConnectionState::Disconnected) => {
            error!("push socket gave up reconnecting");
        }
    }
    socket.disconnect();
    Ok(())
}
