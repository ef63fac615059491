//! headline-ctl: command-line remote for a running headline-reader.
//!
//! Sends one request to the local HTTP API and prints the JSON reply.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::{Client, Method};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "headline-ctl", about = "Control a running headline-reader")]
struct Args {
    /// API port of the running service
    #[arg(short, long, default_value_t = 8768)]
    port: u16,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Start (or resume) reading
    Start,
    /// Pause or resume
    Toggle,
    /// Skip to the next headline
    Next,
    /// Go back to the previous headline
    Previous,
    /// Stop playback and shut the service down
    Stop,
    /// Print current playback state
    Status,
    /// Append headlines to the queue
    Add {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Empty the headline queue
    Clear,
    /// Ask for permission to show the floating bubble
    RequestOverlay,
}

#[derive(Serialize)]
struct HeadlinesRequest {
    headlines: Vec<String>,
}

impl Action {
    fn route(&self) -> (Method, &'static str) {
        match self {
            Self::Start => (Method::POST, "/start"),
            Self::Toggle => (Method::POST, "/toggle"),
            Self::Next => (Method::POST, "/next"),
            Self::Previous => (Method::POST, "/previous"),
            Self::Stop => (Method::POST, "/stop"),
            Self::Status => (Method::GET, "/status"),
            Self::Add { .. } => (Method::POST, "/headlines"),
            Self::Clear => (Method::DELETE, "/headlines"),
            Self::RequestOverlay => (Method::POST, "/overlay/request"),
        }
    }
}

async fn send(client: &Client, port: u16, action: Action) -> Result<String, String> {
    let (method, path) = action.route();
    let url = format!("http://127.0.0.1:{port}{path}");

    let mut request = client.request(method, &url);
    if let Action::Add { items } = action {
        request = request.json(&HeadlinesRequest { headlines: items });
    }

    let response = request
        .send()
        .await
        .map_err(|e| format!("headline-reader not reachable on port {port}: {e}"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read response: {e}"))?;

    if !status.is_success() {
        return Err(format!("{status}: {body}"));
    }
    Ok(pretty(&body))
}

fn pretty(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| body.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let client = Client::builder()
        .connect_timeout(Duration::from_millis(300))
        .timeout(Duration::from_secs(3))
        .build()
        .unwrap_or_else(|_| Client::new());

    match send(&client, args.port, args.action).await {
        Ok(body) => {
            println!("{body}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
