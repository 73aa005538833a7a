use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

use comfyui_edit_worker::config::split_urls;
use comfyui_edit_worker::workflow::parse_set_pairs;
use comfyui_edit_worker::{Config, Handler, HandlerConfig, Prober};

#[derive(Parser, Debug)]
#[command(name = "editctl", about = "CLI for the ComfyUI edit worker", version)]
struct Cli {
    /// Override COMFYUI_URLS (comma separated)
    #[arg(global = true, long)]
    comfyui_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one edit job locally through the same handler the server uses
    Run {
        /// First input image
        #[arg(long, value_name = "PATH")]
        image1: PathBuf,
        /// Second input image
        #[arg(long, value_name = "PATH")]
        image2: PathBuf,
        /// Workflow JSON (defaults to DEFAULT_WORKFLOW)
        #[arg(long, value_name = "PATH")]
        workflow: Option<String>,
        /// Params as key=value (repeatable). Dotted keys like `3.inputs.seed`
        /// address exact graph paths.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,
        /// Where to save the edited image
        #[arg(long, value_name = "PATH", default_value = "output.png")]
        out: PathBuf,
        /// Print the runner log
        #[arg(short, long)]
        verbose: bool,
    },
    /// List configured ComfyUI endpoints that answer /system_stats
    Endpoints {
        /// Print the stats JSON for each reachable endpoint
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Config::dotenv_load();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();

    let mut conf = Config::new().expect("Failed to load config");
    if let Some(urls) = cli.comfyui_url {
        conf.comfyui_urls = split_urls(&urls);
        // The runner reads its endpoints from the environment.
        std::env::set_var("COMFYUI_URLS", conf.comfyui_urls.join(","));
    }

    match cli.command {
        Commands::Run { image1, image2, workflow, sets, out, verbose } => {
            let params = parse_set_pairs(&sets)?;
            let mut event = json!({
                "image1_b64": STANDARD.encode(tokio::fs::read(&image1).await?),
                "image2_b64": STANDARD.encode(tokio::fs::read(&image2).await?),
                "params": Value::Object(params),
            });
            if let Some(wf) = workflow {
                event["workflow"] = Value::String(wf);
            }

            let handler = Handler::new(HandlerConfig::from(&conf));
            let result = handler.handle(event).await;
            if verbose {
                if let Some(log) = &result.log {
                    eprintln!("{}", log);
                }
            }
            match result.output_b64.as_deref() {
                Some(b64) if result.is_ok() => {
                    let bytes = STANDARD.decode(b64)?;
                    tokio::fs::write(&out, &bytes).await?;
                    println!(
                        "Saved {} ({} bytes) in {:.1}s",
                        out.display(),
                        bytes.len(),
                        result.elapsed_s.unwrap_or_default()
                    );
                    Ok(())
                }
                _ => {
                    eprintln!("Error: {}", result.message.as_deref().unwrap_or("job failed"));
                    if let Some(code) = result.returncode {
                        eprintln!("Runner exit code: {}", code);
                    }
                    std::process::exit(1);
                }
            }
        }
        Commands::Endpoints { json } => {
            let prober = Prober::from_config(&conf);
            let found = prober.reachable().await;
            if found.is_empty() {
                eprintln!("No ComfyUI endpoint reachable. Tried: {}", prober.endpoints().join(", "));
                std::process::exit(1);
            }
            for (endpoint, stats) in found {
                if json {
                    println!("{} {}", endpoint, serde_json::to_string(&stats)?);
                } else {
                    println!("{}", endpoint);
                }
            }
            Ok(())
        }
    }
}
