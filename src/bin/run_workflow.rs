use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use comfyui_edit_worker::config::{split_urls, Config};
use comfyui_edit_worker::runner::{self, RunnerArgs};
use comfyui_edit_worker::Prober;

#[derive(Parser, Debug)]
#[command(name = "run_workflow", about = "Run an image-edit workflow on ComfyUI", version)]
struct Cli {
    /// API-format workflow JSON
    #[arg(long, value_name = "PATH")]
    workflow: PathBuf,
    /// First input image (wired to the first LoadImage node)
    #[arg(long, value_name = "PATH")]
    input1: PathBuf,
    /// Second input image (wired to the second LoadImage node)
    #[arg(long, value_name = "PATH")]
    input2: PathBuf,
    /// Where to write the produced image
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
    /// Extra params as a JSON object
    #[arg(long, default_value = "{}")]
    params: String,
    /// Override COMFYUI_URLS (comma separated)
    #[arg(long)]
    comfyui_url: Option<String>,
}

#[tokio::main]
async fn main() {
    Config::dotenv_load();
    // Stderr without colour: the handler keeps this output as the job log.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut conf = Config::new().expect("Failed to load config");
    if let Some(urls) = cli.comfyui_url {
        conf.comfyui_urls = split_urls(&urls);
    }

    let args = RunnerArgs {
        workflow: cli.workflow,
        input1: cli.input1,
        input2: cli.input2,
        output: cli.output,
        params: cli.params,
    };
    let code = runner::run(&args, &Prober::from_config(&conf)).await;
    std::process::exit(code);
}
