use std::path::PathBuf;

use art_gen_gateway::prompt::normalize_seed;
use art_gen_gateway::{Config, PromptConstructor};
use base64::{engine::general_purpose, Engine as _};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "artctl", about = "CLI for the art generation gateway", version)]
struct Cli {
    /// Gateway base URL (defaults to GATEWAY_URL or http://127.0.0.1:3001)
    #[arg(global = true, long)]
    gateway_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the gateway for a painting and save it
    Generate {
        /// Painting style, e.g. "impressionism"
        #[arg(long)]
        style: String,
        /// Seed string for reproducible output
        #[arg(long)]
        seed: Option<String>,
        /// Selects one of the prompt variations
        #[arg(long)]
        random_factor: Option<i64>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long)]
        steps: Option<u32>,
        /// Output path (defaults to ./generated.<ext> for inline images)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Show credential and vendor status
    Status,
    /// Print the prompt and seed the gateway would use, without calling it
    Prompt {
        #[arg(long)]
        style: String,
        #[arg(long)]
        random_factor: Option<i64>,
        #[arg(long)]
        seed: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load env and parse CLI
    Config::dotenv_load();
    let cli = Cli::parse();
    let gateway = cli
        .gateway_url
        .or_else(|| std::env::var("GATEWAY_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:3001".to_string());
    let gateway = gateway.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Generate { style, seed, random_factor, width, height, steps, out } => {
            let mut body = json!({ "style": style, "timestamp": unix_millis() });
            if let Some(v) = seed { body["seed"] = Value::String(v); }
            if let Some(v) = random_factor { body["randomFactor"] = Value::from(v); }
            if let Some(v) = width { body["width"] = Value::from(v); }
            if let Some(v) = height { body["height"] = Value::from(v); }
            if let Some(v) = steps { body["steps"] = Value::from(v); }

            let response = client.post(format!("{}/api/generate", gateway)).json(&body).send().await?;
            let status = response.status();
            let payload: Value = response.json().await?;
            if !status.is_success() {
                eprintln!(
                    "Error ({}): {} - {}",
                    status.as_u16(),
                    payload["error"].as_str().unwrap_or("unknown"),
                    payload["details"].as_str().unwrap_or_default()
                );
                std::process::exit(1);
            }

            println!("Prompt: {}", payload["prompt"].as_str().unwrap_or_default());
            let image_url = payload["imageUrl"].as_str().unwrap_or_default();
            match parse_data_uri(image_url) {
                Some((ext, encoded)) => {
                    let bytes = general_purpose::STANDARD.decode(encoded)?;
                    let path = out.unwrap_or_else(|| PathBuf::from(format!("generated.{}", ext)));
                    tokio::fs::write(&path, &bytes).await?;
                    println!("Saved {} ({} bytes)", path.display(), bytes.len());
                }
                None => match out {
                    Some(path) => {
                        let bytes = client.get(image_url).send().await?.error_for_status()?.bytes().await?;
                        tokio::fs::write(&path, &bytes).await?;
                        println!("Saved {} ({} bytes)", path.display(), bytes.len());
                    }
                    None => println!("Image: {}", image_url),
                },
            }
            Ok(())
        }
        Commands::Status => {
            let v: Value = client.get(format!("{}/api/status", gateway)).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&v)?);
            Ok(())
        }
        Commands::Prompt { style, random_factor, seed } => {
            println!("{}", PromptConstructor::new().construct_prompt(&style, random_factor));
            match normalize_seed(seed.as_deref()) {
                Some(n) => println!("seed: {}", n),
                None => println!("seed: <vendor random>"),
            }
            Ok(())
        }
    }
}

/// `data:image/png;base64,AAAA` -> `("png", "AAAA")`.
fn parse_data_uri(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, encoded) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let ext = match mime.strip_prefix("image/")? {
        "jpeg" => "jpg",
        other => other,
    };
    Some((ext, encoded))
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
