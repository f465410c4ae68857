use anyhow::Result;
use clap::Parser;
use genai_gateway::models::{Config, InboundRequest, Modality};
use genai_gateway::Gateway;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "genai-gateway")]
#[command(about = "Send one prompt through the generation gateway")]
struct CliArgs {
    /// Prompt text to generate from.
    #[arg(value_name = "PROMPT")]
    prompt: String,

    /// Override the configured modality (text or image).
    #[arg(long, value_parser = parse_modality_arg)]
    modality: Option<Modality>,

    /// Brand name for social-content prompts.
    #[arg(long)]
    brand: Option<String>,

    /// Tone used together with --brand.
    #[arg(long)]
    tone: Option<String>,

    /// HTTP method to present to the gateway.
    #[arg(long, default_value = "POST")]
    method: String,
}

fn parse_modality_arg(input: &str) -> std::result::Result<Modality, String> {
    input
        .parse()
        .map_err(|_| format!("Invalid modality '{}'. Expected text or image", input))
}

fn build_inbound(args: &CliArgs) -> InboundRequest {
    let mut body = serde_json::json!({ "prompt": args.prompt });
    if let Some(modality) = args.modality {
        body["modality"] = serde_json::json!(modality);
    }
    if let Some(brand) = &args.brand {
        body["brand"] = serde_json::json!(brand);
    }
    if let Some(tone) = &args.tone {
        body["tone"] = serde_json::json!(tone);
    }

    InboundRequest::new(
        args.method.clone(),
        Some("application/json"),
        body.to_string().into_bytes(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genai_gateway=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    let gateway = Gateway::from_config(&config);
    let inbound = build_inbound(&args);

    let response = match gateway.handle_until(&inbound, ctrl_c()).await {
        Some(response) => response,
        None => {
            error!("Interrupted before the provider answered");
            std::process::exit(130);
        }
    };

    info!("Gateway responded with status {}", response.status);
    println!("{}", serde_json::to_string_pretty(&response.body)?);

    if !response.status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modality_arg() {
        assert_eq!(parse_modality_arg("IMAGE").unwrap(), Modality::Image);
        let err = parse_modality_arg("audio").unwrap_err();
        assert!(err.contains("text or image"));
    }

    #[test]
    fn test_build_inbound_includes_optional_fields() {
        let args = CliArgs::parse_from([
            "genai-gateway",
            "launch week",
            "--modality",
            "text",
            "--brand",
            "Acme",
        ]);
        let inbound = build_inbound(&args);

        assert_eq!(inbound.method, "POST");
        let body: serde_json::Value = serde_json::from_slice(&inbound.body).unwrap();
        assert_eq!(body["prompt"], "launch week");
        assert_eq!(body["modality"], "text");
        assert_eq!(body["brand"], "Acme");
        assert!(body.get("tone").is_none());
    }
}
