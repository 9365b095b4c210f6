#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps
)]

use anyhow::{bail, Result};
use chatrelay::config::Config;
use chatrelay::{gateway, media::ImageMimePolicy, providers};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::Write;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// `chatrelay` - session-scoped chat over an OpenAI-compatible model API.
#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(version)]
#[command(about = "HTTP chat relay with per-session history.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (defaults to ~/.chatrelay)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway
    #[command(long_about = "\
Start the HTTP gateway.

Serves POST /chat plus the history and health routes. Bind address \
defaults to the values in your config file (gateway.host / gateway.port).

Examples:
  chatrelay gateway                  # use config defaults
  chatrelay gateway -p 8080          # listen on port 8080
  chatrelay gateway --host 0.0.0.0   # bind to all interfaces
  chatrelay gateway -p 0             # random available port")]
    Gateway {
        /// Port to listen on (use 0 for random available port); defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Show the effective configuration
    Status,

    /// List supported model providers
    Providers,

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `chatrelay`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(chatrelay completions bash)
  chatrelay completions zsh > ~/.zfunc/_chatrelay
  chatrelay completions fish > ~/.config/fish/completions/chatrelay.fish")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("CHATRELAY_CONFIG_DIR", config_dir);
    }

    // Completions must remain stdout-only and should not load config or initialize logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    // Respects RUST_LOG, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Completions { .. } => unreachable!(),

        Commands::Gateway { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            if port == 0 {
                info!("Starting chatrelay gateway on {host} (random port)");
            } else {
                info!("Starting chatrelay gateway on {host}:{port}");
            }
            gateway::run_gateway(&host, port, config).await
        }

        Commands::Status => {
            print_status(&config);
            Ok(())
        }

        Commands::Providers => {
            let current = config
                .default_provider
                .as_deref()
                .unwrap_or("gemini")
                .trim()
                .to_ascii_lowercase();
            let providers = providers::list_providers();
            println!("Supported providers ({} total):\n", providers.len());
            println!("  ID (use in config)  DESCRIPTION");
            for p in &providers {
                let marker = if p.name == current { " (active)" } else { "" };
                println!(
                    "  {:<19} {}{}  [key: {}]",
                    p.name, p.display_name, marker, p.credential_env
                );
            }
            println!("\n  custom:<URL>        Any OpenAI-compatible endpoint");
            Ok(())
        }
    }
}

fn print_status(config: &Config) {
    let provider = config.default_provider.as_deref().unwrap_or("gemini");
    let credential = providers::resolve_provider_credential(provider, config.api_key.as_deref());

    println!("chatrelay status");
    println!();
    println!("Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("Config:      {}", config.config_path.display());
    println!();
    println!("Provider:    {provider}");
    println!(
        "  Model:       {}",
        config.default_model.as_deref().unwrap_or("gemini-2.0-flash")
    );
    println!("  Temperature: {}", config.default_temperature);
    if let Some(url) = &config.api_url {
        println!("  API URL:     {url}");
    }
    println!(
        "  API key:     {}",
        if credential.is_some() { "set" } else { "missing" }
    );
    println!(
        "  System:      {}",
        if config.system_prompt.is_some() { "set" } else { "none" }
    );
    println!();
    println!("Gateway:");
    println!("  Bind:          {}:{}", config.gateway.host, config.gateway.port);
    println!("  Max body:      {} bytes", config.gateway.max_body_bytes);
    println!("  Timeout:       {}s", config.gateway.request_timeout_secs);
    println!();
    println!(
        "History cap:   {}",
        match config.history.max_messages {
            0 => "unbounded".to_string(),
            n => format!("{n} messages"),
        }
    );
    println!(
        "Image MIME:    {}",
        match ImageMimePolicy::from(&config.media) {
            ImageMimePolicy::Fixed(mime) => format!("fixed ({mime})"),
            ImageMimePolicy::Detect { fallback } => format!("detect (fallback {fallback})"),
        }
    );
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}
