use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use formfill::config::Config;
use formfill::pipeline::Pipeline;
use formfill::provider::create_provider;
use formfill::registry::FormRegistry;

#[derive(Parser)]
#[command(name = "formfill", version, about = "Fill XFA PDF forms from free-text reports")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract values from reports and fill a form
    Process {
        /// Form name or id
        form: String,

        /// Report files (PDF or TXT)
        #[arg(required = true)]
        reports: Vec<PathBuf>,

        /// Output PDF path (defaults to the artifacts directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip writing intermediate artifacts
        #[arg(long)]
        no_artifacts: bool,
    },

    /// List available forms
    ListForms,

    /// Probe connectivity to the configured provider
    TestConnection,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Commands::Process {
            form,
            reports,
            output,
            no_artifacts,
        } => {
            let registry = FormRegistry::build(&config.forms_dir(), &config.templates_dir())?;
            let provider = create_provider(&config.provider)?;
            let pipeline = Pipeline::new(&registry, provider.as_ref(), &config);

            let result = pipeline.process(&form, &reports, output.as_deref(), !no_artifacts);
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::ListForms => {
            let registry = FormRegistry::build(&config.forms_dir(), &config.templates_dir())?;
            if registry.is_empty() {
                println!("No forms available.");
            } else {
                for form in registry.available() {
                    let template = if form.has_manual_template {
                        "template"
                    } else {
                        "no template"
                    };
                    println!("{}  {}  ({template})", form.id, form.name);
                }
            }
        }
        Commands::TestConnection => {
            let provider = create_provider(&config.provider)?;
            if provider.test_connection() {
                info!("provider is reachable");
                println!("ok");
            } else {
                println!("unreachable");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
