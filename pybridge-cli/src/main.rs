// pybridge: CLI driver for the extension-module glue generator.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use pybridge_codegen::config::GenConfig;

#[derive(Parser)]
#[command(name = "pybridge", version, about = "Generate Python extension-module glue from C/C++ API declarations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the extension-module source from scanned declarations.
    Generate {
        /// Path to pybridge.toml.
        #[arg(long, default_value = "pybridge.toml")]
        config: PathBuf,
        /// Override the extension module name.
        #[arg(long)]
        module: Option<String>,
        /// Restrict generation to this C++ namespace.
        #[arg(long)]
        namespace: Option<String>,
        /// Override the output file path.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Header files the generated source should include.
        headers: Vec<String>,
        /// Include directory forwarded to the header scanner.
        #[arg(long = "include-dir")]
        include_dirs: Vec<String>,
        /// Only wrap declarations recorded under this path prefix.
        #[arg(long = "whitelist")]
        whitelist_paths: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pybridge=info,pybridge_codegen=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Generate {
            config: config_path,
            module,
            namespace,
            output,
            headers,
            include_dirs,
            whitelist_paths,
        } => {
            let mut config = GenConfig::load(&config_path)
                .with_context(|| format!("failed to load {}", config_path.display()))?;
            if let Some(module) = module {
                config.module.name = module;
            }
            if let Some(namespace) = namespace {
                config.module.cpp_namespace = Some(namespace);
            }
            if let Some(output) = output {
                config.paths.output = output.display().to_string();
            }
            if !headers.is_empty() {
                config.scan.headers = headers;
            }
            config.scan.include_dirs.extend(include_dirs);
            config.scan.whitelist_paths.extend(whitelist_paths);

            let config_dir = config_path.parent().unwrap_or(Path::new("."));
            let summary = pybridge_codegen::run_with_config(&config, config_dir)
                .with_context(|| format!("generation failed for module {:?}", config.module.name))?;
            info!(
                output = %summary.output.display(),
                functions = summary.functions,
                classes = summary.classes,
                enums = summary.enums,
                exceptions = summary.exceptions,
                skipped = summary.skipped,
                warnings = summary.warnings.len(),
                "wrote extension module source"
            );
        }
    }
    Ok(())
}
