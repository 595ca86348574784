use clap::{Args, Parser, Subcommand};
use snapclass_classifiers::ClassifierConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "snapclass")]
#[command(author, version, about = "Browser-based image classification demo")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the demo server with web UI
    Start(StartArgs),

    /// Classify image files from the command line
    Classify(ClassifyArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// Listen port
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1")]
    pub address: String,

    /// Configuration file path
    #[arg(short, long, default_value = "./snapclass.yaml", env = "SNAPCLASS_CONFIG")]
    pub config: String,

    /// Primary model identifier
    #[arg(short, long)]
    pub model: Option<String>,

    /// Fallback model identifier ("none" disables the fallback)
    #[arg(long)]
    pub fallback_model: Option<String>,

    /// Load the model at startup instead of on first use
    #[arg(long)]
    pub eager: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    /// Image files to classify
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Primary model identifier
    #[arg(short, long)]
    pub model: Option<String>,

    /// Number of predictions to show (defaults to the configured value)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "./snapclass.yaml", env = "SNAPCLASS_CONFIG")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl ClassifyArgs {
    /// Apply the flags that were given on top of file configuration
    pub fn apply_overrides(&self, config: &mut ClassifierConfig) {
        if let Some(model) = &self.model {
            config.primary_model = model.clone();
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
    }
}
