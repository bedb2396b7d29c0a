use clap::{Parser, Subcommand};
use cli::BatchConfig;
use color_eyre::eyre::{eyre, Result};
use lesion::{remove_hair_folder, FeatureAggregator, FeatureGroup, HairRemovalConfig};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract features for every new image and append them to the feature table
    Extract {
        /// Path to the TOML or JSON batch configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Remove hair from every image of a directory
    RemoveHair {
        /// Directory of input images
        #[arg(short, long)]
        input: PathBuf,
        /// Directory the cleaned images are written to
        #[arg(short, long)]
        output: PathBuf,
        /// Batch configuration whose `lesion.hair` section is used
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the JSON schema of the batch configuration
    Schema,
    /// List the feature groups with their columns
    Groups,
    /// Write a default batch configuration (format from the extension)
    InitConfig {
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Extract { config } => extract(config)?,
        Commands::RemoveHair { input, output, config } => remove_hair(input, output, config.as_deref())?,
        Commands::Schema => println!("{}", BatchConfig::json_schema()?),
        Commands::Groups => list_groups(),
        Commands::InitConfig { output } => {
            if output.exists() {
                return Err(eyre!("{} already exists", output.display()));
            }
            BatchConfig::default().to_file(output)?;
            info!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

fn extract(config_path: &Path) -> Result<()> {
    let config = BatchConfig::from_file(config_path)?;
    info!("Extracting features from {}", config.image_dir.display());

    let aggregator = FeatureAggregator::from_config(&config.lesion)?;
    let report = aggregator.run(&config.batch_inputs())?;

    info!(
        "Processed {} images ({} failed, {} unreadable, {} already present); {} rows in {}",
        report.processed,
        report.failed,
        report.unreadable,
        report.skipped_existing,
        report.total_rows,
        config.output_csv.display()
    );
    Ok(())
}

fn remove_hair(input: &Path, output: &Path, config_path: Option<&Path>) -> Result<()> {
    let hair_config = match config_path {
        Some(path) => BatchConfig::from_file(path)?.lesion.hair,
        None => HairRemovalConfig::default(),
    };

    info!("Processing images from: {}", input.display());
    info!("Saving results to: {}", output.display());

    let summary = remove_hair_folder(input, output, &hair_config)?;

    info!("Total image files found: {}", summary.total);
    info!("Images where inpainting was applied: {}", summary.inpainted);
    info!("Images where original was copied: {}", summary.unchanged);
    info!("Errors during processing: {}", summary.errors);
    Ok(())
}

fn list_groups() {
    for group in FeatureGroup::all() {
        println!("{group}: {}", group.description());
        println!("    {}", group.columns().join(", "));
    }
}
