use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use worth_core::{NormPolicy, Predictor, ReferenceGallery, DEFAULT_TOP_K};
use worth_models::{AlignMode, ModelOptions, OnnxEmbedder, OnnxFaceNormalizer};

#[derive(Parser)]
#[command(name = "worth", about = "Estimate net worth from a face photo")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full prediction pipeline on a local image
    Predict {
        /// Image file (any format the decoder understands)
        image: PathBuf,
        /// Reference gallery JSON
        #[arg(short, long, default_value = "data/reference_data.json")]
        gallery: PathBuf,
        /// Directory holding det_10g.onnx and the embedding model
        #[arg(short, long, default_value = "models")]
        model_dir: PathBuf,
        /// Embedding model file, overriding the one in --model-dir
        #[arg(long)]
        embedder: Option<PathBuf>,
        /// Number of gallery matches to blend
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Face crop size fed to the embedder
        #[arg(long, default_value_t = 160)]
        image_size: u32,
        /// Border around the face in crop pixels
        #[arg(long, default_value_t = 0)]
        margin: u32,
        /// Crop strategy: "crop" or "landmarks"
        #[arg(long, default_value = "crop")]
        align: AlignMode,
    },
    /// Validate a gallery and print its summary
    Gallery {
        /// Reference gallery JSON
        path: PathBuf,
        /// Norm policy: "trust", "renormalize" or "strict"
        #[arg(long, default_value = "trust")]
        norm_policy: NormPolicy,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Predict {
            image,
            gallery,
            model_dir,
            embedder,
            top_k,
            image_size,
            margin,
            align,
        } => {
            let gallery = Arc::new(
                ReferenceGallery::load(&gallery, NormPolicy::Trust)
                    .context("loading reference gallery")?,
            );

            let options = ModelOptions {
                model_dir,
                image_size,
                margin,
                align,
                ..ModelOptions::default()
            };
            let normalizer = OnnxFaceNormalizer::load(&options).context("loading face detector")?;
            let embedder = match embedder {
                Some(path) => OnnxEmbedder::from_path(&path, &options),
                None => OnnxEmbedder::load(&options),
            }
            .context("loading face embedder")?;

            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;

            let mut predictor = Predictor::new(normalizer, embedder, gallery).with_top_k(top_k);
            let result = predictor.predict(&bytes)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Gallery { path, norm_policy } => {
            let gallery = ReferenceGallery::load(&path, norm_policy)
                .with_context(|| format!("loading {}", path.display()))?;
            let stats = gallery.norm_stats();
            let summary = serde_json::json!({
                "path": path.display().to_string(),
                "entries": gallery.len(),
                "embedding_dim": gallery.dim(),
                "fingerprint": gallery.fingerprint(),
                "norm": stats,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
