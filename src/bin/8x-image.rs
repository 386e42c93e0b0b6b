use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use eightx::image_gen::{
    gemini_request_body, openai_api_url, openai_base_from_env, resolve_api_key,
    save_bytes, save_flattened_png, GeminiClient, ImageError, InputImage, OpenAiClient,
    OpenAiRequest, Resolution,
};

#[derive(Parser)]
#[command(name = "8x-image", about = "Generate a single image and save it as PNG", version)]
struct Cli {
    /// Log request details to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    provider: Provider,
}

#[derive(Subcommand)]
enum Provider {
    /// Nano Banana Pro (Gemini 3 Pro Image)
    Gemini {
        /// Image description/prompt
        #[arg(long, short)]
        prompt: String,

        /// Output filename
        #[arg(long, short)]
        filename: PathBuf,

        /// Input image path for editing
        #[arg(long, short)]
        input_image: Option<PathBuf>,

        /// Output resolution: 1K, 2K or 4K
        #[arg(long, short, default_value = "1K")]
        resolution: Resolution,

        /// Gemini API key (default: $GEMINI_API_KEY)
        #[arg(long, short = 'k')]
        api_key: Option<String>,
    },

    /// OpenAI Images API
    Openai {
        /// Image description/prompt
        #[arg(long, short)]
        prompt: String,

        /// Output filename
        #[arg(long, short)]
        filename: PathBuf,

        #[arg(long, default_value = "gpt-image-1.5")]
        model: String,

        #[arg(long, default_value = "1024x1024")]
        size: String,

        #[arg(long, default_value = "high", value_parser = ["high", "standard"])]
        quality: String,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 180)]
        timeout: u64,

        /// OpenAI API key (default: $OPENAI_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },
}

/// Failures that map to a specific exit status.
#[derive(Debug)]
enum ImageExit {
    MissingOpenAiKey,
}

impl ImageExit {
    fn exit_code(&self) -> u8 {
        match self {
            ImageExit::MissingOpenAiKey => 2,
        }
    }
}

impl std::fmt::Display for ImageExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageExit::MissingOpenAiKey => f.write_str("missing OPENAI_API_KEY (or --api-key)"),
        }
    }
}

impl std::error::Error for ImageExit {}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.provider) {
        Ok(saved) => {
            let shown = std::fs::canonicalize(&saved).unwrap_or(saved);
            println!("Image saved: {}", shown.display());
            ExitCode::SUCCESS
        }
        Err(e) => match e.downcast_ref::<ImageExit>() {
            Some(exit) => {
                eprintln!("{}", exit);
                ExitCode::from(exit.exit_code())
            }
            None => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn run(provider: Provider) -> anyhow::Result<PathBuf> {
    match provider {
        Provider::Gemini {
            prompt,
            filename,
            input_image,
            resolution,
            api_key,
        } => run_gemini(&prompt, &filename, input_image.as_deref(), resolution, api_key.as_deref()),
        Provider::Openai {
            prompt,
            filename,
            model,
            size,
            quality,
            timeout,
            api_key,
        } => {
            let request = OpenAiRequest {
                model,
                prompt,
                size,
                quality,
            };
            run_openai(&request, &filename, timeout, api_key.as_deref())
        }
    }
}

fn run_gemini(
    prompt: &str,
    filename: &Path,
    input_image: Option<&Path>,
    resolution: Resolution,
    api_key: Option<&str>,
) -> anyhow::Result<PathBuf> {
    let api_key = resolve_api_key(api_key, "GEMINI_API_KEY")?;

    let input = input_image
        .map(|path| {
            InputImage::load(path)
                .with_context(|| format!("loading input image {}", path.display()))
        })
        .transpose()?;
    let resolution = resolution.for_input(input.as_ref().map(|i| (i.width, i.height)));

    let client = GeminiClient::new(api_key)?;
    let body = gemini_request_body(prompt, resolution, input.as_ref());
    let output = client.generate(&body).context("generating image")?;

    for text in &output.texts {
        println!("Model response: {}", text);
    }

    if output.images.is_empty() {
        return Err(ImageError::NoImage.into());
    }
    // Later images overwrite earlier ones; the last one is kept.
    for image in &output.images {
        save_flattened_png(image, filename)
            .with_context(|| format!("saving image to {}", filename.display()))?;
    }
    Ok(filename.to_path_buf())
}

fn run_openai(
    request: &OpenAiRequest,
    filename: &Path,
    timeout: u64,
    api_key: Option<&str>,
) -> anyhow::Result<PathBuf> {
    let api_key =
        resolve_api_key(api_key, "OPENAI_API_KEY").map_err(|_| ImageExit::MissingOpenAiKey)?;

    let url = openai_api_url(openai_base_from_env().as_deref());
    let client = OpenAiClient::new(api_key, url, Duration::from_secs(timeout))?;
    let bytes = client.generate(request)?;
    save_bytes(&bytes, filename)
        .with_context(|| format!("saving image to {}", filename.display()))?;
    Ok(filename.to_path_buf())
}
