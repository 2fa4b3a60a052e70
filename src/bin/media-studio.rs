use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use media_studio::{
    ApiKey, Artifact, AspectRatio, Env, GenerationRequest, GoogleGenAi, JobEvent, MediaPayload,
    Resolution, Studio, StudioConfig,
};
use tracing_subscriber::Layer as _;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Parser)]
#[command(name = "media-studio")]
#[command(about = "Generate images and videos with Imagen, Gemini and Veo")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dotenv file consulted before the process environment
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an image from a prompt
    Image {
        prompt: String,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long, default_value = "1:1")]
        aspect_ratio: AspectRatio,
        #[arg(long)]
        negative_prompt: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },

    /// Edit an existing image
    Edit {
        prompt: String,
        /// Image to edit
        #[arg(long)]
        image: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long)]
        model: Option<String>,
    },

    /// Generate a video, optionally starting from an image
    Video {
        prompt: String,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long, default_value = "16:9")]
        aspect_ratio: AspectRatio,
        #[arg(long)]
        resolution: Option<Resolution>,
        #[arg(long)]
        negative_prompt: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },

    /// Continue a previously generated video
    Extend {
        prompt: String,
        /// Video to continue
        #[arg(long)]
        video: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long)]
        model: Option<String>,
    },

    /// Check that the configured api key is accepted
    ValidateKey,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let config = match cli.config.as_deref() {
        Some(path) => StudioConfig::load(path).await?,
        None => StudioConfig::default(),
    };
    let env = match cli.dotenv.as_deref() {
        Some(path) => Env::load_dotenv(path).await?,
        None => Env::default(),
    };

    let backend = GoogleGenAi::from_config(&config)?;
    let studio = Studio::new(Arc::new(backend), config.poll.policy());

    if let Commands::ValidateKey = cli.command {
        let credential = config.api_key(&env).unwrap_or_else(|_| ApiKey::new(""));
        let validation = studio.validate_key(&credential).await?;
        println!("{}", serde_json::to_string(&validation)?);
        if !validation.valid {
            std::process::exit(1);
        }
        return Ok(());
    }

    let credential = config.api_key(&env)?;
    let (request, out) = build_request(cli.command).await?;

    let artifact = if request.target == media_studio::MediaTarget::Image {
        if request.is_edit() {
            studio.edit_image(&credential, &request).await
        } else {
            studio.generate_image(&credential, &request).await
        }
    } else {
        run_video(&studio, credential, request).await
    };

    match artifact {
        Ok(artifact) => {
            let out = if out.extension().is_none() {
                out.with_extension(artifact.file_extension())
            } else {
                out
            };
            tokio::fs::write(&out, &artifact.data).await?;
            if let Some(text) = artifact.text.as_deref() {
                eprintln!("{text}");
            }
            println!("{}", out.display());
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err.user_message());
            std::process::exit(1);
        }
    }
}

async fn run_video(
    studio: &Studio,
    credential: ApiKey,
    request: GenerationRequest,
) -> media_studio::Result<Artifact> {
    let mut job = studio.run_job(credential, request);
    let cancel = job.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut result = Err(media_studio::StudioError::InvalidResponse(
        "job ended without a result".to_string(),
    ));
    while let Some(event) = job.next().await {
        match event {
            JobEvent::Submitted { operation } => {
                tracing::info!(operation = %operation.name, "video submitted");
            }
            JobEvent::Polling { attempt, .. } => {
                tracing::info!(attempt, "still generating");
            }
            JobEvent::Succeeded { artifact } => {
                result = Ok(artifact);
            }
            JobEvent::Failed { failure } => {
                eprintln!("{} ({})", failure.message, failure.kind);
                std::process::exit(1);
            }
        }
    }
    ctrl_c.abort();
    result
}

async fn build_request(
    command: Commands,
) -> media_studio::Result<(GenerationRequest, PathBuf)> {
    let (mut request, model, out) = match command {
        Commands::Image {
            prompt,
            out,
            aspect_ratio,
            negative_prompt,
            model,
        } => {
            let mut request = GenerationRequest::image(prompt).with_aspect_ratio(aspect_ratio);
            if let Some(negative) = negative_prompt {
                request = request.with_negative_prompt(negative);
            }
            (request, model, out)
        }
        Commands::Edit {
            prompt,
            image,
            out,
            model,
        } => {
            let image = read_media(&image).await?;
            (GenerationRequest::edit(prompt, image), model, out)
        }
        Commands::Video {
            prompt,
            out,
            image,
            aspect_ratio,
            resolution,
            negative_prompt,
            model,
        } => {
            let mut request = GenerationRequest::video(prompt).with_aspect_ratio(aspect_ratio);
            if let Some(image) = image {
                request = request.with_seed_image(read_media(&image).await?);
            }
            if let Some(resolution) = resolution {
                request = request.with_resolution(resolution);
            }
            if let Some(negative) = negative_prompt {
                request = request.with_negative_prompt(negative);
            }
            (request, model, out)
        }
        Commands::Extend {
            prompt,
            video,
            out,
            model,
        } => {
            let video = read_media(&video).await?;
            let previous = Artifact::new(video.mime_type, video.data);
            (GenerationRequest::extend(&previous, prompt)?, model, out)
        }
        Commands::ValidateKey => {
            return Err(media_studio::StudioError::InvalidInput(
                "validate-key does not generate media".to_string(),
            ));
        }
    };
    if let Some(model) = model {
        request = request.with_model(model);
    }
    Ok((request, out))
}

async fn read_media(path: &Path) -> media_studio::Result<MediaPayload> {
    let data = tokio::fs::read(path).await?;
    Ok(MediaPayload::new(mime_for_path(path), data))
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

fn init_tracing(json_logs: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}
