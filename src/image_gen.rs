//! Image generation through the Gemini and OpenAI image APIs.
//!
//! Each request is a single blocking POST. The result is written as one PNG.

use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const GEMINI_MODEL: &str = "gemini-3-pro-image-preview";
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";
const GEMINI_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("No API key provided. Set {0} or pass --api-key.")]
    MissingApiKey(&'static str),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{provider} HTTP {status}: {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid JSON response: {0}")]
    InvalidResponse(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("No image was generated in the response.")]
    NoImage,

    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ImageError>;

/// Output size requested from Gemini.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    OneK,
    TwoK,
    FourK,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::OneK => "1K",
            Resolution::TwoK => "2K",
            Resolution::FourK => "4K",
        }
    }

    /// An edit of a large input image keeps its size unless a size was asked for.
    pub fn for_input(self, input_dims: Option<(u32, u32)>) -> Self {
        match (self, input_dims) {
            (Resolution::OneK, Some((w, h))) => {
                let max_dim = w.max(h);
                if max_dim >= 3000 {
                    Resolution::FourK
                } else if max_dim >= 1500 {
                    Resolution::TwoK
                } else {
                    Resolution::OneK
                }
            }
            (requested, _) => requested,
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1K" => Ok(Resolution::OneK),
            "2K" => Ok(Resolution::TwoK),
            "4K" => Ok(Resolution::FourK),
            other => Err(format!("invalid resolution '{}': use 1K, 2K or 4K", other)),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `--api-key` if given, otherwise the environment variable.
pub fn resolve_api_key(provided: Option<&str>, env_var: &'static str) -> Result<String> {
    provided
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok())
        .filter(|key| !key.is_empty())
        .ok_or(ImageError::MissingApiKey(env_var))
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn decode_b64(data: &str) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(data.as_bytes())?)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

/// An image sent along with the prompt for editing.
#[derive(Debug, Clone)]
pub struct InputImage {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl InputImage {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let format = ImageFormat::from_path(path).or_else(|_| image::guess_format(&data))?;
        let decoded = image::load_from_memory_with_format(&data, format)?;
        Ok(Self {
            mime_type: format.to_mime_type().to_string(),
            width: decoded.width(),
            height: decoded.height(),
            data,
        })
    }
}

pub fn gemini_request_body(
    prompt: &str,
    resolution: Resolution,
    input_image: Option<&InputImage>,
) -> Value {
    let mut parts = Vec::new();
    if let Some(image) = input_image {
        parts.push(json!({
            "inline_data": {
                "mime_type": image.mime_type,
                "data": base64::engine::general_purpose::STANDARD.encode(&image.data),
            }
        }));
    }
    parts.push(json!({ "text": prompt }));

    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": { "imageSize": resolution.as_str() },
        }
    })
}

/// Parts of a Gemini answer: text commentary and decoded images, in order.
#[derive(Debug, Default)]
pub struct GeminiOutput {
    pub texts: Vec<String>,
    pub images: Vec<Vec<u8>>,
}

pub fn parse_gemini_response(response: &Value) -> Result<GeminiOutput> {
    let mut output = GeminiOutput::default();
    let parts = response
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.pointer("/content/parts"))
        .filter_map(Value::as_array)
        .flatten();

    for part in parts {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            output.texts.push(text.to_string());
            continue;
        }
        let inline = part.get("inlineData").or_else(|| part.get("inline_data"));
        if let Some(data) = inline.and_then(|d| d.get("data")).and_then(Value::as_str) {
            output.images.push(decode_b64(data)?);
        }
    }
    Ok(output)
}

/// Write `bytes` as an RGB PNG; transparency is flattened onto white.
pub fn save_flattened_png(bytes: &[u8], path: &Path) -> Result<()> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = if decoded.color().has_alpha() {
        flatten_on_white(&decoded)
    } else {
        decoded.to_rgb8()
    };
    ensure_parent(path)?;
    rgb.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut out = RgbImage::from_pixel(rgba.width(), rgba.height(), Rgb([255, 255, 255]));
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u32::from(pixel[3]);
        let blended = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blended(pixel[0]), blended(pixel[1]), blended(pixel[2])]));
    }
    out
}

pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, GEMINI_API_BASE)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(GEMINI_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn generate(&self, body: &Value) -> Result<GeminiOutput> {
        let url = format!("{}/models/{}:generateContent", self.base_url, GEMINI_MODEL);
        debug!(%url, "gemini request");
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()?;
        let data = read_json_response("Gemini", response)?;
        parse_gemini_response(&data)
    }
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

/// `<base>/v1/images/generations`, without doubling an existing `/v1`.
pub fn openai_api_url(base: Option<&str>) -> String {
    let base = base.unwrap_or(OPENAI_DEFAULT_BASE).trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/images/generations", base)
    } else {
        format!("{}/v1/images/generations", base)
    }
}

/// Base URL from `OPENAI_BASE_URL`, then `OPENAI_API_BASE`.
pub fn openai_base_from_env() -> Option<String> {
    ["OPENAI_BASE_URL", "OPENAI_API_BASE"]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
pub struct OpenAiRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub quality: String,
}

impl OpenAiRequest {
    pub fn payload(&self) -> Value {
        json!({
            "model": self.model,
            "prompt": self.prompt,
            "size": self.size,
            "quality": self.quality,
            "n": 1,
            "response_format": "b64_json",
        })
    }
}

pub fn parse_openai_response(response: &Value) -> Result<Vec<u8>> {
    let b64 = response
        .pointer("/data/0/b64_json")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    match b64 {
        Some(data) => decode_b64(data),
        None => Err(ImageError::UnexpectedResponse(truncate(
            &serde_json::to_string_pretty(response).unwrap_or_default(),
            1200,
        ))),
    }
}

pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, api_key, url })
    }

    pub fn generate(&self, request: &OpenAiRequest) -> Result<Vec<u8>> {
        debug!(url = %self.url, model = %request.model, "openai request");
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request.payload())
            .send()?;
        let data = read_json_response("OpenAI", response)?;
        parse_openai_response(&data)
    }
}

/// Write the raw image bytes returned by OpenAI.
pub fn save_bytes(bytes: &[u8], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn read_json_response(
    provider: &'static str,
    response: reqwest::blocking::Response,
) -> Result<Value> {
    let status = response.status();
    let raw = response.bytes()?;

    if !status.is_success() {
        let body = match serde_json::from_slice::<Value>(&raw) {
            Ok(data) => truncate(&serde_json::to_string_pretty(&data).unwrap_or_default(), 1200),
            Err(_) => truncate(&String::from_utf8_lossy(&raw), 300),
        };
        return Err(ImageError::Http {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_slice(&raw)
        .map_err(|_| ImageError::InvalidResponse(truncate(&String::from_utf8_lossy(&raw), 300)))
}
