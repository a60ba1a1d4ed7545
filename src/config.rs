//! Service configuration.
//!
//! Everything the service needs to know at runtime lives in one immutable
//! [`ServiceConfig`], built once at startup through [`ServiceConfigBuilder`]
//! and shared behind an `Arc`. Request handlers read it; nothing writes it.
//!
//! Platform-specific details (where the Tesseract binary lives, which PDFium
//! library to bind) are resolved here, once, so the request path never
//! inspects the host OS.

use crate::error::MedocrError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Provider name that routes extraction through the Gemini REST API.
pub const GEMINI_PROVIDER: &str = "gemini";

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";

/// Default base URL of the Generative Language API.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Where the Tesseract installer puts the binary on Windows.
pub const WINDOWS_TESSERACT_PATH: &str = "C:/Program Files/Tesseract-OCR/tesseract.exe";

/// Resolve the Tesseract command for the current platform.
///
/// Windows installs do not add Tesseract to `PATH`, so the installer's default
/// location is used there; everywhere else the binary is looked up on `PATH`.
pub fn default_tesseract_command() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(WINDOWS_TESSERACT_PATH)
    } else {
        PathBuf::from("tesseract")
    }
}

/// Configuration for the extraction service.
///
/// Built via [`ServiceConfig::builder()`]. `Default` yields the documented
/// defaults but no API key, so it does not pass [`ServiceConfigBuilder::build`]
/// validation for the Gemini provider on its own.
///
/// # Example
/// ```rust
/// use medocr::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .api_key("test-key")
///     .dpi(300)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gemini-1.5-flash-latest");
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Socket the HTTP server binds. Default: `0.0.0.0:5000`.
    pub bind_addr: SocketAddr,

    /// Extraction provider: `"gemini"` (default) or any provider name known to
    /// `edgequake-llm` (`"openai"`, `"anthropic"`, `"ollama"`, …).
    pub provider: String,

    /// Model identifier passed to the provider. Default: `gemini-1.5-flash-latest`.
    pub model: String,

    /// Gemini API key. Required when `provider == "gemini"`.
    pub api_key: Option<String>,

    /// Base URL of the Gemini REST API. Overridable for proxies and tests.
    pub api_base_url: String,

    /// Sampling temperature. `None` leaves the provider default.
    pub temperature: Option<f32>,

    /// Output token cap. `None` leaves the provider default.
    pub max_output_tokens: Option<usize>,

    /// Tesseract executable. Default: [`default_tesseract_command`].
    pub tesseract_cmd: PathBuf,

    /// Tesseract language pack(s), e.g. `eng` or `eng+deu`. Default: `eng`.
    pub ocr_language: String,

    /// Pages recognised in parallel. Default: 1.
    ///
    /// Output order is page order regardless of this value.
    pub ocr_concurrency: usize,

    /// Rendering DPI for PDF pages. Range: 72–600. Default: 200.
    pub dpi: u32,

    /// Cap on the long edge of a rendered page, in pixels. Default: 5000.
    ///
    /// Keeps an oversized page (posters, A0 scans) from allocating hundreds of
    /// megabytes of bitmap before Tesseract ever sees it.
    pub max_rendered_pixels: u32,

    /// Explicit path to the PDFium shared library. `None` binds the system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// Directory for staged uploads. `None` uses the OS temp directory.
    pub scratch_dir: Option<PathBuf>,

    /// Largest accepted request body, in bytes. Default: 25 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000),
            provider: GEMINI_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_base_url: DEFAULT_GEMINI_API_BASE.to_string(),
            temperature: None,
            max_output_tokens: None,
            tesseract_cmd: default_tesseract_command(),
            ocr_language: "eng".to_string(),
            ocr_concurrency: 1,
            dpi: 200,
            max_rendered_pixels: 5000,
            pdfium_library_path: None,
            scratch_dir: None,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind_addr", &self.bind_addr)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("ocr_language", &self.ocr_language)
            .field("ocr_concurrency", &self.ocr_concurrency)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("scratch_dir", &self.scratch_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether extraction goes through the Gemini REST backend.
    pub fn uses_gemini(&self) -> bool {
        self.provider.eq_ignore_ascii_case(GEMINI_PROVIDER)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.config.provider = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = Some(n);
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_concurrency = n.max(1);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, MedocrError> {
        let c = &self.config;
        if c.uses_gemini() && c.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(MedocrError::MissingApiKey {
                provider: c.provider.clone(),
                env_var: GEMINI_API_KEY_ENV,
            });
        }
        self.build_ocr_only()
    }

    /// Build without requiring model credentials.
    ///
    /// For OCR-only runs that never construct an extraction backend.
    pub fn build_ocr_only(self) -> Result<ServiceConfig, MedocrError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(MedocrError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.model.trim().is_empty() {
            return Err(MedocrError::InvalidConfig("model must not be empty".into()));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(MedocrError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(MedocrError::InvalidConfig(
                "max upload size must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}
