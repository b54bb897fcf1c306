//! Document analyzer abstraction.
//!
//! Defines the [`DocumentAnalyzer`] trait that the upload pipeline talks to,
//! the fixed [`GenerationOptions`], and [`AnalyzerHandle`], the process-wide
//! cached client built once in `main` and shared by every request.

pub mod gemini;

use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{SecretStore, Settings, GEMINI_API_KEY};
use crate::error::PipelineError;

/// Decoding options sent with every generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl GenerationOptions {
    /// Long answers, greedy decoding. Used for every submission.
    pub const fn deterministic() -> Self {
        Self {
            max_output_tokens: 4000,
            temperature: 0.0,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::deterministic()
    }
}

/// Async trait implemented by each analysis backend.
#[async_trait::async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Submit the file at `file` together with `prompt` and return the answer text.
    async fn analyze(
        &self,
        file: &Path,
        mime_type: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, PipelineError>;
}

type AnalyzerInit =
    Box<dyn Fn(&str) -> Result<Arc<dyn DocumentAnalyzer>, PipelineError> + Send + Sync>;

/// Lazily initialized, reusable analyzer client.
///
/// The first successful [`acquire`](Self::acquire) builds the client from the
/// stored credential; later calls return the same instance. A failed
/// initialization is not cached.
pub struct AnalyzerHandle {
    secrets: SecretStore,
    credential_name: String,
    init: AnalyzerInit,
    cell: OnceCell<Arc<dyn DocumentAnalyzer>>,
}

impl AnalyzerHandle {
    pub fn new<F>(secrets: SecretStore, credential_name: impl Into<String>, init: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn DocumentAnalyzer>, PipelineError> + Send + Sync + 'static,
    {
        Self {
            secrets,
            credential_name: credential_name.into(),
            init: Box::new(init),
            cell: OnceCell::new(),
        }
    }

    /// Handle that builds a [`gemini::GeminiClient`] from `GEMINI_API_KEY`.
    pub fn gemini(secrets: SecretStore, settings: &Settings) -> Self {
        let model = settings.model.clone();
        let api_base = settings.api_base.clone();
        Self::new(secrets, GEMINI_API_KEY, move |credential| {
            let client = gemini::GeminiClient::initialize(credential, &model, &api_base)?;
            Ok(Arc::new(client) as Arc<dyn DocumentAnalyzer>)
        })
    }

    pub async fn acquire(&self) -> Result<Arc<dyn DocumentAnalyzer>, PipelineError> {
        self.cell
            .get_or_try_init(|| async {
                let credential = self.secrets.get_credential(&self.credential_name)?;
                let analyzer = (self.init)(&credential).map_err(|e| {
                    warn!("Analyzer initialization failed: {}", e);
                    e
                })?;
                info!(
                    "Analyzer initialized: {} (model={})",
                    analyzer.name(),
                    analyzer.model()
                );
                Ok::<_, PipelineError>(analyzer)
            })
            .await
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;

    fn secrets() -> SecretStore {
        SecretStore::from_pairs([(GEMINI_API_KEY, "test-key")])
    }

    #[test]
    fn test_deterministic_options() {
        let options = GenerationOptions::default();
        assert_eq!(options.max_output_tokens, 4000);
        assert_eq!(options.temperature, 0.0);
    }

    #[tokio::test]
    async fn test_acquire_initializes_once() {
        let (handle, inits) = handle_for(FakeAnalyzer::answering("ok"), secrets());
        assert!(!handle.is_initialized());

        let first = handle.acquire().await.unwrap();
        let second = handle.acquire().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(handle.is_initialized());
    }

    #[tokio::test]
    async fn test_missing_credential_is_configuration_error() {
        let (handle, inits) = handle_for(FakeAnalyzer::answering("ok"), SecretStore::default());
        let err = handle.acquire().await.err().unwrap();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert_eq!(inits.load(Ordering::SeqCst), 0);
        assert!(!handle.is_initialized());
    }

    #[tokio::test]
    async fn test_failed_init_is_retried() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = attempts.clone();
        let handle = AnalyzerHandle::new(secrets(), GEMINI_API_KEY, move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PipelineError::configuration("transient"))
            } else {
                Ok(FakeAnalyzer::answering("ok") as Arc<dyn DocumentAnalyzer>)
            }
        });

        assert!(handle.acquire().await.is_err());
        assert!(handle.acquire().await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gemini_handle_rejects_bad_base_url() {
        let settings = Settings {
            api_base: "not a url".to_string(),
            ..Settings::default()
        };
        let handle = AnalyzerHandle::gemini(secrets(), &settings);
        assert!(matches!(
            handle.acquire().await.err().unwrap(),
            PipelineError::Configuration(_)
        ));
    }
}
