//! Upload pipeline: validate, stage, analyze, clean up.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::analyzer::{AnalyzerHandle, GenerationOptions};
use crate::document::{DocumentPolicy, UploadedDocument};
use crate::error::PipelineError;
use crate::scoped_file::ScopedTempFile;

/// Successful analysis of one document.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub id: String,
    pub file_name: String,
    pub size_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    pub model: String,
    /// Answer as returned by the analyzer; this is what gets downloaded.
    pub text: String,
    /// `text` rendered from markdown for display.
    pub html: String,
    pub elapsed_ms: u64,
}

/// Orchestrates a single upload-analyze-cleanup run.
pub struct UploadPipeline {
    analyzers: Arc<AnalyzerHandle>,
    policy: DocumentPolicy,
    tmp_dir: PathBuf,
}

impl UploadPipeline {
    pub fn new(analyzers: Arc<AnalyzerHandle>, policy: DocumentPolicy, tmp_dir: PathBuf) -> Self {
        Self {
            analyzers,
            policy,
            tmp_dir,
        }
    }

    /// Run the pipeline for one submission.
    ///
    /// The prompt is forwarded exactly as given, empty included. Exactly one
    /// temp file is created once the analyzer is available, and it is gone by
    /// the time this returns.
    pub async fn run(
        &self,
        document: Option<UploadedDocument>,
        prompt: &str,
    ) -> Result<AnalysisReport, PipelineError> {
        let started = Instant::now();

        let document = match document {
            Some(doc) if !doc.is_empty() => doc,
            _ => return Err(PipelineError::MissingDocument),
        };
        document.validate(&self.policy)?;

        info!("Loading analyzer for {}", document.file_name);
        let analyzer = self.analyzers.acquire().await?;

        let page_count = document.page_count();
        let mime_type = document.analysis_mime_type().to_string();
        let UploadedDocument {
            file_name, bytes, ..
        } = document;
        let size_bytes = bytes.len();

        info!("Preparing {} ({} bytes)", file_name, size_bytes);
        let staged = ScopedTempFile::create(&self.tmp_dir, bytes)
            .await
            .map_err(|e| PipelineError::analysis(format!("Failed to stage upload: {}", e)))?;

        info!("Sending {} to {}", file_name, analyzer.name());
        let result = analyzer
            .analyze(
                staged.path(),
                &mime_type,
                prompt,
                &GenerationOptions::deterministic(),
            )
            .await;
        staged.release().await;

        let text = result.map_err(|e| {
            error!("Analysis of {} failed: {}", file_name, e);
            e
        })?;

        let report = AnalysisReport {
            id: Uuid::new_v4().to_string(),
            file_name,
            size_bytes,
            page_count,
            model: analyzer.model().to_string(),
            html: crate::ui::render_markdown(&text),
            text,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Analysis {} complete: {} chars in {} ms",
            report.id,
            report.text.len(),
            report.elapsed_ms
        );
        Ok(report)
    }
}
