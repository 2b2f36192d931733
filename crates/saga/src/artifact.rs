//! Artifact generator: render, upload and link one label PDF per pallet.

use std::sync::Arc;

use common::Identifier;
use domain::LabelData;
use serde::{Deserialize, Serialize};
use store::PalletStore;

use crate::config::SagaConfig;
use crate::error::ArtifactError;
use crate::services::{BlobStorage, PdfRenderer};

/// A rendered and uploaded label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfArtifact {
    pub identifier: Identifier,
    pub url: String,
    pub bytes: Vec<u8>,
    /// Set when the URL could not be written back onto the pallet record.
    pub warning: Option<String>,
}

impl PdfArtifact {
    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef {
            pallet_number: self.identifier.pallet_number.to_string(),
            series: self.identifier.series.to_string(),
            url: self.url.clone(),
        }
    }
}

/// Where a label ended up, without its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub pallet_number: String,
    pub series: String,
    pub url: String,
}

/// Storage object name for a pallet: `20240521/001` becomes `20240521_001.pdf`.
pub fn file_name(identifier: &Identifier) -> String {
    format!("{}.pdf", identifier.pallet_number.file_stem())
}

#[derive(Clone)]
pub struct ArtifactGenerator {
    renderer: Arc<dyn PdfRenderer>,
    storage: Arc<dyn BlobStorage>,
    store: Arc<dyn PalletStore>,
    config: SagaConfig,
}

impl ArtifactGenerator {
    pub fn new(
        renderer: Arc<dyn PdfRenderer>,
        storage: Arc<dyn BlobStorage>,
        store: Arc<dyn PalletStore>,
        config: SagaConfig,
    ) -> Self {
        Self {
            renderer,
            storage,
            store,
            config,
        }
    }

    /// Renders and uploads the label for one identifier, then records the
    /// URL on the pallet.
    ///
    /// Retryable upload failures are retried `artifact_retries` times. A
    /// failed URL write-back only sets [`PdfArtifact::warning`].
    #[tracing::instrument(skip(self, label), fields(pallet_number = %identifier.pallet_number))]
    pub async fn generate(
        &self,
        identifier: &Identifier,
        label: &LabelData,
        bucket: &str,
    ) -> Result<PdfArtifact, ArtifactError> {
        let bytes = self.renderer.render(label).await?;
        let name = file_name(identifier);

        let mut attempt = 0;
        let url = loop {
            attempt += 1;
            match self.storage.upload(bytes.clone(), &name, bucket).await {
                Ok(url) => break url,
                Err(e) if e.is_retryable() && attempt <= self.config.artifact_retries => {
                    tracing::debug!(attempt, error = %e, "retrying label upload");
                    let backoff = self.config.backoff(attempt);
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        };

        let warning = match self.store.update_pdf_url(&identifier.pallet_number, &url).await {
            Ok(()) => None,
            Err(e) => Some(format!(
                "label URL not saved for {}: {e}",
                identifier.pallet_number
            )),
        };

        Ok(PdfArtifact {
            identifier: identifier.clone(),
            url,
            bytes,
            warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InMemoryBlobStorage, InMemoryPdfRenderer};
    use chrono::Utc;
    use domain::{PalletRecordSet, PrintBatch, ProductInfo, ProductType, ProductTypeContext, QcDetails};
    use store::InMemoryPalletStore;

    struct Fixture {
        store: InMemoryPalletStore,
        storage: InMemoryBlobStorage,
        renderer: InMemoryPdfRenderer,
        generator: ArtifactGenerator,
        identifier: Identifier,
        label: LabelData,
    }

    async fn fixture(config: SagaConfig) -> Fixture {
        let store = InMemoryPalletStore::new();
        let storage = InMemoryBlobStorage::new();
        let renderer = InMemoryPdfRenderer::new();
        let generator = ArtifactGenerator::new(
            Arc::new(renderer.clone()),
            Arc::new(storage.clone()),
            Arc::new(store.clone()),
            config,
        );

        let batch = PrintBatch::qc(
            ProductInfo::new("ME6060150", "Cover", ProductType::Standard),
            "5997",
            QcDetails {
                quantity: 10,
                count: 1,
                operator: None,
                context: ProductTypeContext::None,
            },
        );
        let identifier = store.allocate_identifiers(1).await.unwrap().remove(0);
        store
            .insert_records(&PalletRecordSet::build(&batch, &identifier, 0, 10, None, Utc::now()))
            .await
            .unwrap();
        let label = LabelData::for_pallet(&batch, &identifier, 0, 10, 0);

        Fixture {
            store,
            storage,
            renderer,
            generator,
            identifier,
            label,
        }
    }

    #[tokio::test]
    async fn test_generate_uploads_and_links_url() {
        let f = fixture(SagaConfig::immediate()).await;

        let artifact = f
            .generator
            .generate(&f.identifier, &f.label, "qc-labels")
            .await
            .unwrap();

        let name = file_name(&f.identifier);
        assert!(name.ends_with(".pdf") && !name.contains('/'));
        assert!(f.storage.has_object("qc-labels", &name));
        assert!(artifact.bytes.starts_with(b"%PDF"));
        assert_eq!(artifact.warning, None);

        let rows = f.store.get_record(&f.identifier.pallet_number).await.unwrap().unwrap();
        assert_eq!(rows.pallet.pdf_url, Some(artifact.url));
    }

    #[tokio::test]
    async fn test_transient_upload_failures_are_retried() {
        let f = fixture(SagaConfig::immediate()).await;
        f.storage.fail_upload_for(&file_name(&f.identifier), 2);

        assert!(f.generator.generate(&f.identifier, &f.label, "qc-labels").await.is_ok());
        assert_eq!(f.storage.upload_calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let f = fixture(SagaConfig {
            artifact_retries: 1,
            ..SagaConfig::immediate()
        })
        .await;
        f.storage.fail_upload_for(&file_name(&f.identifier), 5);

        let err = f
            .generator
            .generate(&f.identifier, &f.label, "qc-labels")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(f.storage.upload_calls(), 2);
    }

    #[tokio::test]
    async fn test_render_failure_skips_upload() {
        let f = fixture(SagaConfig::immediate()).await;
        f.renderer.fail_for(f.identifier.pallet_number.as_str());

        let err = f
            .generator
            .generate(&f.identifier, &f.label, "qc-labels")
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Render(_)));
        assert_eq!(f.storage.upload_calls(), 0);
    }

    #[tokio::test]
    async fn test_url_write_back_failure_is_a_warning() {
        let f = fixture(SagaConfig::immediate()).await;
        f.store.set_fail_on_update_pdf_url(true);

        let artifact = f
            .generator
            .generate(&f.identifier, &f.label, "qc-labels")
            .await
            .unwrap();
        assert!(artifact.warning.is_some());
        assert_eq!(f.storage.object_count(), 1);
    }
}
