use crate::db::{ColumnWrite, ProductRecord, ProductStore, StoreError};
use crate::slug::storage_key;
use crate::storage::{StorageError, Uploader};
use crate::targets::{Column, DataType, ImageSlot, SaveTarget, TextTarget};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("product `{sku}` not found")]
    NotFound { sku: String },
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("unknown save target `{0}`")]
    InvalidTarget(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl From<StoreError> for UpdateError {
    fn from(value: StoreError) -> Self {
        Self::Unexpected(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// A validated save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateRequest {
    Image {
        slot: ImageSlot,
        image: ImageUpload,
        /// The untouched upload, written to the original-image column only
        /// if that column is still empty.
        original: Option<ImageUpload>,
    },
    Text {
        target: TextTarget,
        text: String,
    },
}

impl UpdateRequest {
    /// Builds a request from the loosely-typed multipart fields.
    pub fn from_form(
        target: &str,
        data_type: &str,
        image: Option<ImageUpload>,
        original: Option<ImageUpload>,
        text: Option<String>,
    ) -> Result<Self, UpdateError> {
        let data_type = DataType::from_wire(data_type).ok_or_else(|| {
            UpdateError::InvalidInput(format!("unsupported dataType `{}`", data_type.trim()))
        })?;
        let target_id = target.trim();
        let resolved = SaveTarget::from_wire(target_id)
            .ok_or_else(|| UpdateError::InvalidTarget(target_id.to_string()))?;

        match (data_type, resolved) {
            (DataType::Image, SaveTarget::Image(slot)) => {
                let image = image
                    .filter(|upload| !upload.bytes.is_empty())
                    .ok_or_else(|| UpdateError::InvalidInput("image file is required".into()))?;
                Ok(UpdateRequest::Image {
                    slot,
                    image,
                    original: original.filter(|upload| !upload.bytes.is_empty()),
                })
            }
            (DataType::Description, SaveTarget::Text(target)) => {
                let text = text
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| UpdateError::InvalidInput("description is required".into()))?;
                Ok(UpdateRequest::Text { target, text })
            }
            _ => Err(UpdateError::InvalidTarget(target_id.to_string())),
        }
    }

    fn target(&self) -> SaveTarget {
        match self {
            UpdateRequest::Image { slot, .. } => SaveTarget::Image(*slot),
            UpdateRequest::Text { target, .. } => SaveTarget::Text(*target),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub message: String,
    pub column: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    Full,
    Partial,
    Empty,
}

impl Completeness {
    pub fn classify(set: usize, total: usize) -> Self {
        if set == 0 {
            Completeness::Empty
        } else if set >= total {
            Completeness::Full
        } else {
            Completeness::Partial
        }
    }

    pub fn of(record: &ProductRecord) -> Self {
        let set = Column::TRACKED
            .iter()
            .filter(|column| record.get(**column).is_some())
            .count();
        Self::classify(set, Column::TRACKED.len())
    }

    pub fn status_color(&self) -> &'static str {
        match self {
            Completeness::Full => "green",
            Completeness::Partial => "yellow",
            Completeness::Empty => "red",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub sku: String,
    pub category: Option<String>,
    pub meta_title: Option<String>,
    pub completeness: Completeness,
    #[serde(rename = "statusColor")]
    pub status_color: &'static str,
}

impl From<&ProductRecord> for ProductSummary {
    fn from(record: &ProductRecord) -> Self {
        let completeness = Completeness::of(record);
        Self {
            sku: record.sku.clone(),
            category: record.category.clone(),
            meta_title: record.meta_title.clone(),
            completeness,
            status_color: completeness.status_color(),
        }
    }
}

#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn ProductStore>,
    uploader: Uploader,
}

impl ProductService {
    pub fn new(store: Arc<dyn ProductStore>, uploader: Uploader) -> Self {
        Self { store, uploader }
    }

    pub async fn list(&self) -> Result<Vec<ProductSummary>, UpdateError> {
        let records = self.store.list().await?;
        Ok(records.iter().map(ProductSummary::from).collect())
    }

    pub async fn get(&self, sku: &str) -> Result<ProductRecord, UpdateError> {
        self.store
            .find(sku)
            .await?
            .ok_or_else(|| UpdateError::NotFound { sku: sku.to_string() })
    }

    /// Writes one save target for `sku`. Preconditions are checked before any
    /// upload, so a rejected request leaves both storage and the row untouched.
    pub async fn update(
        &self,
        sku: &str,
        request: UpdateRequest,
    ) -> Result<UpdateOutcome, UpdateError> {
        let record = self.get(sku).await?;
        let target = request.target();

        let write = match request {
            UpdateRequest::Image {
                slot,
                image,
                original,
            } => {
                if slot.is_original() && record.has_original() {
                    return Err(UpdateError::PreconditionFailed(
                        "the original image is already saved for this product".into(),
                    ));
                }
                if !slot.is_original() && !record.has_meta_title() {
                    return Err(UpdateError::PreconditionFailed(
                        "generate a title first: stage images need a meta title".into(),
                    ));
                }
                let category = record.category.as_deref().unwrap_or_default();
                let url = self.upload(category, &record.sku, slot, image).await?;
                let original_url = match original {
                    Some(original) if !slot.is_original() && !record.has_original() => Some(
                        self.upload(category, &record.sku, ImageSlot::Original, original)
                            .await?,
                    ),
                    _ => None,
                };
                ColumnWrite {
                    column: slot.column(),
                    value: url,
                    original: original_url,
                }
            }
            UpdateRequest::Text { target, text } => ColumnWrite {
                column: target.column(),
                value: text,
                original: None,
            },
        };

        let affected = self.store.apply(&record.sku, &write, Utc::now()).await?;
        if affected == 0 {
            warn!(target = "studio.products", sku = %record.sku, "row vanished before update");
            return Err(UpdateError::NotFound { sku: record.sku });
        }

        info!(
            target = "studio.products",
            sku = %record.sku,
            column = write.column.as_str(),
            original_set = write.original.is_some(),
            "product updated"
        );

        let is_image = matches!(target, SaveTarget::Image(_));
        Ok(UpdateOutcome {
            message: format!("Saved {} for {}", target.wire_name(), record.sku),
            column: write.column.as_str(),
            url: is_image.then(|| write.value.clone()),
            original_url: write.original,
        })
    }

    async fn upload(
        &self,
        category: &str,
        sku: &str,
        slot: ImageSlot,
        image: ImageUpload,
    ) -> Result<String, UpdateError> {
        let key = storage_key(category, sku, slot.phrase(), &image.content_type);
        let url = self
            .uploader
            .upload(&key, image.bytes, &image.content_type)
            .await?;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryProductStore;
    use crate::storage::MemoryObjectStore;
    use crate::targets::ProductionStage;

    fn png(bytes: &[u8]) -> ImageUpload {
        ImageUpload {
            bytes: bytes.to_vec(),
            content_type: "image/png".into(),
        }
    }

    fn service(records: Vec<ProductRecord>) -> (ProductService, MemoryProductStore, MemoryObjectStore) {
        let store = MemoryProductStore::new(records);
        let objects = MemoryObjectStore::new();
        let uploader = Uploader::new(Arc::new(objects.clone()), "https://cdn.example.com");
        (
            ProductService::new(Arc::new(store.clone()), uploader),
            store,
            objects,
        )
    }

    fn titled(sku: &str) -> ProductRecord {
        let mut record = ProductRecord::new(sku, "Rings");
        record.meta_title = Some("Custom Gold Ring".into());
        record
    }

    fn wax_image() -> UpdateRequest {
        UpdateRequest::Image {
            slot: ImageSlot::Stage(ProductionStage::Wax),
            image: png(&[9, 9]),
            original: None,
        }
    }

    #[tokio::test]
    async fn unknown_sku_is_not_found_and_writes_nothing() {
        let (service, store, objects) = service(vec![ProductRecord::new("ABC-123", "Rings")]);
        let err = service.update("NOPE", wax_image()).await.unwrap_err();
        assert!(matches!(err, UpdateError::NotFound { .. }));
        assert!(objects.keys().await.is_empty());
        let row = store.find("ABC-123").await.unwrap().unwrap();
        assert!(row.updated_at.is_none());
    }

    #[tokio::test]
    async fn stage_image_without_meta_title_is_rejected_before_upload() {
        let (service, store, objects) = service(vec![ProductRecord::new("ABC-123", "Rings")]);
        let err = service.update("ABC-123", wax_image()).await.unwrap_err();
        assert!(matches!(err, UpdateError::PreconditionFailed(_)));
        assert!(err.to_string().contains("generate a title first"));
        assert!(objects.keys().await.is_empty());
        let row = store.find("ABC-123").await.unwrap().unwrap();
        assert!(row.wax_image.is_none());
    }

    #[tokio::test]
    async fn text_target_writes_only_its_column() {
        let (service, store, objects) = service(vec![ProductRecord::new("ABC-123", "Rings")]);
        let request = UpdateRequest::from_form(
            "Meta_title",
            "Description",
            None,
            None,
            Some("Custom Gold Ring".into()),
        )
        .unwrap();
        let outcome = service.update("ABC-123", request).await.expect("update");
        assert_eq!(outcome.column, "meta_title");
        assert!(outcome.url.is_none());
        assert!(objects.keys().await.is_empty());

        let mut row = store.find("ABC-123").await.unwrap().unwrap();
        assert!(row.updated_at.take().is_some());
        let mut expected = ProductRecord::new("ABC-123", "Rings");
        expected.meta_title = Some("Custom Gold Ring".into());
        assert_eq!(format!("{row:?}"), format!("{expected:?}"));
    }

    #[tokio::test]
    async fn stage_image_is_uploaded_and_url_persisted() {
        let (service, store, objects) = service(vec![titled("ABC-123")]);
        let outcome = service.update("ABC-123", wax_image()).await.expect("update");
        let keys = objects.keys().await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("rings/abc-123-"));
        assert!(keys[0].ends_with("-wax-model.png"));
        let row = store.find("ABC-123").await.unwrap().unwrap();
        assert_eq!(row.wax_image, outcome.url);
        assert!(row.pre_image.is_none());
    }

    #[tokio::test]
    async fn original_is_written_once() {
        let (service, store, objects) = service(vec![titled("ABC-123")]);
        let first = UpdateRequest::Image {
            slot: ImageSlot::Stage(ProductionStage::Final),
            image: png(&[1]),
            original: Some(png(&[0])),
        };
        let outcome = service.update("ABC-123", first).await.unwrap();
        let original_url = outcome.original_url.expect("original uploaded");
        assert_eq!(objects.keys().await.len(), 2);

        let second = UpdateRequest::Image {
            slot: ImageSlot::Stage(ProductionStage::Cast),
            image: png(&[2]),
            original: Some(png(&[7])),
        };
        let outcome = service.update("ABC-123", second).await.unwrap();
        assert!(outcome.original_url.is_none());
        assert_eq!(objects.keys().await.len(), 3);
        let row = store.find("ABC-123").await.unwrap().unwrap();
        assert_eq!(row.pre_image.as_deref(), Some(original_url.as_str()));

        let direct = UpdateRequest::Image {
            slot: ImageSlot::Original,
            image: png(&[3]),
            original: None,
        };
        let err = service.update("ABC-123", direct).await.unwrap_err();
        assert!(matches!(err, UpdateError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn blank_original_is_replaced_and_reported() {
        let mut record = titled("ABC-123");
        record.pre_image = Some(" ".into());
        let (service, store, _) = service(vec![record]);
        let request = UpdateRequest::Image {
            slot: ImageSlot::Stage(ProductionStage::Wax),
            image: png(&[1]),
            original: Some(png(&[0])),
        };
        let outcome = service.update("ABC-123", request).await.unwrap();
        let original_url = outcome.original_url.expect("original uploaded");
        let row = store.find("ABC-123").await.unwrap().unwrap();
        assert_eq!(row.pre_image.as_deref(), Some(original_url.as_str()));
    }

    #[tokio::test]
    async fn original_slot_does_not_need_a_title() {
        let (service, store, _) = service(vec![ProductRecord::new("ABC-123", "Rings")]);
        let request = UpdateRequest::Image {
            slot: ImageSlot::Original,
            image: png(&[1]),
            original: None,
        };
        service.update("ABC-123", request).await.expect("update");
        let row = store.find("ABC-123").await.unwrap().unwrap();
        assert!(row.pre_image.is_some());
    }

    #[test]
    fn form_parsing_rejects_mismatched_and_unknown_targets() {
        let err = UpdateRequest::from_form("Wax", "Description", None, None, Some("x".into()))
            .unwrap_err();
        assert!(matches!(err, UpdateError::InvalidTarget(t) if t == "Wax"));
        let err = UpdateRequest::from_form("Wax_notes", "Description", None, None, Some("x".into()))
            .unwrap_err();
        assert!(matches!(err, UpdateError::InvalidTarget(_)));
        let err = UpdateRequest::from_form("Meta_title", "Image", Some(png(&[1])), None, None)
            .unwrap_err();
        assert!(matches!(err, UpdateError::InvalidTarget(_)));
    }

    #[test]
    fn form_parsing_requires_payload() {
        let err = UpdateRequest::from_form("Wax", "Image", None, None, None).unwrap_err();
        assert!(matches!(err, UpdateError::InvalidInput(_)));
        let err = UpdateRequest::from_form("Wax", "Image", Some(png(&[])), None, None).unwrap_err();
        assert!(matches!(err, UpdateError::InvalidInput(_)));
        let err = UpdateRequest::from_form("Meta_title", "Description", None, None, Some("  ".into()))
            .unwrap_err();
        assert!(matches!(err, UpdateError::InvalidInput(_)));
        let err = UpdateRequest::from_form("Meta_title", "Video", None, None, None).unwrap_err();
        assert!(matches!(err, UpdateError::InvalidInput(_)));
    }

    #[test]
    fn completeness_thresholds() {
        assert_eq!(Completeness::classify(0, 12), Completeness::Empty);
        assert_eq!(Completeness::classify(12, 12), Completeness::Full);
        for set in 1..12 {
            assert_eq!(Completeness::classify(set, 12), Completeness::Partial);
        }
    }

    #[tokio::test]
    async fn listing_reports_status_per_row() {
        let mut full = ProductRecord::new("FULL-1", "Rings");
        for column in Column::TRACKED {
            full.set(column, "x");
        }
        let (service, _, _) = service(vec![
            full,
            titled("PART-1"),
            ProductRecord::new("EMPTY-1", "Rings"),
        ]);
        let listing = service.list().await.unwrap();
        let by_sku = |sku: &str| listing.iter().find(|p| p.sku == sku).unwrap().clone();
        assert_eq!(by_sku("FULL-1").completeness, Completeness::Full);
        assert_eq!(by_sku("FULL-1").status_color, "green");
        assert_eq!(by_sku("PART-1").completeness, Completeness::Partial);
        assert_eq!(by_sku("PART-1").meta_title.as_deref(), Some("Custom Gold Ring"));
        assert_eq!(by_sku("EMPTY-1").completeness, Completeness::Empty);
        assert_eq!(by_sku("EMPTY-1").status_color, "red");
    }
}
