//! Remote-operation façade for the comic shelf.
//!
//! [`ComicBackend`] is the only surface the presentation layer talks to. Every remote call
//! runs inside [`with_timeout`]; only the description function is retried. Failures are
//! logged with the operation name and target id, then returned unchanged in kind.

use std::{path::Path, sync::Arc};

use comic_core::{
    BackendTuning, ComicError, ComicPatch, ComicPayload, ComicRecord, CoverUrl,
    DescriptionRequest, StatusClass, classify_http_status, normalize_execution,
    retry_with_backoff, with_timeout,
};
use comic_platform::{
    DocumentStore, FunctionRuntime, MediaFile, MediaHost, PlatformError, ProbeStatus,
    ScopedCollection,
};
use serde_json::Value;
use tracing::{debug, error, warn};

pub mod appwrite;
pub mod cloudinary;

use appwrite::AppwriteClient;
use cloudinary::CloudinaryMediaHost;

/// Appwrite endpoint used when the configured one is blank.
pub const FALLBACK_ENDPOINT: &str = "https://fra.cloud.appwrite.io/v1";
/// Function that generates comic descriptions.
pub const DEFAULT_FUNCTION_ID: &str = "comics_description_ai";

const LIST_LABEL: &str = "Appwrite listDocuments";
const GET_LABEL: &str = "Appwrite getDocument";
const CREATE_LABEL: &str = "Appwrite createDocument";
const UPDATE_LABEL: &str = "Appwrite updateDocument";
const DELETE_LABEL: &str = "Appwrite deleteDocument";
const UPLOAD_LABEL: &str = "Cloudinary upload";
const PROBE_LABEL: &str = "Appwrite health probe";
const EXECUTION_LABEL: &str = "Appwrite createExecution";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub upload_preset: String,
}

impl MediaConfig {
    pub fn new(cloud_name: impl Into<String>, upload_preset: impl Into<String>) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicBackendConfig {
    pub endpoint: String,
    pub project_id: String,
    pub database_id: String,
    pub collection_id: String,
    pub function_id: String,
    pub media: MediaConfig,
    pub tuning: BackendTuning,
}

impl ComicBackendConfig {
    pub fn new(
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        database_id: impl Into<String>,
        collection_id: impl Into<String>,
    ) -> Self {
        let endpoint = endpoint.into();
        let endpoint = match endpoint.trim() {
            "" => FALLBACK_ENDPOINT.to_owned(),
            trimmed => trimmed.trim_end_matches('/').to_owned(),
        };

        Self {
            endpoint,
            project_id: project_id.into(),
            database_id: database_id.into(),
            collection_id: collection_id.into(),
            function_id: DEFAULT_FUNCTION_ID.to_owned(),
            media: MediaConfig::default(),
            tuning: BackendTuning::default(),
        }
    }

    pub fn with_function_id(mut self, function_id: impl Into<String>) -> Self {
        self.function_id = function_id.into();
        self
    }

    pub fn with_media(mut self, media: MediaConfig) -> Self {
        self.media = media;
        self
    }

    pub fn with_tuning(mut self, tuning: BackendTuning) -> Self {
        self.tuning = tuning;
        self
    }
}

/// Record operations, cover uploads and description generation over injected collaborators.
///
/// Cloning is cheap; clones share the collaborators.
#[derive(Clone)]
pub struct ComicBackend {
    collection: ScopedCollection<Arc<dyn DocumentStore>>,
    media: Arc<dyn MediaHost>,
    functions: Arc<dyn FunctionRuntime>,
    function_id: String,
    endpoint: String,
    tuning: BackendTuning,
}

impl ComicBackend {
    pub fn new(
        store: impl DocumentStore + 'static,
        media: impl MediaHost + 'static,
        functions: impl FunctionRuntime + 'static,
        config: &ComicBackendConfig,
    ) -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(store);
        Self {
            collection: ScopedCollection::new(
                store,
                config.database_id.clone(),
                config.collection_id.clone(),
            ),
            media: Arc::new(media),
            functions: Arc::new(functions),
            function_id: config.function_id.clone(),
            endpoint: config.endpoint.clone(),
            tuning: config.tuning,
        }
    }

    /// Wire the façade to Appwrite and Cloudinary.
    pub fn from_config(config: ComicBackendConfig) -> Result<Self, ComicError> {
        let appwrite = AppwriteClient::new(&config.endpoint, config.project_id.clone())
            .map_err(|err| map_platform_error("connect", None, err))?;
        let media = CloudinaryMediaHost::new(
            config.media.cloud_name.clone(),
            config.media.upload_preset.clone(),
        )
        .map_err(|err| map_platform_error("connect", None, err))?;

        debug!(
            endpoint = %config.endpoint,
            database_id = %config.database_id,
            collection_id = %config.collection_id,
            function_id = %config.function_id,
            "comic backend configured"
        );
        Ok(Self::new(appwrite.clone(), media, appwrite, &config))
    }

    /// All comics in the store's native order.
    pub async fn list_comics(&self) -> Result<Vec<ComicRecord>, ComicError> {
        let collection = self.collection.clone();
        let listed = with_timeout(
            async move {
                collection
                    .list()
                    .await
                    .map_err(|err| map_platform_error("list_documents", None, err))
            },
            self.tuning.record_timeout,
            LIST_LABEL,
        )
        .await
        .map_err(|err| log_failure("list_comics", None, err))?;

        let Some(documents) = listed.documents else {
            warn!("document listing carried no documents field; treating as empty");
            return Ok(Vec::new());
        };
        debug!(count = documents.len(), "listed comics");
        documents
            .into_iter()
            .map(decode_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| log_failure("list_comics", None, err))
    }

    pub async fn get_comic(&self, id: &str) -> Result<ComicRecord, ComicError> {
        let id = require_id("get_comic", id)?;
        let collection = self.collection.clone();
        let target = id.clone();
        let document = with_timeout(
            async move {
                collection
                    .get(&target)
                    .await
                    .map_err(|err| map_platform_error("get_document", Some(&target), err))
            },
            self.tuning.record_timeout,
            GET_LABEL,
        )
        .await
        .map_err(|err| log_failure("get_comic", Some(&id), err))?;

        decode_record(document).map_err(|err| log_failure("get_comic", Some(&id), err))
    }

    /// Persist a new comic. The payload is sent as given; see [`ComicPayload::validate`].
    pub async fn create_comic(&self, payload: ComicPayload) -> Result<ComicRecord, ComicError> {
        let data = serde_json::to_value(&payload)
            .map_err(|err| ComicError::Internal(format!("comic payload encoding: {err}")))
            .map_err(|err| log_failure("create_comic", None, err))?;
        let collection = self.collection.clone();
        let document = with_timeout(
            async move {
                collection
                    .create(data)
                    .await
                    .map_err(|err| map_platform_error("create_document", None, err))
            },
            self.tuning.record_timeout,
            CREATE_LABEL,
        )
        .await
        .map_err(|err| log_failure("create_comic", None, err))?;

        let record = decode_record(document).map_err(|err| log_failure("create_comic", None, err))?;
        debug!(id = %record.id, "created comic");
        Ok(record)
    }

    /// Overwrite the fields present in `patch`; the rest of the document is untouched.
    pub async fn update_comic(&self, id: &str, patch: ComicPatch) -> Result<ComicRecord, ComicError> {
        let id = require_id("update_comic", id)?;
        let data = serde_json::to_value(&patch)
            .map_err(|err| ComicError::Internal(format!("comic patch encoding: {err}")))
            .map_err(|err| log_failure("update_comic", Some(&id), err))?;
        let collection = self.collection.clone();
        let target = id.clone();
        let document = with_timeout(
            async move {
                collection
                    .update(&target, data)
                    .await
                    .map_err(|err| map_platform_error("update_document", Some(&target), err))
            },
            self.tuning.record_timeout,
            UPDATE_LABEL,
        )
        .await
        .map_err(|err| log_failure("update_comic", Some(&id), err))?;

        decode_record(document).map_err(|err| log_failure("update_comic", Some(&id), err))
    }

    /// Delete a comic. Deleting a missing id reports whatever the store reports.
    pub async fn delete_comic(&self, id: &str) -> Result<(), ComicError> {
        let id = require_id("delete_comic", id)?;
        let collection = self.collection.clone();
        let target = id.clone();
        with_timeout(
            async move {
                collection
                    .delete(&target)
                    .await
                    .map_err(|err| map_platform_error("delete_document", Some(&target), err))
            },
            self.tuning.record_timeout,
            DELETE_LABEL,
        )
        .await
        .map_err(|err| log_failure("delete_comic", Some(&id), err))?;

        debug!(id = %id, "deleted comic");
        Ok(())
    }

    /// Upload a cover image and return the opaque reference to store as `coverImage`.
    pub async fn upload_cover(&self, file: MediaFile) -> Result<String, ComicError> {
        let file_name = file.file_name.clone();
        let media = Arc::clone(&self.media);
        let uploaded = with_timeout(
            async move {
                media
                    .upload(file)
                    .await
                    .map_err(|err| ComicError::UploadFailed(err.to_string()))
            },
            self.tuning.upload_timeout,
            UPLOAD_LABEL,
        )
        .await
        .map_err(|err| log_failure("upload_cover", Some(&file_name), err))?;

        debug!(file = %file_name, reference = %uploaded.reference, "uploaded cover");
        Ok(uploaded.reference)
    }

    /// Read a local image and upload it. Unsupported files fail before any network call.
    pub async fn upload_cover_from_path(&self, path: &Path) -> Result<String, ComicError> {
        let file = MediaFile::from_path(path).await.map_err(|err| {
            log_failure(
                "upload_cover",
                Some(&path.display().to_string()),
                ComicError::UploadFailed(err.to_string()),
            )
        })?;
        self.upload_cover(file).await
    }

    /// Display URL of a resized cover. Pure; never touches the network.
    pub fn cover_url(&self, reference: Option<&str>, width: u32, height: u32) -> CoverUrl {
        match reference.map(str::trim) {
            Some(reference) if !reference.is_empty() => {
                CoverUrl::Remote(self.media.derive_url(reference, width, height))
            }
            _ => CoverUrl::Placeholder,
        }
    }

    /// Generate a description from raw form inputs.
    pub async fn generate_description(
        &self,
        title: &str,
        status: &str,
        rating: Option<u8>,
    ) -> Result<String, ComicError> {
        let request = DescriptionRequest::new(title, status, rating)
            .map_err(|err| log_failure("generate_description", None, err))?;
        self.generate_description_for(&request).await
    }

    pub async fn generate_description_for(
        &self,
        request: &DescriptionRequest,
    ) -> Result<String, ComicError> {
        self.describe(request)
            .await
            .map_err(|err| log_failure("generate_description", Some(&request.title), err))
    }

    async fn describe(&self, request: &DescriptionRequest) -> Result<String, ComicError> {
        let body = request.to_body()?;
        if self.tuning.probe_before_execute {
            self.ensure_reachable().await?;
        }

        let execution = retry_with_backoff(
            &self.tuning.execution_retry,
            EXECUTION_LABEL,
            |attempt| {
                let functions = Arc::clone(&self.functions);
                let function_id = self.function_id.clone();
                let body = body.clone();
                debug!(function_id = %function_id, attempt, "executing description function");
                with_timeout(
                    async move {
                        functions
                            .execute(&function_id, body)
                            .await
                            .map_err(|err| map_platform_error("create_execution", None, err))
                    },
                    self.tuning.execution_timeout,
                    EXECUTION_LABEL,
                )
            },
        )
        .await?;

        normalize_execution(&execution)
    }

    async fn ensure_reachable(&self) -> Result<(), ComicError> {
        let functions = Arc::clone(&self.functions);
        let probed = with_timeout(
            async move {
                functions
                    .probe()
                    .await
                    .map_err(|err| map_platform_error("probe", None, err))
            },
            self.tuning.probe_timeout,
            PROBE_LABEL,
        )
        .await;

        match probed {
            Ok(ProbeStatus::Healthy) => Ok(()),
            Ok(ProbeStatus::Degraded { status }) => {
                warn!(endpoint = %self.endpoint, status, "health probe answered non-OK; proceeding");
                Ok(())
            }
            Err(err) => Err(ComicError::Unreachable {
                endpoint: self.endpoint.clone(),
                message: err.to_string(),
            }),
        }
    }
}

fn require_id(operation: &'static str, id: &str) -> Result<String, ComicError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(log_failure(
            operation,
            None,
            ComicError::invalid_argument("id", "document id is required"),
        ));
    }
    Ok(id.to_owned())
}

fn decode_record(document: Value) -> Result<ComicRecord, ComicError> {
    serde_json::from_value(document)
        .map_err(|err| ComicError::Internal(format!("undecodable comic document: {err}")))
}

fn map_platform_error(operation: &str, id: Option<&str>, err: PlatformError) -> ComicError {
    match err {
        PlatformError::NotFound => match id {
            Some(id) => ComicError::NotFound { id: id.to_owned() },
            None => ComicError::StoreError {
                code: 404,
                message: format!("{operation}: resource not found"),
            },
        },
        PlatformError::Rejected { code, message } => match (classify_http_status(code), id) {
            (StatusClass::NotFound, Some(id)) => ComicError::NotFound { id: id.to_owned() },
            _ => ComicError::StoreError { code, message },
        },
        PlatformError::Unavailable(message) => ComicError::Network {
            operation: operation.to_owned(),
            message,
        },
        PlatformError::Backend(message) => ComicError::Internal(format!("{operation}: {message}")),
    }
}

fn log_failure(operation: &'static str, id: Option<&str>, err: ComicError) -> ComicError {
    error!(
        operation,
        id = id.unwrap_or_default(),
        code = err.code(),
        error = %err,
        "comic backend operation failed"
    );
    err
}
