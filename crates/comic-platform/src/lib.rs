use std::{
    collections::HashMap,
    io,
    path::Path,
    sync::{
        Arc, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a remote collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("resource not found")]
    NotFound,
    #[error("request rejected with status {code}: {message}")]
    Rejected { code: u16, message: String },
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Result of a document listing. `documents` is `None` when the store omitted the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentList {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub documents: Option<Vec<Value>>,
}

/// Schema-flexible remote document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<DocumentList, PlatformError>;

    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Value, PlatformError>;

    /// Create a document; the store assigns its id.
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        data: Value,
    ) -> Result<Value, PlatformError>;

    /// Overwrite the supplied top-level fields, leaving the others untouched.
    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Value, PlatformError>;

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), PlatformError>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<DocumentList, PlatformError> {
        (**self).list_documents(database_id, collection_id).await
    }

    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Value, PlatformError> {
        (**self)
            .get_document(database_id, collection_id, document_id)
            .await
    }

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        data: Value,
    ) -> Result<Value, PlatformError> {
        (**self)
            .create_document(database_id, collection_id, data)
            .await
    }

    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Value, PlatformError> {
        (**self)
            .update_document(database_id, collection_id, document_id, data)
            .await
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), PlatformError> {
        (**self)
            .delete_document(database_id, collection_id, document_id)
            .await
    }
}

/// Document store bound to one database and collection.
#[derive(Clone)]
pub struct ScopedCollection<S: DocumentStore> {
    inner: S,
    database_id: String,
    collection_id: String,
}

impl<S: DocumentStore> ScopedCollection<S> {
    pub fn new(inner: S, database_id: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            inner,
            database_id: database_id.into(),
            collection_id: collection_id.into(),
        }
    }

    pub async fn list(&self) -> Result<DocumentList, PlatformError> {
        self.inner
            .list_documents(&self.database_id, &self.collection_id)
            .await
    }

    pub async fn get(&self, document_id: &str) -> Result<Value, PlatformError> {
        self.inner
            .get_document(&self.database_id, &self.collection_id, document_id)
            .await
    }

    pub async fn create(&self, data: Value) -> Result<Value, PlatformError> {
        self.inner
            .create_document(&self.database_id, &self.collection_id, data)
            .await
    }

    pub async fn update(&self, document_id: &str, data: Value) -> Result<Value, PlatformError> {
        self.inner
            .update_document(&self.database_id, &self.collection_id, document_id, data)
            .await
    }

    pub async fn delete(&self, document_id: &str) -> Result<(), PlatformError> {
        self.inner
            .delete_document(&self.database_id, &self.collection_id, document_id)
            .await
    }
}

type CollectionKey = (String, String);

/// Process-local document store. Documents keep insertion order.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    data: Arc<RwLock<HashMap<CollectionKey, Vec<Value>>>>,
}

impl InMemoryDocumentStore {
    fn key(database_id: &str, collection_id: &str) -> CollectionKey {
        (database_id.to_owned(), collection_id.to_owned())
    }
}

fn poisoned() -> PlatformError {
    PlatformError::Backend("poisoned lock".to_owned())
}

fn document_id_of(document: &Value) -> Option<&str> {
    document.get("$id").and_then(Value::as_str)
}

fn expect_object(data: Value) -> Result<Map<String, Value>, PlatformError> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(PlatformError::Rejected {
            code: 400,
            message: "document data must be a JSON object".to_owned(),
        }),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<DocumentList, PlatformError> {
        let data = self.data.read().map_err(|_| poisoned())?;
        let documents = data
            .get(&Self::key(database_id, collection_id))
            .cloned()
            .unwrap_or_default();
        Ok(DocumentList {
            total: Some(documents.len() as u64),
            documents: Some(documents),
        })
    }

    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Value, PlatformError> {
        let data = self.data.read().map_err(|_| poisoned())?;
        data.get(&Self::key(database_id, collection_id))
            .and_then(|docs| docs.iter().find(|doc| document_id_of(doc) == Some(document_id)))
            .cloned()
            .ok_or(PlatformError::NotFound)
    }

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        data: Value,
    ) -> Result<Value, PlatformError> {
        let mut fields = expect_object(data)?;
        fields.insert(
            "$id".to_owned(),
            Value::String(Uuid::new_v4().simple().to_string()),
        );
        let document = Value::Object(fields);

        let mut data = self.data.write().map_err(|_| poisoned())?;
        data.entry(Self::key(database_id, collection_id))
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Value, PlatformError> {
        let fields = expect_object(data)?;
        let mut data = self.data.write().map_err(|_| poisoned())?;
        let document = data
            .get_mut(&Self::key(database_id, collection_id))
            .and_then(|docs| {
                docs.iter_mut()
                    .find(|doc| document_id_of(doc) == Some(document_id))
            })
            .ok_or(PlatformError::NotFound)?;

        if let Value::Object(existing) = document {
            for (key, value) in fields {
                if key != "$id" {
                    existing.insert(key, value);
                }
            }
        }
        Ok(document.clone())
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), PlatformError> {
        let mut data = self.data.write().map_err(|_| poisoned())?;
        let docs = data
            .get_mut(&Self::key(database_id, collection_id))
            .ok_or(PlatformError::NotFound)?;
        let before = docs.len();
        docs.retain(|doc| document_id_of(doc) != Some(document_id));
        if docs.len() == before {
            return Err(PlatformError::NotFound);
        }
        Ok(())
    }
}

/// Image bytes selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MediaFile {
    /// Wrap bytes, detecting the content type from the file name or the image header.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> io::Result<Self> {
        let file_name = file_name.into();
        let content_type = content_type_from_file_name(&file_name)
            .or_else(|| content_type_from_bytes(&bytes))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unsupported image format; expected png/jpeg/gif/webp bytes",
                )
            })?;

        Ok(Self {
            file_name,
            content_type: content_type.to_owned(),
            bytes,
        })
    }

    /// Read a local image file.
    pub async fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cover".to_owned());
        Self::new(file_name, bytes)
    }
}

fn content_type_from_file_name(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn content_type_from_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 8 && bytes[0..8] == [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A] {
        return Some("image/png");
    }
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        return Some("image/jpeg");
    }
    if bytes.len() >= 6 && (&bytes[0..6] == b"GIF87a" || &bytes[0..6] == b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

/// Stored media and the reference to persist for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    /// Opaque host-issued reference.
    pub reference: String,
}

/// Remote image host with on-the-fly resizing.
#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload(&self, file: MediaFile) -> Result<UploadedMedia, PlatformError>;

    /// URL of a resized variant. Pure string construction, no network call.
    fn derive_url(&self, reference: &str, width: u32, height: u32) -> String;
}

#[async_trait]
impl<M: MediaHost + ?Sized> MediaHost for Arc<M> {
    async fn upload(&self, file: MediaFile) -> Result<UploadedMedia, PlatformError> {
        (**self).upload(file).await
    }

    fn derive_url(&self, reference: &str, width: u32, height: u32) -> String {
        (**self).derive_url(reference, width, height)
    }
}

/// Process-local media host.
#[derive(Clone, Default)]
pub struct InMemoryMediaHost {
    objects: Arc<RwLock<HashMap<String, MediaFile>>>,
}

impl InMemoryMediaHost {
    pub fn get(&self, reference: &str) -> Option<MediaFile> {
        self.objects.read().ok()?.get(reference).cloned()
    }
}

#[async_trait]
impl MediaHost for InMemoryMediaHost {
    async fn upload(&self, file: MediaFile) -> Result<UploadedMedia, PlatformError> {
        let reference = format!("covers/{}", Uuid::new_v4().simple());
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.insert(reference.clone(), file);
        Ok(UploadedMedia { reference })
    }

    fn derive_url(&self, reference: &str, width: u32, height: u32) -> String {
        format!("memory://media/w_{width},h_{height}/{reference}")
    }
}

/// Outcome of a reachability probe that reached the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Healthy,
    /// Reachable but answered with a non-success status.
    Degraded { status: u16 },
}

/// Remote service that runs a named function with a JSON body.
#[async_trait]
pub trait FunctionRuntime: Send + Sync {
    /// Cheap reachability check. Transport failures are `Unavailable`.
    async fn probe(&self) -> Result<ProbeStatus, PlatformError>;

    /// Run `function_id` synchronously and return the raw execution result.
    async fn execute(&self, function_id: &str, body: String) -> Result<Value, PlatformError>;
}

#[async_trait]
impl<F: FunctionRuntime + ?Sized> FunctionRuntime for Arc<F> {
    async fn probe(&self) -> Result<ProbeStatus, PlatformError> {
        (**self).probe().await
    }

    async fn execute(&self, function_id: &str, body: String) -> Result<Value, PlatformError> {
        (**self).execute(function_id, body).await
    }
}

type FunctionHandler = dyn Fn(&str, &str) -> Result<Value, PlatformError> + Send + Sync;

/// Function runtime backed by a local closure.
#[derive(Clone)]
pub struct LocalFunctionRuntime {
    handler: Arc<FunctionHandler>,
    reachable: bool,
    executions: Arc<AtomicUsize>,
}

impl LocalFunctionRuntime {
    /// `handler` receives the function id and request body and returns the execution result.
    pub fn new<H>(handler: H) -> Self
    where
        H: Fn(&str, &str) -> Result<Value, PlatformError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            reachable: true,
            executions: Arc::default(),
        }
    }

    /// Make every probe fail as if the endpoint were offline.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FunctionRuntime for LocalFunctionRuntime {
    async fn probe(&self) -> Result<ProbeStatus, PlatformError> {
        if self.reachable {
            Ok(ProbeStatus::Healthy)
        } else {
            Err(PlatformError::Unavailable("endpoint offline".to_owned()))
        }
    }

    async fn execute(&self, function_id: &str, body: String) -> Result<Value, PlatformError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        (self.handler)(function_id, &body)
    }
}
