//! Appwrite REST adapters for the document store and the function runtime.

use async_trait::async_trait;
use comic_platform::{DocumentList, DocumentStore, FunctionRuntime, PlatformError, ProbeStatus};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

const PROJECT_HEADER: &str = "X-Appwrite-Project";
/// Asks Appwrite to generate the document id.
const UNIQUE_ID: &str = "unique()";

#[derive(Deserialize)]
struct AppwriteErrorBody {
    #[serde(default)]
    message: String,
}

/// Thin Appwrite HTTP client scoped to one project.
#[derive(Debug, Clone)]
pub struct AppwriteClient {
    http: reqwest::Client,
    endpoint: Url,
    project_id: String,
}

impl AppwriteClient {
    pub fn new(endpoint: &str, project_id: impl Into<String>) -> Result<Self, PlatformError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| PlatformError::Backend(format!("invalid endpoint '{endpoint}': {err}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(PlatformError::Backend(format!(
                "endpoint '{endpoint}' cannot carry a path"
            )));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("comic-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| PlatformError::Backend(err.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            project_id: project_id.into(),
        })
    }

    fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn documents_url(&self, database_id: &str, collection_id: &str) -> Url {
        self.url_for(&[
            "databases",
            database_id,
            "collections",
            collection_id,
            "documents",
        ])
    }

    fn document_url(&self, database_id: &str, collection_id: &str, document_id: &str) -> Url {
        self.url_for(&[
            "databases",
            database_id,
            "collections",
            collection_id,
            "documents",
            document_id,
        ])
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(PROJECT_HEADER, &self.project_id)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, PlatformError> {
        let response = request
            .send()
            .await
            .map_err(|err| PlatformError::Unavailable(err.to_string()))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(rejection(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PlatformError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|err| PlatformError::Backend(format!("undecodable response: {err}")))
    }
}

async fn rejection(response: Response) -> PlatformError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<AppwriteErrorBody>(&body)
        .ok()
        .map(|parsed| parsed.message)
        .filter(|message| !message.is_empty())
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_owned()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());

    PlatformError::Rejected {
        code: status.as_u16(),
        message,
    }
}

#[async_trait]
impl DocumentStore for AppwriteClient {
    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<DocumentList, PlatformError> {
        let url = self.documents_url(database_id, collection_id);
        debug!(%url, "listing documents");
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Value, PlatformError> {
        let url = self.document_url(database_id, collection_id, document_id);
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        data: Value,
    ) -> Result<Value, PlatformError> {
        let url = self.documents_url(database_id, collection_id);
        let body = json!({ "documentId": UNIQUE_ID, "data": data });
        self.send_json(self.request(Method::POST, url).json(&body))
            .await
    }

    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Value, PlatformError> {
        let url = self.document_url(database_id, collection_id, document_id);
        let body = json!({ "data": data });
        self.send_json(self.request(Method::PATCH, url).json(&body))
            .await
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), PlatformError> {
        let url = self.document_url(database_id, collection_id, document_id);
        self.send(self.request(Method::DELETE, url)).await.map(|_| ())
    }
}

#[async_trait]
impl FunctionRuntime for AppwriteClient {
    async fn probe(&self) -> Result<ProbeStatus, PlatformError> {
        let url = self.url_for(&["health"]);
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|err| PlatformError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(ProbeStatus::Healthy)
        } else {
            Ok(ProbeStatus::Degraded {
                status: status.as_u16(),
            })
        }
    }

    async fn execute(&self, function_id: &str, body: String) -> Result<Value, PlatformError> {
        let url = self.url_for(&["functions", function_id, "executions"]);
        let request = json!({ "body": body, "async": false });
        self.send_json(self.request(Method::POST, url).json(&request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };

    use super::*;

    type Documents = Arc<Mutex<Vec<Value>>>;

    fn not_found() -> (StatusCode, Json<Value>) {
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "message": "Document with the requested ID could not be found.",
                "code": 404,
                "type": "document_not_found"
            })),
        )
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get(PROJECT_HEADER)
            .and_then(|value| value.to_str().ok())
            == Some("comics-project")
    }

    async fn list(State(docs): State<Documents>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
        if !authorized(&headers) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "missing project"})));
        }
        let docs = docs.lock().expect("documents").clone();
        (StatusCode::OK, Json(json!({"total": docs.len(), "documents": docs})))
    }

    async fn create(State(docs): State<Documents>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        assert_eq!(body["documentId"], json!(UNIQUE_ID));
        let mut document = body["data"].clone();
        let mut docs = docs.lock().expect("documents");
        document["$id"] = json!(format!("doc-{}", docs.len() + 1));
        docs.push(document.clone());
        (StatusCode::CREATED, Json(document))
    }

    async fn fetch(
        State(docs): State<Documents>,
        Path((_db, _col, id)): Path<(String, String, String)>,
    ) -> (StatusCode, Json<Value>) {
        let docs = docs.lock().expect("documents");
        match docs.iter().find(|doc| doc["$id"] == json!(id)) {
            Some(doc) => (StatusCode::OK, Json(doc.clone())),
            None => not_found(),
        }
    }

    async fn patch(
        State(docs): State<Documents>,
        Path((_db, _col, id)): Path<(String, String, String)>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let mut docs = docs.lock().expect("documents");
        let Some(doc) = docs.iter_mut().find(|doc| doc["$id"] == json!(id)) else {
            return not_found();
        };
        if let (Some(target), Some(fields)) = (doc.as_object_mut(), body["data"].as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        (StatusCode::OK, Json(doc.clone()))
    }

    async fn remove(
        State(docs): State<Documents>,
        Path((_db, _col, id)): Path<(String, String, String)>,
    ) -> (StatusCode, Json<Value>) {
        let mut docs = docs.lock().expect("documents");
        let before = docs.len();
        docs.retain(|doc| doc["$id"] != json!(id));
        if docs.len() == before {
            return not_found();
        }
        (StatusCode::NO_CONTENT, Json(Value::Null))
    }

    async fn execute(
        Path(function_id): Path<String>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        assert_eq!(body["async"], json!(false));
        let request: Value = serde_json::from_str(body["body"].as_str().unwrap_or("{}"))
            .expect("execution body is JSON text");
        let reply = json!({
            "success": true,
            "description": format!("{} via {function_id}", request["title"].as_str().unwrap_or("?"))
        });
        (
            StatusCode::CREATED,
            Json(json!({"$id": "exec-1", "status": "completed", "responseBody": reply.to_string()})),
        )
    }

    async fn start_server() -> String {
        let docs: Documents = Arc::default();
        let app = Router::new()
            .route("/v1/health", get(|| async { Json(json!({"status": "pass"})) }))
            .route(
                "/v1/databases/:db/collections/:col/documents",
                get(list).post(create),
            )
            .route(
                "/v1/databases/:db/collections/:col/documents/:id",
                get(fetch).patch(patch).delete(remove),
            )
            .route("/v1/functions/:function_id/executions", post(execute))
            .with_state(docs);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        format!("http://{addr}/v1")
    }

    #[test]
    fn builds_document_urls_under_endpoint_path() {
        let client = AppwriteClient::new("https://cloud.example.org/v1/", "p").expect("client");
        assert_eq!(
            client.document_url("db", "comics", "abc").as_str(),
            "https://cloud.example.org/v1/databases/db/collections/comics/documents/abc"
        );
        assert_eq!(
            client.url_for(&["health"]).as_str(),
            "https://cloud.example.org/v1/health"
        );
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let err = AppwriteClient::new("not a url", "p").expect_err("invalid endpoint");
        assert!(matches!(err, PlatformError::Backend(_)));
    }

    #[tokio::test]
    async fn document_crud_against_http_server() {
        let endpoint = start_server().await;
        let client = AppwriteClient::new(&endpoint, "comics-project").expect("client");

        let created = client
            .create_document("db", "comics", json!({"title": "Saga", "status": "read", "rating": 5}))
            .await
            .expect("create");
        assert_eq!(created["$id"], json!("doc-1"));

        let listed = client.list_documents("db", "comics").await.expect("list");
        assert_eq!(listed.total, Some(1));
        assert_eq!(listed.documents.expect("documents").len(), 1);

        let updated = client
            .update_document("db", "comics", "doc-1", json!({"rating": 4}))
            .await
            .expect("update");
        assert_eq!(updated["rating"], json!(4));
        assert_eq!(updated["title"], json!("Saga"));

        client
            .delete_document("db", "comics", "doc-1")
            .await
            .expect("delete");
        let err = client
            .get_document("db", "comics", "doc-1")
            .await
            .expect_err("deleted document is gone");
        assert_eq!(
            err,
            PlatformError::Rejected {
                code: 404,
                message: "Document with the requested ID could not be found.".into()
            }
        );
    }

    #[tokio::test]
    async fn surfaces_rejections_with_status_and_message() {
        let endpoint = start_server().await;
        let client = AppwriteClient::new(&endpoint, "wrong-project").expect("client");
        let err = client
            .list_documents("db", "comics")
            .await
            .expect_err("unauthorized project");
        assert_eq!(
            err,
            PlatformError::Rejected {
                code: 401,
                message: "missing project".into()
            }
        );
    }

    #[tokio::test]
    async fn probes_and_executes_functions() {
        let endpoint = start_server().await;
        let client = AppwriteClient::new(&endpoint, "comics-project").expect("client");

        assert_eq!(client.probe().await, Ok(ProbeStatus::Healthy));

        let execution = client
            .execute("describe", r#"{"title":"Saga","status":"read","rating":5}"#.to_owned())
            .await
            .expect("execute");
        assert_eq!(
            comic_core::normalize_execution(&execution).expect("description"),
            "Saga via describe"
        );
    }

    #[tokio::test]
    async fn reports_unavailable_when_nothing_listens() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let client = AppwriteClient::new(&format!("http://{addr}/v1"), "p").expect("client");
        assert!(matches!(
            client.probe().await,
            Err(PlatformError::Unavailable(_))
        ));
    }
}
