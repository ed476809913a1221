use crate::chat::{ChatModel, PromptMessage};
use crate::embeddings::Embedder;
use crate::error::ProviderError;
use crate::models::{Chunk, EmbedderProfile};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Builds a PDF with one page per entry. An empty entry gives a page with no text.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf serializes");
    bytes
}

pub fn chunks_of(texts: &[&str]) -> Vec<Chunk> {
    let mut start = 0;
    texts
        .iter()
        .enumerate()
        .map(|(index, text)| {
            let chunk = Chunk {
                index,
                start,
                text: text.to_string(),
            };
            start += text.chars().count();
            chunk
        })
        .collect()
}

/// Embedder whose provider always refuses the API key.
pub struct RejectingEmbedder;

#[async_trait]
impl Embedder for RejectingEmbedder {
    fn profile(&self) -> EmbedderProfile {
        EmbedderProfile {
            provider: "rejecting".to_string(),
            model: "none".to_string(),
        }
    }

    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(unauthorized())
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(unauthorized())
    }
}

fn unauthorized() -> ProviderError {
    ProviderError::Unauthorized {
        backend: "rejecting".to_string(),
        status: 401,
    }
}

/// Chat model answering from a script; the last reply repeats once the script runs out.
pub struct ScriptedChat {
    replies: Mutex<VecDeque<String>>,
    last_reply: Mutex<String>,
    fail: bool,
    calls: AtomicUsize,
    last_prompt: Mutex<Vec<PromptMessage>>,
}

impl ScriptedChat {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
            last_reply: Mutex::new(String::new()),
            fail: false,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::replying(&[])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Vec<PromptMessage> {
        self.last_prompt.lock().expect("prompt lock").clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().expect("prompt lock") = messages.to_vec();

        if self.fail {
            return Err(ProviderError::BackendResponse {
                backend: "scripted".to_string(),
                status: Some(503),
                details: "model unavailable".to_string(),
            });
        }

        let mut last = self.last_reply.lock().expect("reply lock");
        if let Some(reply) = self.replies.lock().expect("reply lock").pop_front() {
            *last = reply;
        }
        Ok(last.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FakeRequest {
    pub method: String,
    pub path: String,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

type Handler = dyn Fn(&FakeRequest) -> (u16, String) + Send + Sync;

/// Minimal HTTP/1.1 server on a local port. Every request is answered by
/// `handler` with a status and a JSON body, then the connection is closed.
pub struct FakeHttp {
    url: String,
    requests: Arc<Mutex<Vec<FakeRequest>>>,
    task: JoinHandle<()>,
}

impl FakeHttp {
    pub async fn start<H>(handler: H) -> Self
    where
        H: Fn(&FakeRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let handler: Arc<Handler> = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let _ = serve(stream, handler.as_ref(), &log).await;
                });
            }
        });

        Self {
            url,
            requests,
            task,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<FakeRequest> {
        self.requests.lock().expect("request log").clone()
    }

    /// Requests whose method and path start with the given values.
    pub fn count(&self, method: &str, path_prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.method == method && request.path.starts_with(path_prefix))
            .count()
    }
}

impl Drop for FakeHttp {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    handler: &Handler,
    log: &Mutex<Vec<FakeRequest>>,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    let header_end = loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect::<HashMap<_, _>>();
    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let request = FakeRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&buffer[header_end..]).to_string(),
    };
    let (status, body) = handler(&request);
    log.lock().expect("request log").push(request);

    let response = format!(
        "HTTP/1.1 {status} Fake\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

#[derive(Default)]
struct QdrantState {
    collections: HashMap<String, Vec<Value>>,
    aliases: HashMap<String, String>,
    upserts: usize,
}

/// In-process stand-in for the Qdrant REST endpoints the managed store uses.
pub struct FakeQdrant {
    http: FakeHttp,
    state: Arc<Mutex<QdrantState>>,
}

impl FakeQdrant {
    /// Accepts `healthy_upserts` point uploads and answers every later one with 400.
    pub async fn start(healthy_upserts: usize) -> Self {
        let state = Arc::new(Mutex::new(QdrantState::default()));
        let shared = Arc::clone(&state);
        let http = FakeHttp::start(move |request| {
            shared
                .lock()
                .expect("qdrant state")
                .handle(request, healthy_upserts)
        })
        .await;
        Self { http, state }
    }

    pub fn url(&self) -> &str {
        self.http.url()
    }

    pub fn collections(&self) -> Vec<String> {
        let mut names = self
            .state
            .lock()
            .expect("qdrant state")
            .collections
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn alias_target(&self, alias: &str) -> Option<String> {
        self.state
            .lock()
            .expect("qdrant state")
            .aliases
            .get(alias)
            .cloned()
    }
}

impl QdrantState {
    fn handle(&mut self, request: &FakeRequest, healthy_upserts: usize) -> (u16, String) {
        let path = request.path.split('?').next().unwrap_or_default();
        let segments = path.trim_matches('/').split('/').collect::<Vec<_>>();
        let body = serde_json::from_str::<Value>(&request.body).unwrap_or_default();

        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["aliases"]) => {
                let aliases = self
                    .aliases
                    .iter()
                    .map(|(alias, collection)| {
                        json!({ "alias_name": alias, "collection_name": collection })
                    })
                    .collect::<Vec<_>>();
                qdrant_ok(json!({ "aliases": aliases }))
            }
            ("POST", ["collections", "aliases"]) => {
                for action in body["actions"].as_array().cloned().unwrap_or_default() {
                    if let Some(alias) = action
                        .pointer("/delete_alias/alias_name")
                        .and_then(Value::as_str)
                    {
                        self.aliases.remove(alias);
                    }
                    let collection = action
                        .pointer("/create_alias/collection_name")
                        .and_then(Value::as_str);
                    let alias = action
                        .pointer("/create_alias/alias_name")
                        .and_then(Value::as_str);
                    if let (Some(collection), Some(alias)) = (collection, alias) {
                        if !self.collections.contains_key(collection)
                            || self.aliases.contains_key(alias)
                            || self.collections.contains_key(alias)
                        {
                            return qdrant_error(400, "alias conflicts with an existing name");
                        }
                        self.aliases.insert(alias.to_string(), collection.to_string());
                    }
                }
                qdrant_ok(json!(true))
            }
            ("PUT", ["collections", name]) => {
                self.collections.insert(name.to_string(), Vec::new());
                qdrant_ok(json!(true))
            }
            ("DELETE", ["collections", name]) => match self.collections.remove(*name) {
                Some(_) => qdrant_ok(json!(true)),
                None => qdrant_error(404, "Collection not found"),
            },
            ("PUT", ["collections", name, "points"]) => {
                self.upserts += 1;
                if self.upserts > healthy_upserts {
                    return qdrant_error(400, "Bad Request");
                }
                let points = body["points"].as_array().cloned().unwrap_or_default();
                match self.collections.get_mut(*name) {
                    Some(stored) => {
                        stored.extend(points);
                        qdrant_ok(json!({ "status": "completed" }))
                    }
                    None => qdrant_error(404, "Collection not found"),
                }
            }
            ("POST", ["collections", name, "points", "search"]) => {
                let target = self
                    .aliases
                    .get(*name)
                    .cloned()
                    .unwrap_or_else(|| name.to_string());
                match self.collections.get(&target) {
                    Some(points) => {
                        let limit = body["limit"].as_u64().unwrap_or(10) as usize;
                        let hits = points
                            .iter()
                            .take(limit)
                            .map(|point| {
                                json!({
                                    "id": point["id"].clone(),
                                    "score": 1.0,
                                    "payload": point["payload"].clone(),
                                })
                            })
                            .collect::<Vec<_>>();
                        qdrant_ok(json!(hits))
                    }
                    None => qdrant_error(404, "Collection not found"),
                }
            }
            _ => qdrant_error(404, "unknown route"),
        }
    }
}

fn qdrant_ok(result: Value) -> (u16, String) {
    (200, json!({ "result": result, "status": "ok" }).to_string())
}

fn qdrant_error(status: u16, message: &str) -> (u16, String) {
    (status, json!({ "status": { "error": message } }).to_string())
}
