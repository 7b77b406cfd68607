//! Portal-style REST catalog.
//!
//! Uploads go to `{base}/content/users/{owner}/addItem` and items are
//! read back from `{base}/content/items/{id}`. Both endpoints answer
//! with JSON; failures may arrive as an `error` object in a 200 reply.

use super::{Catalog, CatalogId};
use crate::{ForestryError, Stage, StagedDraft};
use log::{debug, info};
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    header::CONTENT_TYPE,
};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;

pub struct HttpCatalog {
    /// Portal REST root, without a trailing slash.
    base: String,

    /// Account owning uploaded items.
    owner: String,

    /// Bearer token, obtained by the caller.
    token: Option<String>,

    timeout: Duration,

    client: Client,
}

impl HttpCatalog {
    pub fn new(
        base: &str,
        owner: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ForestryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForestryError::Publish {
                name: String::new(),
                reason: format!("building http client, {e}"),
            })?;
        Ok(Self {
            base: base.trim_end_matches('/').to_owned(),
            owner: owner.to_owned(),
            token,
            timeout,
            client,
        })
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Converts a transport failure into a timeout or `on_error`.
    fn transport_error<F>(&self, stage: Stage, e: &reqwest::Error, on_error: F) -> ForestryError
    where
        F: FnOnce(String) -> ForestryError,
    {
        if e.is_timeout() {
            ForestryError::Timeout {
                stage,
                elapsed: self.timeout,
            }
        } else {
            on_error(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

impl ErrorBody {
    fn describe(&self) -> String {
        match (self.code, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => format!("error code {code}"),
            (None, None) => "unspecified error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddItemReply {
    success: Option<bool>,
    id: Option<String>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ItemReply {
    url: Option<String>,
    error: Option<ErrorBody>,
}

/// Reads a JSON reply, reporting HTTP and decode failures as strings.
fn read_reply<T: DeserializeOwned>(response: Response) -> Result<T, String> {
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }
    response.json::<T>().map_err(|e| e.to_string())
}

impl Catalog for HttpCatalog {
    fn upload(&self, draft: &StagedDraft, unique_name: &str) -> Result<CatalogId, ForestryError> {
        let mk_err = |reason: String| ForestryError::Publish {
            name: unique_name.to_owned(),
            reason,
        };
        let body = std::fs::read(&draft.path).map_err(|e| mk_err(e.to_string()))?;
        let manifest = &draft.manifest;
        let tags = manifest.tags.join(",");
        let url = format!("{}/content/users/{}/addItem", self.base, self.owner);
        debug!("uploading {} bytes to {url}", body.len());

        let req = self
            .client
            .post(&url)
            .query(&[
                ("f", "json"),
                ("name", unique_name),
                ("title", manifest.title.as_str()),
                ("type", manifest.content_type.as_str()),
                ("tags", tags.as_str()),
                ("description", manifest.description.as_str()),
            ])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body);
        let response = self
            .authorize(req)
            .send()
            .map_err(|e| self.transport_error(Stage::Upload, &e, mk_err))?;
        let reply: AddItemReply = read_reply(response).map_err(mk_err)?;

        if let Some(error) = reply.error {
            return Err(mk_err(error.describe()));
        }
        match (reply.success, reply.id) {
            (Some(false), _) => Err(mk_err("catalog reported failure".to_string())),
            (_, Some(id)) if !id.is_empty() => {
                info!("uploaded {unique_name} as {id}");
                Ok(CatalogId::new(id))
            }
            _ => Err(mk_err("reply carried no item id".to_string())),
        }
    }

    fn resolve(&self, id: &CatalogId) -> Result<String, ForestryError> {
        let mk_err = |reason: String| ForestryError::Resolve {
            id: id.to_string(),
            reason,
        };
        let url = format!("{}/content/items/{id}", self.base);
        let req = self.client.get(&url).query(&[("f", "json")]);
        let response = self
            .authorize(req)
            .send()
            .map_err(|e| self.transport_error(Stage::Resolve, &e, mk_err))?;
        let reply: ItemReply = read_reply(response).map_err(mk_err)?;

        if let Some(error) = reply.error {
            return Err(mk_err(error.describe()));
        }
        reply
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| mk_err("item has no url".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{AddItemReply, ErrorBody, HttpCatalog, ItemReply};
    use crate::{
        ArtifactMeta, Catalog, CatalogId, ForestryError, InvocationContext, Stage, StagedDraft,
        Stager,
    };
    use geo::geometry::Coord;
    use raster::{GridGeometry, RasterSurface, DEFAULT_NODATA};
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::{TcpListener, TcpStream},
        sync::{Arc, Mutex},
        time::Duration,
    };

    enum Reply {
        Json(u16, &'static str),
        /// Reads the request and never answers.
        Silent,
    }

    /// A catalog endpoint answering one scripted reply per connection.
    struct Stub {
        base: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl Stub {
        fn start(replies: Vec<Reply>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let base = format!("http://{}/sharing/rest", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = requests.clone();
            std::thread::spawn(move || {
                for reply in replies {
                    let Ok((stream, _)) = listener.accept() else {
                        return;
                    };
                    let mut rdr = BufReader::new(stream);
                    seen.lock().unwrap().push(read_request(&mut rdr));
                    let mut stream = rdr.into_inner();
                    match reply {
                        Reply::Json(status, body) => {
                            let _ = write!(
                                stream,
                                "HTTP/1.1 {status} Stub\r\n\
                                 Content-Type: application/json\r\n\
                                 Content-Length: {}\r\n\
                                 Connection: close\r\n\r\n{body}",
                                body.len()
                            );
                        }
                        Reply::Silent => std::thread::sleep(Duration::from_secs(2)),
                    }
                }
            });
            Self { base, requests }
        }

        fn catalog(&self, timeout: Duration) -> HttpCatalog {
            HttpCatalog::new(&self.base, "forester", Some("t0k3n".to_string()), timeout).unwrap()
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Consumes one request and returns its request line.
    fn read_request(rdr: &mut BufReader<TcpStream>) -> String {
        let mut request_line = String::new();
        rdr.read_line(&mut request_line).unwrap();
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            rdr.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
        }
        let mut body = vec![0; content_length];
        rdr.read_exact(&mut body).unwrap();
        request_line.trim_end().to_owned()
    }

    fn draft(tag: &str) -> StagedDraft {
        let root = std::env::temp_dir().join(format!("forestry-http-{tag}-{}", std::process::id()));
        let grid = GridGeometry::new(Coord { x: 0.0, y: 10.0 }, 10.0, 1, 1).unwrap();
        let raster = RasterSurface::new(grid, DEFAULT_NODATA, vec![12.5]).unwrap();
        let meta = ArtifactMeta {
            title: "Tree height".to_string(),
            description: "test".to_string(),
            tags: vec!["Tree Height".to_string()],
        };
        let ctx = InvocationContext::generate("plot", None);
        Stager::new(root)
            .stage(&ctx, &raster, &ctx.artifact_name("th_raster"), &meta)
            .unwrap()
    }

    #[test]
    fn test_base_is_normalized() {
        let catalog =
            HttpCatalog::new("https://portal.example/sharing/rest/", "forester", None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(catalog.base, "https://portal.example/sharing/rest");
    }

    #[test]
    fn test_parse_add_item_reply() {
        let reply: AddItemReply =
            serde_json::from_str(r#"{"success": true, "id": "a1b2c3", "folder": ""}"#).unwrap();
        assert_eq!(reply.id.as_deref(), Some("a1b2c3"));
        assert_eq!(reply.success, Some(true));

        let reply: AddItemReply = serde_json::from_str(
            r#"{"error": {"code": 409, "message": "Item already exists", "details": []}}"#,
        )
        .unwrap();
        assert_eq!(reply.error.unwrap().describe(), "409: Item already exists");
    }

    #[test]
    fn test_parse_item_reply() {
        let reply: ItemReply = serde_json::from_str(
            r#"{"id": "a1b2c3", "title": "th", "url": "https://tiles.example/th/MapServer"}"#,
        )
        .unwrap();
        assert_eq!(
            reply.url.as_deref(),
            Some("https://tiles.example/th/MapServer")
        );
        assert!(reply.error.is_none());
    }

    #[test]
    fn test_error_body_fallbacks() {
        let body = ErrorBody {
            code: None,
            message: None,
        };
        assert_eq!(body.describe(), "unspecified error");
    }

    #[test]
    fn test_upload_then_resolve() {
        let stub = Stub::start(vec![
            Reply::Json(200, r#"{"success": true, "id": "a1b2c3", "folder": ""}"#),
            Reply::Json(
                200,
                r#"{"id": "a1b2c3", "url": "https://tiles.example/th/MapServer"}"#,
            ),
        ]);
        let catalog = stub.catalog(Duration::from_secs(5));
        let draft = draft("ok");
        let id = catalog.upload(&draft, &draft.manifest.name).unwrap();
        assert_eq!(id, CatalogId::new("a1b2c3"));
        assert_eq!(
            catalog.resolve(&id).unwrap(),
            "https://tiles.example/th/MapServer"
        );

        let requests = stub.requests();
        assert!(requests[0].starts_with(&format!(
            "POST /sharing/rest/content/users/forester/addItem?f=json&name={}",
            draft.manifest.name
        )));
        assert!(requests[1].starts_with("GET /sharing/rest/content/items/a1b2c3?f=json"));
    }

    #[test]
    fn test_upload_rejections() {
        let cases = [
            (Reply::Json(500, "{}"), "HTTP 500"),
            (
                Reply::Json(
                    200,
                    r#"{"error": {"code": 409, "message": "Item already exists"}}"#,
                ),
                "409: Item already exists",
            ),
            (Reply::Json(200, r#"{"success": true}"#), "no item id"),
            (Reply::Json(200, r#"{"success": true, "id": ""}"#), "no item id"),
            (
                Reply::Json(200, r#"{"success": false, "id": "a1b2c3"}"#),
                "reported failure",
            ),
            (Reply::Json(200, "not json"), ""),
        ];
        let draft = draft("rejected");
        for (reply, expected) in cases {
            let stub = Stub::start(vec![reply]);
            let catalog = stub.catalog(Duration::from_secs(5));
            match catalog.upload(&draft, "th_raster") {
                Err(ForestryError::Publish { name, reason }) => {
                    assert_eq!(name, "th_raster");
                    assert!(reason.contains(expected), "{reason:?} lacks {expected:?}");
                }
                other => panic!("expected Publish, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_resolve_rejections() {
        for body in [
            r#"{"id": "a1b2c3"}"#,
            r#"{"id": "a1b2c3", "url": ""}"#,
            r#"{"error": {"code": 400, "message": "Item does not exist"}}"#,
        ] {
            let stub = Stub::start(vec![Reply::Json(200, body)]);
            let catalog = stub.catalog(Duration::from_secs(5));
            assert!(matches!(
                catalog.resolve(&CatalogId::new("a1b2c3")),
                Err(ForestryError::Resolve { .. })
            ));
        }
    }

    #[test]
    fn test_silent_catalog_times_out() {
        let timeout = Duration::from_millis(200);
        let stub = Stub::start(vec![Reply::Silent, Reply::Silent]);
        let catalog = stub.catalog(timeout);
        let draft = draft("silent");
        match catalog.upload(&draft, "th_raster") {
            Err(ForestryError::Timeout { stage, elapsed }) => {
                assert_eq!(stage, Stage::Upload);
                assert_eq!(elapsed, timeout);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert!(matches!(
            catalog.resolve(&CatalogId::new("a1b2c3")),
            Err(ForestryError::Timeout {
                stage: Stage::Resolve,
                ..
            })
        ));
    }
}
