use crate::error::ClientError;
use crate::protocol::{
    AgentReply, BookHit, BookRecommendation, BookSearchResponse, GenerateRequest, PptList,
    PptPreview, RecommendationChatRequest, RecommendationList, RecommendationStartRequest,
    StartResponse, StreamRecord, UserInfo,
};
use crate::sse;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client as HttpClient, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tracing::{debug, info};

pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Records of one `/generate` response, in arrival order.
pub type RecordStream = BoxStream<'static, StreamRecord>;

/// Falls back to the token file when no token was given on the command line
/// or in the environment. Anonymous access is allowed.
pub fn resolve_token(explicit: Option<String>) -> Option<String> {
    if let Some(token) = explicit.filter(|t| !t.trim().is_empty()) {
        return Some(token);
    }

    let token = std::fs::read_to_string(token_path()).ok()?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn token_path() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".bookdeck").join("token");
    }

    PathBuf::from("bookdeck.token")
}

#[derive(Debug, Clone, Default)]
pub struct GalleryQuery {
    pub limit: u32,
    pub page: u32,
    pub category_id: Option<String>,
    pub search: Option<String>,
}

impl GalleryQuery {
    pub fn first(limit: u32) -> Self {
        Self {
            limit,
            page: 1,
            ..Self::default()
        }
    }

    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("limit", self.limit.to_string()),
            ("page", self.page.max(1).to_string()),
        ];
        if let Some(category) = self.category_id.as_deref().filter(|c| !c.is_empty()) {
            pairs.push(("category_id", category.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        pairs
    }
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: HttpClient,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            base_url: normalize_base_url(&config.base_url),
            token: config.token,
            http: HttpClient::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a server-relative path such as a presentation link.
    pub fn absolute_url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        Url::parse(&self.absolute_url(path))
            .map_err(|e| ClientError::Transport(format!("invalid URL for {path}: {e}")))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> ClientResult<Response> {
        let response = self.authorized(builder).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            debug!(status, %body, "request failed");
            return Err(ClientError::from_status(status, body));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ClientResult<T> {
        let response = self.send(self.http.get(url)).await?;
        Ok(response.json().await?)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(self.http.post(self.url(path)?).json(body)).await?;
        Ok(response.json().await?)
    }

    /// Starts a generation and returns its decoded record stream.
    ///
    /// Generation does not require sign-in, so a 401 here is an ordinary
    /// status failure rather than `Unauthenticated`.
    pub async fn generate(&self, request: &GenerateRequest) -> ClientResult<RecordStream> {
        info!(topic = %request.topic, turns = request.history.len(), "starting generation");
        let response = self
            .send(self.http.post(self.url("/generate")?).json(request))
            .await
            .map_err(|err| match err {
                ClientError::Unauthenticated => ClientError::Status {
                    status: 401,
                    body: "unauthorized".to_string(),
                },
                other => other,
            })?;
        Ok(sse::records(response.bytes_stream()).boxed())
    }

    pub async fn list_ppts(&self, query: &GalleryQuery) -> ClientResult<PptList> {
        let mut url = self.url("/api/generated-ppts")?;
        url.query_pairs_mut().extend_pairs(query.pairs());
        self.get_json(url).await
    }

    pub async fn ppt_preview(&self, session_id: &str) -> ClientResult<PptPreview> {
        self.get_json(self.url(&format!("/api/ppt-preview/{session_id}"))?)
            .await
    }

    pub async fn recommendation_mock_data(&self) -> ClientResult<()> {
        self.send(self.http.post(self.url("/api/recommendation/mock-data")?))
            .await?;
        Ok(())
    }

    pub async fn recommendation_start(&self, user_id: u64) -> ClientResult<StartResponse> {
        self.post_json(
            "/api/recommendation/start",
            &RecommendationStartRequest { user_id },
        )
        .await
    }

    pub async fn recommendation_chat(&self, message: &str, user_id: u64) -> ClientResult<AgentReply> {
        self.post_json(
            "/api/recommendation/chat",
            &RecommendationChatRequest {
                message: message.to_string(),
                user_id: Some(user_id),
            },
        )
        .await
    }

    pub async fn recommendation_list(&self) -> ClientResult<Vec<BookRecommendation>> {
        let list: RecommendationList = self
            .get_json(self.url("/api/recommendation/recommendations")?)
            .await?;
        Ok(list.recommendations)
    }

    pub async fn standalone_start(&self) -> ClientResult<StartResponse> {
        self.post_json("/api/standalone-recommendation/start", &serde_json::json!({}))
            .await
    }

    pub async fn standalone_chat(&self, message: &str) -> ClientResult<AgentReply> {
        self.post_json(
            "/api/standalone-recommendation/chat",
            &RecommendationChatRequest {
                message: message.to_string(),
                user_id: None,
            },
        )
        .await
    }

    pub async fn current_user(&self) -> ClientResult<UserInfo> {
        self.get_json(self.url("/api/user")?).await
    }

    pub async fn search_books(&self, query: &str) -> ClientResult<Vec<BookHit>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum SearchBody {
            Wrapped(BookSearchResponse),
            Bare(Vec<BookHit>),
        }

        let mut url = self.url("/api/books/search")?;
        url.query_pairs_mut().append_pair("q", query);
        let body: SearchBody = self.get_json(url).await?;
        Ok(match body {
            SearchBody::Wrapped(response) => response.books,
            SearchBody::Bare(books) => books,
        })
    }
}

fn normalize_base_url(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}

/// Resolves a server-relative link against `base`. Absolute links pass through.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Lang;
    use axum::Json;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::routing::{get, post};
    use serde_json::json;
    use std::collections::HashMap;

    async fn serve(app: Router) -> ApiClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        ApiClient::new(ClientConfig {
            base_url: format!("http://{addr}/"),
            token: Some("secret".to_string()),
        })
    }

    fn request(topic: &str) -> GenerateRequest {
        GenerateRequest {
            topic: topic.to_string(),
            history: vec![crate::protocol::Turn::user(topic)],
        }
    }

    #[test]
    fn absolute_url_joins_relative_links() {
        let client = ApiClient::new(ClientConfig {
            base_url: "http://localhost:8000/".to_string(),
            token: None,
        });
        assert_eq!(
            client.absolute_url("/outputs/abc/presentation.html"),
            "http://localhost:8000/outputs/abc/presentation.html"
        );
        assert_eq!(client.absolute_url("https://cdn/x.png"), "https://cdn/x.png");
    }

    #[test]
    fn gallery_query_omits_empty_filters() {
        let query = GalleryQuery {
            limit: 12,
            page: 0,
            category_id: Some(String::new()),
            search: Some("时间".to_string()),
        };
        assert_eq!(
            query.pairs(),
            vec![
                ("limit", "12".to_string()),
                ("page", "1".to_string()),
                ("search", "时间".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn generate_streams_records_from_the_server() {
        let app = Router::new().route(
            "/generate",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["history"][0]["role"], "user");
                let text = format!(
                    "data: {{\"status\":\"{}\"}}\n\ndata: {{\"token\":\"```html\\n<p>\"}}\n\ndata: {{\"event\":\"[DONE]\"}}\n\n",
                    body["topic"].as_str().unwrap()
                );
                ([(header::CONTENT_TYPE, "text/event-stream")], text)
            }),
        );
        let client = serve(app).await;

        let records: Vec<_> = client.generate(&request("Walden")).await.unwrap().collect().await;
        assert_eq!(
            records,
            vec![
                StreamRecord::Status("Walden".to_string()),
                StreamRecord::Token("```html\n<p>".to_string()),
                StreamRecord::Done,
            ]
        );
    }

    #[tokio::test]
    async fn rate_limit_is_classified() {
        let app = Router::new().route("/generate", post(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let client = serve(app).await;

        let err = client.generate(&request("Walden")).await.err().unwrap();
        assert_eq!(err, ClientError::RateLimited);
    }

    #[tokio::test]
    async fn unauthorized_generate_is_a_plain_status_failure() {
        let app = Router::new().route("/generate", post(|| async { StatusCode::UNAUTHORIZED }));
        let client = serve(app).await;

        let err = client.generate(&request("Walden")).await.err().unwrap();
        assert!(matches!(err, ClientError::Status { status: 401, .. }));
        assert_eq!(err.notice(Lang::En), "LLM service is unavailable. Please try again later.");
    }

    #[tokio::test]
    async fn list_ppts_sends_filters_and_bearer_token() {
        let app = Router::new().route(
            "/api/generated-ppts",
            get(
                |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                    assert_eq!(headers[header::AUTHORIZATION], "Bearer secret");
                    assert_eq!(params.get("category_id").map(String::as_str), Some("efficiency"));
                    assert_eq!(params.get("page").map(String::as_str), Some("2"));
                    Json(json!({
                        "ppts": [{
                            "session_id": "0123456789",
                            "title": "高效能人士的七个习惯",
                            "created_time": "2025-01-01 10:00",
                            "html_url": "/outputs/0123456789/presentation.html"
                        }],
                        "pagination": {"current_page": 2, "total_pages": 3, "total_count": 7, "per_page": 3}
                    }))
                },
            ),
        );
        let client = serve(app).await;

        let list = client
            .list_ppts(&GalleryQuery {
                limit: 3,
                page: 2,
                category_id: Some("efficiency".to_string()),
                search: None,
            })
            .await
            .unwrap();
        assert_eq!(list.ppts.len(), 1);
        assert_eq!(list.pagination.unwrap().total_pages, 3);
    }

    #[tokio::test]
    async fn recommendation_requires_authentication() {
        let app = Router::new().route(
            "/api/recommendation/start",
            post(|| async { (StatusCode::UNAUTHORIZED, "login required") }),
        );
        let client = serve(app).await;

        let err = client.recommendation_start(1).await.unwrap_err();
        assert_eq!(err, ClientError::Unauthenticated);
    }

    #[tokio::test]
    async fn malformed_json_body_is_a_protocol_error() {
        let app = Router::new().route("/api/user", get(|| async { "not json" }));
        let client = serve(app).await;

        let err = client.current_user().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn search_books_accepts_a_bare_array() {
        let app = Router::new().route(
            "/api/books/search",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                Json(json!([{ "title": params["q"], "author": "余华" }]))
            }),
        );
        let client = serve(app).await;

        let books = client.search_books("活着").await.unwrap();
        assert_eq!(books[0].title, "活着");
    }
}
