use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation history sent with every generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub topic: String,
    pub history: Vec<Turn>,
}

/// Decoded frame of the `/generate` stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRecord {
    Log(String),
    Status(String),
    Token(String),
    Done,
    Error(StreamFailure),
}

impl StreamRecord {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

/// Why a record stream ended early.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFailure {
    /// The backend put an `error` field in a frame.
    #[error("{0}")]
    Server(String),
    /// A frame could not be decoded.
    #[error("malformed frame: {0}")]
    Protocol(String),
    /// Reading the response body failed.
    #[error("stream read failed: {0}")]
    Transport(String),
}

/// Frame payload as the backend writes it. Only one field is expected to be set.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FramePayload {
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) log: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PptSummary {
    pub session_id: String,
    pub title: String,
    #[serde(default)]
    pub created_time: String,
    pub html_url: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub category_color: Option<String>,
    #[serde(default)]
    pub category_icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PptList {
    #[serde(default)]
    pub ppts: Vec<PptSummary>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidePreview {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PptPreview {
    #[serde(default)]
    pub preview_slides: Vec<SlidePreview>,
    #[serde(default)]
    pub total_slides: u32,
}

#[derive(Debug, Serialize)]
pub struct RecommendationStartRequest {
    pub user_id: u64,
}

#[derive(Debug, Serialize)]
pub struct RecommendationChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub reading_frequency: Option<String>,
    #[serde(default)]
    pub preferred_categories: Vec<String>,
    #[serde(default)]
    pub current_life_stage: Option<String>,
    #[serde(default)]
    pub emotional_needs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
    #[serde(default)]
    pub user_info: Option<UserInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecommendation {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub has_content: bool,
    #[serde(default)]
    pub content_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub message: String,
    #[serde(default)]
    pub recommendations: Vec<BookRecommendation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendationList {
    #[serde(default)]
    pub recommendations: Vec<BookRecommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookHit {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookSearchResponse {
    #[serde(default)]
    pub books: Vec<BookHit>,
}
