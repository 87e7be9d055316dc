//! Conversational book recommendation agent.

use crate::client::{ApiClient, ClientResult, join_url};
use crate::error::ClientError;
use crate::i18n::{Key, Lang, tr};
use crate::protocol::{AgentReply, BookRecommendation, Role, StartResponse, Turn, UserProfile};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The guided agent only knows a single demo user.
pub const DEFAULT_USER_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorMode {
    /// Signed-in flow backed by the reading profile.
    Guided { user_id: u64 },
    /// Guest flow, no sign-in required.
    Standalone,
}

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("recommendation session not started")]
    NotStarted,
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl AdvisorError {
    pub fn notice(&self, lang: Lang) -> &'static str {
        match self {
            Self::Client(ClientError::Unauthenticated) => tr(Key::ErrorSignIn, lang),
            Self::Client(ClientError::RateLimited) => tr(Key::ErrorTooManyRequests, lang),
            Self::NotStarted => tr(Key::AdvisorStartFailed, lang),
            Self::Client(_) => tr(Key::AdvisorSendFailed, lang),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentTurn {
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(rename = "text")]
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<BookRecommendation>,
    pub timestamp: DateTime<Utc>,
}

pub struct RecommendationAgent {
    client: ApiClient,
    mode: AdvisorMode,
    session_id: Option<String>,
    active: bool,
    history: Vec<AgentTurn>,
}

impl RecommendationAgent {
    pub fn new(client: ApiClient, mode: AdvisorMode) -> Self {
        Self {
            client,
            mode,
            session_id: None,
            active: false,
            history: Vec::new(),
        }
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.active
    }

    #[cfg(test)]
    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn history(&self) -> &[AgentTurn] {
        &self.history
    }

    /// Opens a session and records the agent's greeting.
    pub async fn start(&mut self, seed_mock_data: bool) -> ClientResult<StartResponse> {
        let response = match self.mode {
            AdvisorMode::Guided { user_id } => {
                if seed_mock_data {
                    self.client.recommendation_mock_data().await?;
                }
                self.client.recommendation_start(user_id).await?
            }
            AdvisorMode::Standalone => self.client.standalone_start().await?,
        };

        self.session_id = response.session_id.clone();
        self.active = true;
        self.push(Role::Assistant, response.message.clone(), Vec::new());
        info!(session = ?self.session_id, mode = ?self.mode, "recommendation session started");
        Ok(response)
    }

    pub async fn send(&mut self, message: &str) -> Result<AgentReply, AdvisorError> {
        if !self.active {
            return Err(AdvisorError::NotStarted);
        }

        let reply = match self.mode {
            AdvisorMode::Guided { user_id } => {
                self.client.recommendation_chat(message, user_id).await?
            }
            AdvisorMode::Standalone => self.client.standalone_chat(message).await?,
        };

        self.push(Role::User, message.to_string(), Vec::new());
        self.push(
            Role::Assistant,
            reply.message.clone(),
            reply.recommendations.clone(),
        );
        Ok(reply)
    }

    /// Current recommendations. Guests get the most recent list they were shown.
    pub async fn recommendations(&self) -> ClientResult<Vec<BookRecommendation>> {
        match self.mode {
            AdvisorMode::Guided { .. } => self.client.recommendation_list().await,
            AdvisorMode::Standalone => Ok(self
                .history
                .iter()
                .rev()
                .find(|turn| !turn.recommendations.is_empty())
                .map(|turn| turn.recommendations.clone())
                .unwrap_or_default()),
        }
    }

    pub fn clear(&mut self) {
        self.session_id = None;
        self.active = false;
        self.history.clear();
    }

    fn push(&mut self, role: Role, message: String, recommendations: Vec<BookRecommendation>) {
        self.history.push(AgentTurn {
            role,
            message,
            recommendations,
            timestamp: Utc::now(),
        });
    }

    pub fn transcript(&self) -> Transcript {
        Transcript {
            messages: self.history.clone(),
            session_id: self.session_id.clone(),
            taken_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TranscriptMetadata<'a> {
    client: String,
    platform: &'static str,
    session_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct FullTranscript<'a> {
    timestamp: DateTime<Utc>,
    messages: &'a [AgentTurn],
    metadata: TranscriptMetadata<'a>,
}

/// Snapshot of the conversation, exported in full and role/content-only form.
pub struct Transcript {
    messages: Vec<AgentTurn>,
    session_id: Option<String>,
    taken_at: DateTime<Utc>,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn full(&self) -> FullTranscript<'_> {
        FullTranscript {
            timestamp: self.taken_at,
            messages: &self.messages,
            metadata: TranscriptMetadata {
                client: format!("bookdeck/{}", env!("CARGO_PKG_VERSION")),
                platform: std::env::consts::OS,
                session_id: self.session_id.as_deref(),
            },
        }
    }

    fn compressed(&self) -> Vec<Turn> {
        self.messages
            .iter()
            .map(|turn| Turn {
                role: turn.role,
                content: turn.message.clone(),
            })
            .collect()
    }

    /// Writes both forms into `dir` and returns (full, compressed) paths.
    /// Nothing is written for an empty conversation.
    pub async fn save(&self, dir: &Path) -> std::io::Result<Option<(PathBuf, PathBuf)>> {
        if self.is_empty() {
            warn!("nothing to save in the recommendation transcript");
            return Ok(None);
        }
        let day = self.taken_at.format("%Y-%m-%d");
        let full_path = dir.join(format!("chat_history_full_{day}.json"));
        let compressed_path = dir.join(format!("chat_history_{day}.json"));

        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&full_path, serde_json::to_vec_pretty(&self.full())?).await?;
        tokio::fs::write(&compressed_path, serde_json::to_vec_pretty(&self.compressed())?).await?;
        info!(path = %full_path.display(), "saved recommendation transcript");
        Ok(Some((full_path, compressed_path)))
    }
}

pub fn profile_lines(profile: &UserProfile, lang: Lang) -> Vec<String> {
    let unknown = tr(Key::Unknown, lang);
    let (frequency, categories, stage, needs) = match lang {
        Lang::Zh => ("阅读频率", "偏好类别", "当前阶段", "情感需求"),
        Lang::En => ("Reading frequency", "Preferred categories", "Life stage", "Emotional needs"),
    };
    vec![
        format!("── {} ──", tr(Key::ReadingProfile, lang)),
        format!(
            "{frequency}: {}",
            profile.reading_frequency.as_deref().unwrap_or(unknown)
        ),
        format!("{categories}: {}", profile.preferred_categories.join(", ")),
        format!(
            "{stage}: {}",
            profile.current_life_stage.as_deref().unwrap_or(unknown)
        ),
        format!("{needs}: {}", profile.emotional_needs.join(", ")),
    ]
}

pub fn recommendation_lines(books: &[BookRecommendation], base_url: &str, lang: Lang) -> Vec<String> {
    if books.is_empty() {
        return Vec::new();
    }
    let (author_label, reason_label) = match lang {
        Lang::Zh => ("作者", "推荐理由"),
        Lang::En => ("Author", "Why"),
    };

    let mut lines = vec![format!("── {} ({}) ──", tr(Key::RecommendedForYou, lang), books.len())];
    for book in books {
        lines.push(format!("《{}》", book.title));
        lines.push(format!("  {author_label}: {}", book.author));
        let category = book
            .category
            .as_deref()
            .unwrap_or(tr(Key::Uncategorized, lang));
        let difficulty = book
            .difficulty
            .as_deref()
            .unwrap_or(tr(Key::NormalDifficulty, lang));
        let mut tags = format!("  [{category}] [{difficulty}]");
        if book.has_content {
            tags.push_str(&format!(" [{}]", tr(Key::AlreadyAvailable, lang)));
        }
        lines.push(tags);
        if let Some(description) = book.description.as_deref().filter(|d| !d.is_empty()) {
            lines.push(format!("  {description}"));
        }
        if let Some(reason) = book.reason.as_deref().filter(|r| !r.is_empty()) {
            lines.push(format!("  {reason_label}: {reason}"));
        }
        if let (true, Some(content_id)) = (book.has_content, book.content_id.as_deref()) {
            lines.push(format!(
                "  {}",
                join_url(base_url, &format!("/outputs/{content_id}/presentation.html"))
            ));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use axum::Json;
    use axum::Router;
    use axum::routing::post;
    use serde_json::json;

    fn book(title: &str, has_content: bool) -> BookRecommendation {
        BookRecommendation {
            title: title.to_string(),
            author: "余华".to_string(),
            category: None,
            description: None,
            reason: Some("温暖而克制".to_string()),
            difficulty: None,
            has_content,
            content_id: has_content.then(|| "abc".to_string()),
        }
    }

    fn offline_client() -> ApiClient {
        ApiClient::new(ClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            token: None,
        })
    }

    #[tokio::test]
    async fn send_before_start_is_rejected() {
        let mut agent = RecommendationAgent::new(offline_client(), AdvisorMode::Standalone);
        let err = agent.send("hi").await.unwrap_err();
        assert!(matches!(err, AdvisorError::NotStarted));
        assert!(agent.history().is_empty());
    }

    #[tokio::test]
    async fn standalone_conversation_records_history() {
        let app = Router::new()
            .route(
                "/api/standalone-recommendation/start",
                post(|| async {
                    Json(json!({
                        "message": "你好，我是你的阅读顾问",
                        "session_id": "standalone_session_1",
                        "user_info": {"id": 0, "username": "访客用户"}
                    }))
                }),
            )
            .route(
                "/api/standalone-recommendation/chat",
                post(|Json(body): Json<serde_json::Value>| async move {
                    assert!(body.get("user_id").is_none());
                    Json(json!({
                        "message": format!("关于「{}」的推荐", body["message"].as_str().unwrap()),
                        "recommendations": [{"title": "活着", "author": "余华", "reason": "经典"}]
                    }))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = ApiClient::new(ClientConfig {
            base_url: format!("http://{addr}"),
            token: None,
        });

        let mut agent = RecommendationAgent::new(client, AdvisorMode::Standalone);
        let start = agent.start(false).await.unwrap();
        assert_eq!(start.user_info.unwrap().username.as_deref(), Some("访客用户"));
        assert_eq!(agent.session_id(), Some("standalone_session_1"));

        let reply = agent.send("小说").await.unwrap();
        assert_eq!(reply.message, "关于「小说」的推荐");
        assert_eq!(agent.history().len(), 3);
        assert_eq!(agent.recommendations().await.unwrap()[0].title, "活着");

        let transcript = agent.transcript();
        let roles: Vec<_> = transcript.compressed().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);

        agent.clear();
        assert!(!agent.is_active());
        assert!(agent.transcript().is_empty());
    }

    fn transcript_of(messages: Vec<AgentTurn>) -> Transcript {
        Transcript {
            messages,
            session_id: Some("standalone_session_1".to_string()),
            taken_at: "2025-03-04T10:00:00Z".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn transcript_saves_full_and_compressed_files() {
        let turns = vec![
            AgentTurn {
                role: Role::Assistant,
                message: "你好".to_string(),
                recommendations: Vec::new(),
                timestamp: Utc::now(),
            },
            AgentTurn {
                role: Role::User,
                message: "小说".to_string(),
                recommendations: vec![book("活着", false)],
                timestamp: Utc::now(),
            },
        ];
        let dir = std::env::temp_dir().join(format!("bookdeck-transcript-{}", uuid::Uuid::new_v4()));

        let (full, compressed) = transcript_of(turns).save(&dir).await.unwrap().unwrap();
        assert_eq!(full.file_name().unwrap(), "chat_history_full_2025-03-04.json");
        assert_eq!(compressed.file_name().unwrap(), "chat_history_2025-03-04.json");

        let full: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&full).await.unwrap()).unwrap();
        assert_eq!(full["timestamp"], "2025-03-04T10:00:00Z");
        assert_eq!(full["messages"][0]["type"], "assistant");
        assert_eq!(full["messages"][1]["text"], "小说");
        assert_eq!(full["messages"][1]["recommendations"][0]["title"], "活着");
        assert!(full["messages"][0].get("recommendations").is_none());
        assert_eq!(full["metadata"]["session_id"], "standalone_session_1");
        assert!(full["metadata"]["client"].as_str().unwrap().starts_with("bookdeck/"));

        let compressed: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&compressed).await.unwrap()).unwrap();
        assert_eq!(
            compressed,
            json!([
                {"role": "assistant", "content": "你好"},
                {"role": "user", "content": "小说"}
            ])
        );
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn empty_transcript_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("bookdeck-transcript-{}", uuid::Uuid::new_v4()));
        assert!(transcript_of(Vec::new()).save(&dir).await.unwrap().is_none());
        assert!(!dir.exists());
    }

    #[test]
    fn recommendation_lines_show_defaults_and_links() {
        let lines = recommendation_lines(&[book("活着", true)], "http://host", Lang::Zh);
        assert_eq!(lines[0], "── 为您推荐 (1) ──");
        assert_eq!(lines[1], "《活着》");
        assert_eq!(lines[3], "  [未分类] [普通] [已有内容]");
        assert_eq!(lines[4], "  推荐理由: 温暖而克制");
        assert_eq!(lines[5], "  http://host/outputs/abc/presentation.html");
        assert!(recommendation_lines(&[], "http://host", Lang::Zh).is_empty());
    }

    #[test]
    fn profile_lines_fill_unknowns() {
        let lines = profile_lines(&UserProfile::default(), Lang::En);
        assert_eq!(lines[1], "Reading frequency: Unknown");
    }
}
