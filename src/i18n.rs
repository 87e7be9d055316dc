//! User-facing strings in Chinese and English.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    Zh,
    En,
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "cn" => Ok(Lang::Zh),
            "en" | "en-us" | "en-gb" => Ok(Lang::En),
            other => Err(format!("unsupported language `{other}` (expected zh or en)")),
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lang::Zh => "zh",
            Lang::En => "en",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    HeroTitle,
    NewChat,
    ChatPlaceholder,
    AgentThinking,
    PlanningComplete,
    GeneratingCode,
    CodeComplete,
    SavedTo,
    NoArtifact,
    ErrorMessage,
    ErrorFetchFailed,
    ErrorTooManyRequests,
    ErrorSignIn,
    Busy,
    RecentPpts,
    GalleryEmpty,
    GalleryEmptyHint,
    GalleryLoadFailed,
    MoreSlides,
    PreviewFailed,
    AdvisorTitle,
    AdvisorStartFailed,
    AdvisorSendFailed,
    ReadingProfile,
    RecommendedForYou,
    AlreadyAvailable,
    Uncategorized,
    NormalDifficulty,
    Unknown,
}

pub fn tr(key: Key, lang: Lang) -> &'static str {
    let (zh, en) = match key {
        Key::HeroTitle => ("今天读点啥", "What to Read Today"),
        Key::NewChat => ("新对话", "New Chat"),
        Key::ChatPlaceholder => (
            "AI 生成结果具有随机性，您可在此输入修改意见",
            "Results are random. Enter your modifications here for adjustments.",
        ),
        Key::AgentThinking => (
            "Agent 正在进行思考与规划，请稍后。这可能需要数十秒至数分钟...",
            "The agent is thinking and planning, please wait...",
        ),
        Key::PlanningComplete => (
            "思考与规划完成，开始生成内容...",
            "Planning complete, generating content...",
        ),
        Key::GeneratingCode => ("生成代码中...", "Generating code..."),
        Key::CodeComplete => ("代码已完成", "Code generated"),
        Key::SavedTo => ("已保存到", "Saved to"),
        Key::NoArtifact => ("本次生成没有产出演示文稿", "This generation produced no presentation"),
        Key::ErrorMessage => (
            "抱歉，服务出现了一点问题。请稍后重试。",
            "Sorry, something went wrong. Please try again later.",
        ),
        Key::ErrorFetchFailed => (
            "LLM服务不可用，请稍后再试",
            "LLM service is unavailable. Please try again later.",
        ),
        Key::ErrorTooManyRequests => (
            "今天已经使用太多，请明天再试",
            "Too many requests today. Please try again tomorrow.",
        ),
        Key::ErrorSignIn => ("请先登录后再使用推荐功能", "Please sign in to use recommendations."),
        Key::Busy => ("正在生成中，请等待当前请求完成", "A generation is already running."),
        Key::RecentPpts => ("最近生成的PPT", "Recent PPTs"),
        Key::GalleryEmpty => ("还没有生成任何PPT", "No presentations generated yet"),
        Key::GalleryEmptyHint => (
            "输入书名开始创建吧！",
            "Enter a book title to create your first one!",
        ),
        Key::GalleryLoadFailed => ("加载PPT列表失败", "Failed to load presentations"),
        Key::MoreSlides => ("还有 {n} 页", "{n} more slides"),
        Key::PreviewFailed => ("预览加载失败", "Preview unavailable"),
        Key::AdvisorTitle => ("私人阅读顾问", "Personal Reading Advisor"),
        Key::AdvisorStartFailed => (
            "抱歉，启动推荐服务时出现问题，请稍后重试。",
            "Sorry, the recommendation service could not start. Please try again later.",
        ),
        Key::AdvisorSendFailed => (
            "抱歉，发送消息时出现问题，请稍后重试。",
            "Sorry, the message could not be sent. Please try again later.",
        ),
        Key::ReadingProfile => ("您的阅读档案", "Your reading profile"),
        Key::RecommendedForYou => ("为您推荐", "Recommended for you"),
        Key::AlreadyAvailable => ("已有内容", "Available"),
        Key::Uncategorized => ("未分类", "Uncategorized"),
        Key::NormalDifficulty => ("普通", "Normal"),
        Key::Unknown => ("未知", "Unknown"),
    };
    match lang {
        Lang::Zh => zh,
        Lang::En => en,
    }
}

/// Example topics cycled through the empty input box.
pub fn placeholders(lang: Lang) -> &'static [&'static str] {
    match lang {
        Lang::Zh => &["活着", "百年孤独", "人类简史", "时间简史"],
        Lang::En => &[
            "Sapiens",
            "One Hundred Years of Solitude",
            "A Brief History of Time",
        ],
    }
}
