//! View model for the gallery of generated presentations.

use crate::client::join_url;
use crate::i18n::{Key, Lang, tr};
use crate::protocol::{Pagination, PptList, PptPreview, PptSummary};
use std::time::Duration;

pub const DEFAULT_CATEGORY: &str = "文学类";
const DEFAULT_BADGE_COLOR: &str = "#E74C3C";
const GRADIENT_PREFIX: &str = "gradient:";
const PREVIEW_SLIDES: usize = 2;
const SHORT_ID_LEN: usize = 8;

const FALLBACK_GRADIENTS: [&str; 6] = [
    "linear-gradient(135deg, #667eea 0%, #764ba2 100%)",
    "linear-gradient(135deg, #f093fb 0%, #f5576c 100%)",
    "linear-gradient(135deg, #4facfe 0%, #00f2fe 100%)",
    "linear-gradient(135deg, #43e97b 0%, #38f9d7 100%)",
    "linear-gradient(135deg, #fa709a 0%, #fee140 100%)",
    "linear-gradient(135deg, #a8edea 0%, #fed6e3 100%)",
];

const BOOK_ICONS: [&str; 6] = ["📖", "📚", "📘", "📙", "📗", "📕"];

/// Picks up to `count` presentations, preferring one per category.
///
/// Categories are visited in the order they first appear and the first
/// (newest) item of each is taken; remaining slots are filled in list order.
pub fn select_diverse(ppts: &[PptSummary], count: usize) -> Vec<&PptSummary> {
    if ppts.len() <= count {
        return ppts.iter().collect();
    }

    let mut seen_categories: Vec<&str> = Vec::new();
    let mut selected: Vec<usize> = Vec::new();
    for (idx, ppt) in ppts.iter().enumerate() {
        let category = ppt.category_name.as_deref().unwrap_or(DEFAULT_CATEGORY);
        if seen_categories.contains(&category) {
            continue;
        }
        seen_categories.push(category);
        if selected.len() < count {
            selected.push(idx);
        }
    }

    for idx in 0..ppts.len() {
        if selected.len() >= count {
            break;
        }
        if !selected.contains(&idx) {
            selected.push(idx);
        }
    }

    selected.into_iter().map(|idx| &ppts[idx]).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cover {
    Image { url: String },
    Gradient { css: String, icon: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub icon: String,
    pub name: String,
    pub color: String,
}

fn badge(ppt: &PptSummary) -> Option<Badge> {
    match (&ppt.category_name, &ppt.category_icon) {
        (Some(name), Some(icon)) if !name.is_empty() && !icon.is_empty() => Some(Badge {
            icon: icon.clone(),
            name: name.clone(),
            color: ppt
                .category_color
                .clone()
                .unwrap_or_else(|| DEFAULT_BADGE_COLOR.to_string()),
        }),
        _ => None,
    }
}

/// Card shown in the "recent presentations" strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowcaseCard {
    pub title: String,
    pub created_time: String,
    pub cover: Cover,
    pub badge: Option<Badge>,
    pub link: String,
    pub animation_delay: Duration,
}

pub fn showcase_card(ppt: &PptSummary, index: usize, base_url: &str) -> ShowcaseCard {
    let cover = match ppt.cover_url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) if !url.starts_with(GRADIENT_PREFIX) => Cover::Image {
            url: join_url(base_url, url),
        },
        Some(url) => Cover::Gradient {
            css: url[GRADIENT_PREFIX.len()..].to_string(),
            icon: BOOK_ICONS[index % BOOK_ICONS.len()],
        },
        None => Cover::Gradient {
            css: FALLBACK_GRADIENTS[index % FALLBACK_GRADIENTS.len()].to_string(),
            icon: BOOK_ICONS[index % BOOK_ICONS.len()],
        },
    };

    ShowcaseCard {
        title: ppt.title.clone(),
        created_time: ppt.created_time.clone(),
        cover,
        badge: badge(ppt),
        link: join_url(base_url, &ppt.html_url),
        animation_delay: Duration::from_millis(150 * index as u64),
    }
}

impl ShowcaseCard {
    pub fn lines(&self) -> Vec<String> {
        let icon = match &self.cover {
            Cover::Image { .. } => "🖼",
            Cover::Gradient { icon, .. } => *icon,
        };
        let mut lines = vec![format!("{icon} {}", self.title)];
        let mut meta = format!("   {}", self.created_time);
        if let Some(badge) = &self.badge {
            meta.push_str(&format!("  [{} {}]", badge.icon, badge.name));
        }
        lines.push(meta);
        if let Cover::Image { url } = &self.cover {
            lines.push(format!("   cover: {url}"));
        }
        lines.push(format!("   {}", self.link));
        lines
    }
}

/// Card in the paginated gallery listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryCard {
    pub session_id: String,
    pub title: String,
    pub created_time: String,
    pub short_id: String,
    pub badge: Option<Badge>,
    pub link: String,
}

pub fn gallery_card(ppt: &PptSummary, base_url: &str) -> GalleryCard {
    GalleryCard {
        session_id: ppt.session_id.clone(),
        title: ppt.title.clone(),
        created_time: ppt.created_time.clone(),
        short_id: format!(
            "{}...",
            ppt.session_id.chars().take(SHORT_ID_LEN).collect::<String>()
        ),
        badge: badge(ppt),
        link: join_url(base_url, &ppt.html_url),
    }
}

impl GalleryCard {
    pub fn lines(&self) -> Vec<String> {
        let mut meta = format!("   {}  {}", self.created_time, self.short_id);
        if let Some(badge) = &self.badge {
            meta.push_str(&format!("  [{} {}]", badge.icon, badge.name));
        }
        vec![
            format!("■ {}", self.title),
            meta,
            format!("   {}", self.link),
        ]
    }
}

/// First slides of a presentation plus a "more" line.
pub fn preview_lines(preview: &PptPreview, lang: Lang) -> Vec<String> {
    let mut lines = Vec::new();
    for slide in preview.preview_slides.iter().take(PREVIEW_SLIDES) {
        lines.push(format!("   · {}", slide.title));
        let content = slide.content.trim();
        if !content.is_empty() {
            lines.push(format!("     {}", truncate_chars(content, 80)));
        }
    }
    if preview.total_slides as usize > PREVIEW_SLIDES {
        let remaining = preview.total_slides as usize - PREVIEW_SLIDES;
        lines.push(format!(
            "   ... {}",
            tr(Key::MoreSlides, lang).replace("{n}", &remaining.to_string())
        ));
    }
    lines
}

pub fn preview_failed_line(lang: Lang) -> String {
    format!("   {}", tr(Key::PreviewFailed, lang))
}

pub fn pagination_line(pagination: &Pagination, lang: Lang) -> String {
    match lang {
        Lang::Zh => format!(
            "第 {}/{} 页，共 {} 个（每页 {} 个）",
            pagination.current_page,
            pagination.total_pages,
            pagination.total_count,
            pagination.per_page
        ),
        Lang::En => format!(
            "Page {}/{}, {} total ({} per page)",
            pagination.current_page,
            pagination.total_pages,
            pagination.total_count,
            pagination.per_page
        ),
    }
}

/// What the gallery shows for a finished load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryView {
    Cards {
        cards: Vec<GalleryCard>,
        footer: Option<String>,
    },
    Empty,
    Failed,
}

impl GalleryView {
    pub fn from_list(list: &PptList, base_url: &str, lang: Lang) -> Self {
        if list.ppts.is_empty() {
            return Self::Empty;
        }
        Self::Cards {
            cards: list.ppts.iter().map(|ppt| gallery_card(ppt, base_url)).collect(),
            footer: list.pagination.as_ref().map(|p| pagination_line(p, lang)),
        }
    }

    pub fn lines(&self, lang: Lang) -> Vec<String> {
        match self {
            Self::Cards { cards, footer } => {
                let mut lines = Vec::new();
                for card in cards {
                    lines.extend(card.lines());
                }
                if let Some(footer) = footer {
                    lines.push(footer.clone());
                }
                lines
            }
            Self::Empty => vec![
                tr(Key::GalleryEmpty, lang).to_string(),
                tr(Key::GalleryEmptyHint, lang).to_string(),
            ],
            Self::Failed => vec![tr(Key::GalleryLoadFailed, lang).to_string()],
        }
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        let head: String = value.chars().take(max).collect();
        format!("{head}...")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SlidePreview;

    fn ppt(id: &str, category: Option<&str>) -> PptSummary {
        PptSummary {
            session_id: id.to_string(),
            title: format!("Book {id}"),
            created_time: "2025-03-01 09:30".to_string(),
            html_url: format!("/outputs/{id}/presentation.html"),
            preview_url: None,
            cover_url: None,
            category_id: None,
            category_name: category.map(str::to_string),
            category_color: None,
            category_icon: category.map(|_| "📖".to_string()),
        }
    }

    fn ids(selected: &[&PptSummary]) -> Vec<String> {
        selected.iter().map(|p| p.session_id.clone()).collect()
    }

    #[test]
    fn diverse_selection_prefers_one_per_category() {
        let ppts = vec![
            ppt("a", Some("文学类")),
            ppt("b", Some("文学类")),
            ppt("c", Some("心理学")),
            ppt("d", None),
            ppt("e", Some("历史")),
        ];
        // `d` has no category and falls into the default literature bucket.
        assert_eq!(ids(&select_diverse(&ppts, 3)), vec!["a", "c", "e"]);
    }

    #[test]
    fn diverse_selection_fills_from_remaining_items() {
        let ppts = vec![
            ppt("a", Some("文学类")),
            ppt("b", Some("文学类")),
            ppt("c", Some("文学类")),
            ppt("d", Some("心理学")),
        ];
        assert_eq!(ids(&select_diverse(&ppts, 3)), vec!["a", "d", "b"]);
        assert_eq!(select_diverse(&ppts[..2], 3).len(), 2);
    }

    #[test]
    fn showcase_cover_variants() {
        let mut with_image = ppt("a", None);
        with_image.cover_url = Some("/covers/a.jpg".to_string());
        let card = showcase_card(&with_image, 0, "http://host");
        assert_eq!(
            card.cover,
            Cover::Image {
                url: "http://host/covers/a.jpg".to_string()
            }
        );

        let mut gradient = ppt("b", None);
        gradient.cover_url = Some("gradient:linear-gradient(red, blue)".to_string());
        let card = showcase_card(&gradient, 1, "http://host");
        assert_eq!(
            card.cover,
            Cover::Gradient {
                css: "linear-gradient(red, blue)".to_string(),
                icon: "📚"
            }
        );

        let card = showcase_card(&ppt("c", None), 7, "http://host");
        assert_eq!(
            card.cover,
            Cover::Gradient {
                css: FALLBACK_GRADIENTS[1].to_string(),
                icon: "📚"
            }
        );
        assert_eq!(card.animation_delay, Duration::from_millis(1050));
    }

    #[test]
    fn badge_needs_name_and_icon_and_defaults_color() {
        let card = gallery_card(&ppt("0123456789abcdef", Some("心理学")), "http://host");
        assert_eq!(
            card.badge,
            Some(Badge {
                icon: "📖".to_string(),
                name: "心理学".to_string(),
                color: "#E74C3C".to_string(),
            })
        );
        assert_eq!(card.short_id, "01234567...");
        assert_eq!(card.link, "http://host/outputs/0123456789abcdef/presentation.html");

        let mut no_icon = ppt("x", Some("历史"));
        no_icon.category_icon = None;
        assert_eq!(gallery_card(&no_icon, "http://host").badge, None);
    }

    #[test]
    fn preview_shows_two_slides_and_remaining_count() {
        let preview = PptPreview {
            preview_slides: vec![
                SlidePreview {
                    title: "封面".to_string(),
                    content: "活着".to_string(),
                },
                SlidePreview {
                    title: "作者".to_string(),
                    content: String::new(),
                },
                SlidePreview {
                    title: "hidden".to_string(),
                    content: String::new(),
                },
            ],
            total_slides: 5,
        };
        let lines = preview_lines(&preview, Lang::En);
        assert_eq!(
            lines,
            vec!["   · 封面", "     活着", "   · 作者", "   ... 3 more slides"]
        );
    }

    #[test]
    fn empty_list_renders_empty_state() {
        let view = GalleryView::from_list(&PptList::default(), "http://host", Lang::En);
        assert_eq!(view, GalleryView::Empty);
        assert_eq!(view.lines(Lang::En)[0], "No presentations generated yet");
    }
}
