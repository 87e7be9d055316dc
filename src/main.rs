mod client;
mod config;
mod error;
mod fence;
mod gallery;
mod i18n;
mod logging;
mod protocol;
mod recommend;
mod session;
mod sse;
mod ui;
mod view;

use clap::Parser;
use client::{ApiClient, GalleryQuery};
use config::{Cli, Command, GalleryArgs, RecommendArgs};
use i18n::{Key, Lang, tr};
use recommend::{AdvisorError, AdvisorMode, RecommendationAgent};
use session::{ChatSession, GenerationEvent, save_artifact};
use std::path::Path;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use view::ChatView;

type AppResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const SHOWCASE_COUNT: usize = 4;

#[tokio::main]
async fn main() -> AppResult {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command();

    if matches!(command, Command::Chat) {
        logging::init_file(&cli.log_dir);
    } else {
        logging::init_stderr();
    }

    let client = ApiClient::new(cli.client_config());
    let lang = cli.lang;

    match command {
        Command::Chat => ui::run_tui(client, lang, cli.out_dir.clone()),
        Command::Generate { topic } => generate(&client, &topic.join(" "), &cli.out_dir, lang).await,
        Command::Gallery(args) => gallery(&client, &args, lang).await,
        Command::Recommend(args) => recommend(client, &args, lang).await,
        Command::Whoami => whoami(&client, lang).await,
        Command::Books { query } => books(&client, &query.join(" "), lang).await,
    }
}

async fn generate(client: &ApiClient, topic: &str, out_dir: &Path, lang: Lang) -> AppResult {
    let mut session = ChatSession::new();
    let outcome = session
        .generate(client, topic, |event| {
            match event {
                GenerationEvent::Status(status) => eprintln!("{status}"),
                GenerationEvent::Log(line) => eprintln!("  · {line}"),
                GenerationEvent::CodeStarted => {
                    eprintln!("{}", tr(Key::PlanningComplete, lang));
                    eprintln!("{}", tr(Key::GeneratingCode, lang));
                }
                GenerationEvent::CodeDelta(_) => {}
                GenerationEvent::CodeClosed => eprintln!("{}", tr(Key::CodeComplete, lang)),
            }
            async {}
        })
        .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(refusal) => {
            eprintln!("{}", refusal.notice(lang));
            return Err(refusal.into());
        }
    };

    let saved = match &outcome {
        Ok(Some(artifact)) => Some(save_artifact(out_dir, topic, artifact).await?),
        _ => None,
    };

    let mut view = ChatView::new();
    view.finish(&outcome, saved, lang);
    for entry in view.take_settled() {
        for line in entry.plain_lines(lang) {
            println!("{line}");
        }
    }

    outcome.map(|_| ()).map_err(Into::into)
}

async fn gallery(client: &ApiClient, args: &GalleryArgs, lang: Lang) -> AppResult {
    if args.showcase {
        let list = match client.list_ppts(&GalleryQuery::first(args.limit)).await {
            Ok(list) => list,
            Err(err) => {
                // No strip when the list is unavailable.
                warn!(error = %err, "could not load recent presentations");
                return Ok(());
            }
        };
        let picks = gallery::select_diverse(&list.ppts, SHOWCASE_COUNT);
        if picks.is_empty() {
            return Ok(());
        }
        println!("{}", tr(Key::RecentPpts, lang));
        let started = Instant::now();
        for (index, ppt) in picks.into_iter().enumerate() {
            let card = gallery::showcase_card(ppt, index, client.base_url());
            if let Some(wait) = card.animation_delay.checked_sub(started.elapsed()) {
                tokio::time::sleep(wait).await;
            }
            for line in card.lines() {
                println!("{line}");
            }
            if args.previews {
                print_preview(client, &ppt.session_id, lang).await;
            }
        }
        return Ok(());
    }

    let query = GalleryQuery {
        limit: args.limit,
        page: args.page,
        category_id: args.category.clone(),
        search: args.search.clone(),
    };
    let list = match client.list_ppts(&query).await {
        Ok(list) => list,
        Err(err) => {
            warn!(error = %err, "could not load presentations");
            for line in gallery::GalleryView::Failed.lines(lang) {
                println!("{line}");
            }
            return Err(err.into());
        }
    };

    let view = gallery::GalleryView::from_list(&list, client.base_url(), lang);
    if !args.previews {
        for line in view.lines(lang) {
            println!("{line}");
        }
        return Ok(());
    }

    let gallery::GalleryView::Cards { cards, footer } = &view else {
        for line in view.lines(lang) {
            println!("{line}");
        }
        return Ok(());
    };
    for (card, ppt) in cards.iter().zip(&list.ppts) {
        for line in card.lines() {
            println!("{line}");
        }
        print_preview(client, &ppt.session_id, lang).await;
    }
    if let Some(footer) = footer {
        println!("{footer}");
    }
    Ok(())
}

async fn print_preview(client: &ApiClient, session_id: &str, lang: Lang) {
    match client.ppt_preview(session_id).await {
        Ok(preview) => {
            for line in gallery::preview_lines(&preview, lang) {
                println!("{line}");
            }
        }
        Err(err) => {
            warn!(error = %err, session_id, "preview failed");
            println!("{}", gallery::preview_failed_line(lang));
        }
    }
}

async fn recommend(client: ApiClient, args: &RecommendArgs, lang: Lang) -> AppResult {
    let base_url = client.base_url().to_string();
    let mode = if args.standalone {
        AdvisorMode::Standalone
    } else {
        AdvisorMode::Guided {
            user_id: recommend::DEFAULT_USER_ID,
        }
    };
    let mut agent = RecommendationAgent::new(client, mode);

    println!("── {} ──", tr(Key::AdvisorTitle, lang));
    let start = match agent.start(args.seed_mock_data).await {
        Ok(start) => start,
        Err(err) => {
            let notice = match err {
                error::ClientError::Unauthenticated | error::ClientError::RateLimited => {
                    err.notice(lang)
                }
                _ => tr(Key::AdvisorStartFailed, lang),
            };
            eprintln!("{notice}");
            return Err(err.into());
        }
    };
    if let Some(profile) = &start.user_profile {
        for line in recommend::profile_lines(profile, lang) {
            println!("{line}");
        }
    }
    println!("{}", start.message);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                agent.clear();
                if let Err(err) = agent.start(false).await {
                    eprintln!("{}", AdvisorError::from(err).notice(lang));
                    break;
                }
                if let Some(greeting) = agent.history().last() {
                    println!("{}", greeting.message);
                }
            }
            "/recs" => match agent.recommendations().await {
                Ok(books) => {
                    for line in recommend::recommendation_lines(&books, &base_url, lang) {
                        println!("{line}");
                    }
                }
                Err(err) => eprintln!("{}", err.notice(lang)),
            },
            _ => match agent.send(message).await {
                Ok(reply) => {
                    println!("{}", reply.message);
                    for line in
                        recommend::recommendation_lines(&reply.recommendations, &base_url, lang)
                    {
                        println!("{line}");
                    }
                }
                Err(err) => {
                    warn!(error = %err, "recommendation message failed");
                    eprintln!("{}", err.notice(lang));
                }
            },
        }
    }

    if let Some(dir) = &args.transcript {
        if let Some((full, compressed)) = agent.transcript().save(dir).await? {
            eprintln!(
                "{} {} / {}",
                tr(Key::SavedTo, lang),
                full.display(),
                compressed.display()
            );
        }
    }
    Ok(())
}

async fn whoami(client: &ApiClient, lang: Lang) -> AppResult {
    match client.current_user().await {
        Ok(user) => {
            let unknown = tr(Key::Unknown, lang);
            println!(
                "{} <{}>",
                user.username.as_deref().unwrap_or(unknown),
                user.email.as_deref().unwrap_or(unknown)
            );
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err.notice(lang));
            Err(err.into())
        }
    }
}

async fn books(client: &ApiClient, query: &str, lang: Lang) -> AppResult {
    let hits = match client.search_books(query).await {
        Ok(hits) => hits,
        Err(err) => {
            eprintln!("{}", err.notice(lang));
            return Err(err.into());
        }
    };
    let unknown = tr(Key::Unknown, lang);
    for hit in hits {
        let category = hit
            .category
            .as_deref()
            .unwrap_or(tr(Key::Uncategorized, lang));
        println!(
            "《{}》 {} [{}]",
            hit.title,
            hit.author.as_deref().unwrap_or(unknown),
            category
        );
    }
    Ok(())
}
