mod chart;
mod config;
mod data;
mod state;

use std::io::{self, BufRead, Write};

use anyhow::Result;
use chrono::{NaiveDate, Utc};

use chart::LogChart;
use config::{Config, EnvConfig};
use data::cache::KvCache;
use data::manifold::ManifoldClient;
use data::types::TimeRange;
use state::annotations::AnnotationEdit;
use state::codec::ViewportZoom;
use state::session::{Session, StateDelta, UiEvent};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = EnvConfig::load().apply(Config::load_or_default("config.toml")?);
    tracing::info!("API base: {}", config.api.base_url);
    tracing::info!("Cache: {}", config.cache.path);

    let cache = KvCache::open(&config.cache.path)?;
    let client = ManifoldClient::new(config.api.base_url.clone());
    let mut session = Session::new(client, cache, LogChart, config.chart.smoothing_window_ms);

    // First argument: a market slug/URL, or a pasted shareable query string.
    if let Some(arg) = std::env::args().nth(1) {
        let result = if arg.contains("market=") {
            session.open_from_query(&arg).await
        } else {
            session.handle(UiEvent::SelectMarket { input: arg }).await
        };
        match result {
            Ok(delta) => report(&delta),
            Err(e) => tracing::error!("initial market load failed: {:#}", e),
        }
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        if line == "list" {
            for (i, a) in session.state().annotations.list().iter().enumerate() {
                println!("[{}] {} @ {} (y={:.1}) {}", i, a.content, a.date, a.y_value, a.source);
            }
            continue;
        }
        if line == "share" {
            match session.share_query() {
                Some(query) => println!("?{}", query),
                None => println!("no market selected"),
            }
            continue;
        }

        match parse_command(line) {
            Ok(event) => match session.handle(event).await {
                Ok(delta) => report(&delta),
                Err(e) => tracing::error!("{:#}", e),
            },
            Err(e) => eprintln!("{}", e),
        }
    }

    tracing::info!("bye");
    Ok(())
}

fn report(delta: &StateDelta) {
    if let Some(query) = &delta.share_query {
        println!("share: ?{}", query);
    }
}

fn parse_command(line: &str) -> Result<UiEvent, String> {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    match command {
        "market" => {
            let input = rest.first().ok_or("usage: market <slug|url>")?;
            Ok(UiEvent::SelectMarket {
                input: input.to_string(),
            })
        }
        "add" => {
            let date = rest
                .first()
                .and_then(|s| parse_date(s))
                .ok_or("usage: add <date> <y> [content...]")?;
            let y_value: f64 = rest
                .get(1)
                .and_then(|s| s.parse().ok())
                .ok_or("usage: add <date> <y> [content...]")?;
            let content = rest.get(2..).map(|w| w.join(" ")).unwrap_or_default();
            Ok(UiEvent::AddAnnotation {
                date,
                y_value,
                content,
                source: String::new(),
            })
        }
        "edit" => {
            let index: usize = rest
                .first()
                .and_then(|s| s.parse().ok())
                .ok_or("usage: edit <index> <date|y|content|source> <value>")?;
            let field = *rest.get(1).ok_or("missing field")?;
            let value = rest.get(2..).map(|w| w.join(" ")).unwrap_or_default();
            let edit = match field {
                "date" => AnnotationEdit::Date(
                    parse_date(&value).ok_or("bad date: use epoch ms, YYYY-MM-DD, or RFC3339")?,
                ),
                "y" => AnnotationEdit::YValue(value.parse().map_err(|_| "bad y value")?),
                "content" => AnnotationEdit::Content(value),
                "source" => AnnotationEdit::Source(value),
                _ => return Err(format!("unknown field: {}", field)),
            };
            Ok(UiEvent::EditAnnotation { index, edit })
        }
        "rm" => {
            let index: usize = rest
                .first()
                .and_then(|s| s.parse().ok())
                .ok_or("usage: rm <index>")?;
            Ok(UiEvent::RemoveAnnotation { index })
        }
        "zoom" => {
            let bounds: Vec<f64> = rest.iter().filter_map(|s| s.parse().ok()).collect();
            if bounds.len() != 4 {
                return Err("usage: zoom <xmin> <xmax> <ymin> <ymax>".to_string());
            }
            Ok(UiEvent::SetZoom {
                zoom: ViewportZoom {
                    x_min: bounds[0],
                    x_max: bounds[1],
                    y_min: bounds[2],
                    y_max: bounds[3],
                },
            })
        }
        "range" => {
            let range = rest
                .first()
                .and_then(|s| TimeRange::parse(s))
                .ok_or("usage: range <1D|1W|1M|all>")?;
            Ok(UiEvent::SetTimeRange { range })
        }
        "refresh" => Ok(UiEvent::RefreshMarket),
        _ => Err(format!(
            "unknown command: {} (market/add/edit/rm/zoom/range/refresh/list/share/quit)",
            command
        )),
    }
}

/// Epoch milliseconds, a bare date, or a full RFC3339 timestamp.
fn parse_date(s: &str) -> Option<i64> {
    if let Ok(ms) = s.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}
