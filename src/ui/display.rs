//! Plain-text rendering of results for stdout.

use console::style;
use std::fmt::Write;

use crate::models::TripItinerary;
use crate::state::ContextStats;
use crate::ui::icons::{BOOK, CITY, MAP, STATS};
use crate::workflow::ItineraryResult;

pub fn header(title: &str, author: Option<&str>) -> String {
    let mut out = format!("{}{}", BOOK, style(title).bold());
    if let Some(author) = author {
        let _ = write!(out, " by {author}");
    }
    out
}

pub fn render_itinerary(itinerary: &TripItinerary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}{}", MAP, style("Your literary itinerary").bold().cyan());

    for city in &itinerary.cities {
        let _ = writeln!(
            out,
            "\n{}{}, {} ({} day{})",
            CITY,
            style(&city.name).bold(),
            city.country,
            city.days_suggested,
            if city.days_suggested == 1 { "" } else { "s" }
        );
        if !city.overview.is_empty() {
            let _ = writeln!(out, "   {}", style(&city.overview).dim());
        }
        for stop in &city.stops {
            let _ = writeln!(
                out,
                "   • {} [{}] {}",
                style(&stop.name).green(),
                stop.kind,
                style(&stop.time_of_day).dim()
            );
            let _ = writeln!(out, "     {}", stop.reason);
            if let Some(notes) = &stop.notes {
                let _ = writeln!(out, "     Tip: {notes}");
            }
        }
    }

    if !itinerary.summary_text.is_empty() {
        let _ = writeln!(out, "\n{}", itinerary.summary_text);
    }
    let _ = writeln!(
        out,
        "\n{}{} cities, {} days, {} stops",
        STATS,
        itinerary.cities.len(),
        itinerary.total_days(),
        itinerary.total_stops()
    );
    out
}

pub fn render_context_stats(stats: &ContextStats) -> String {
    format!(
        "{} events, ~{} tokens{}",
        stats.num_events,
        stats.estimated_tokens,
        if stats.within_limit { "" } else { " (over budget)" }
    )
}

/// Full report printed at the end of a successful run.
pub fn render_result(result: &ItineraryResult) -> String {
    let author = Some(result.book.author.as_str()).filter(|a| !a.is_empty());
    let mut out = header(&result.book.title, author);
    out.push('\n');

    match &result.itinerary {
        Some(itinerary) => out.push_str(&render_itinerary(itinerary)),
        None => out.push_str(
            "\nNo itinerary could be composed from the discovered places. \
Try again with --timeout set higher or a different book.\n",
        ),
    }

    let _ = writeln!(
        out,
        "\n{}",
        style(format!(
            "run {} | {}",
            result.run_id,
            render_context_stats(&result.context_stats)
        ))
        .dim()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookMetadata, CityPlan, CityStop};
    use uuid::Uuid;

    fn itinerary() -> TripItinerary {
        TripItinerary {
            cities: vec![CityPlan {
                name: "London".into(),
                country: "United Kingdom".into(),
                days_suggested: 2,
                overview: "Orwell's London.".into(),
                stops: vec![CityStop {
                    name: "Senate House".into(),
                    kind: "landmark".into(),
                    reason: "Model for the Ministry of Truth.".into(),
                    time_of_day: "morning".into(),
                    notes: Some("Free to view from outside.".into()),
                }],
            }],
            summary_text: "A grey and thoughtful trip.".into(),
        }
    }

    #[test]
    fn test_render_itinerary() {
        console::set_colors_enabled(false);
        let text = render_itinerary(&itinerary());
        assert!(text.contains("London, United Kingdom (2 days)"));
        assert!(text.contains("Senate House [landmark] morning"));
        assert!(text.contains("Tip: Free to view from outside."));
        assert!(text.contains("1 cities, 2 days, 1 stops"));
    }

    #[test]
    fn test_render_result_without_itinerary() {
        console::set_colors_enabled(false);
        let result = ItineraryResult {
            run_id: Uuid::nil(),
            book: BookMetadata {
                title: "1984".into(),
                author: "George Orwell".into(),
                ..Default::default()
            },
            itinerary: None,
            selected_regions: Vec::new(),
            context_stats: ContextStats {
                num_events: 12,
                total_chars: 400,
                estimated_tokens: 100,
                within_limit: true,
            },
        };
        let text = render_result(&result);
        assert!(text.contains("1984 by George Orwell"));
        assert!(text.contains("No itinerary could be composed"));
        assert!(text.contains("12 events, ~100 tokens"));
    }

    #[test]
    fn test_header_omits_missing_author() {
        console::set_colors_enabled(false);
        assert!(header("Beowulf", None).ends_with("Beowulf"));
        let result = ItineraryResult {
            run_id: Uuid::nil(),
            book: BookMetadata {
                title: "Beowulf".into(),
                ..Default::default()
            },
            itinerary: Some(itinerary()),
            selected_regions: Vec::new(),
            context_stats: ContextStats {
                num_events: 3,
                total_chars: 40,
                estimated_tokens: 10,
                within_limit: true,
            },
        };
        let text = render_result(&result);
        assert!(!text.contains(" by "));
        assert!(text.contains("London, United Kingdom"));
    }
}
