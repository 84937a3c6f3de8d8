//! Human-readable rendering of analytics payloads.

use comfy_table::{Attribute, Cell, CellAlignment, Color, Table};
use owo_colors::OwoColorize;
use std::collections::BTreeMap;
use watch_stats_models::{AnalyticsPayload, ProfileYears, YearlyTrends};

fn styled_table(title: &str, columns: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);

    let mut header = vec![Cell::new(title).fg(Color::Cyan).add_attribute(Attribute::Bold)];
    header.extend(columns.iter().map(|c| Cell::new(c).add_attribute(Attribute::Bold)));
    table.set_header(header);
    table
}

fn hours_cell(hours: f64) -> Cell {
    Cell::new(format!("{:.2}", hours)).set_alignment(CellAlignment::Right)
}

pub fn print_payload(heading: &str, payload: &AnalyticsPayload) {
    println!("\n{}", heading.bright_cyan().bold());

    let summary = &payload.summary;
    println!(
        "{} hours watched across {} titles ({} movies, {} shows)",
        format!("{:.2}", summary.total_hours).bold(),
        summary.unique_titles,
        summary.unique_movies,
        summary.unique_shows
    );

    let mut titles = styled_table("Top Titles", &["Hours"]);
    for entry in &payload.total_title_watchtime {
        titles.add_row(vec![Cell::new(&entry.title), hours_cell(entry.hrs)]);
    }
    println!("{}", titles);

    let mut types = styled_table("Type", &["Share %"]);
    for entry in &payload.total_type_watchtime {
        types.add_row(vec![Cell::new(&entry.media_type), hours_cell(entry.hrs)]);
    }
    println!("{}", types);

    let mut monthly = styled_table("Month", &["Hours"]);
    for entry in &payload.monthly_watchtime {
        monthly.add_row(vec![Cell::new(&entry.month), hours_cell(entry.hrs)]);
    }
    println!("{}", monthly);

    let mut ratings = styled_table("Rating", &["Hours"]);
    for entry in &payload.ratings_watchtime {
        ratings.add_row(vec![Cell::new(&entry.rating), hours_cell(entry.hrs)]);
    }
    println!("{}", ratings);
}

pub fn print_profile_years(profile_years: &ProfileYears, yearly: &YearlyTrends) {
    let mut table = styled_table("Profile", &["Years", "Hours per year"]);
    for (profile, years) in profile_years {
        let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
        let trend: Vec<String> = yearly
            .get(profile)
            .map(|trend| trend.iter().map(|y| format!("{}: {:.2}", y.year, y.hrs)).collect())
            .unwrap_or_default();
        table.add_row(vec![Cell::new(profile), Cell::new(years.join(", ")), Cell::new(trend.join("\n"))]);
    }
    println!("{}", table);
}

pub fn print_stored(stored: &BTreeMap<String, Vec<i32>>) {
    let mut table = styled_table("Profile", &["Stored years"]);
    for (profile, years) in stored {
        let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
        table.add_row(vec![Cell::new(profile), Cell::new(years.join(", "))]);
    }
    println!("{}", table);
}
