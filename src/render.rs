use std::collections::BTreeMap;
use std::fmt::Write;

use branchtally_core::TimeRange;
use branchtally_gitpulse::aggregate::AggregateResult;
use branchtally_gitpulse::patterns::PatternReport;
use chrono::{DateTime, Utc};
use comfy_table::presets::{ASCII_MARKDOWN, UTF8_FULL_CONDENSED};
use comfy_table::{Cell, Table};

const DUPLICATES_SHOWN: usize = 5;
const DUPLICATE_MESSAGE_WIDTH: usize = 50;
const TOP_BRANCHES: usize = 10;
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// One repository's results, one entry per time range.
pub struct RepoTally {
    pub name: String,
    pub ranges: Vec<(TimeRange, AggregateResult)>,
}

/// `{ repo: { range_name: AggregateResult } }`
pub fn export(tallies: &[RepoTally]) -> BTreeMap<&str, BTreeMap<&str, &AggregateResult>> {
    tallies
        .iter()
        .map(|t| {
            let ranges = t
                .ranges
                .iter()
                .map(|(range, result)| (range.name.as_str(), result))
                .collect();
            (t.name.as_str(), ranges)
        })
        .collect()
}

pub fn count_text(tallies: &[RepoTally], detailed: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Summary");
    out.push_str(&table(&summary_headers(), &summary_rows(tallies)));

    for tally in tallies {
        for (range, result) in &tally.ranges {
            let _ = writeln!(out, "\n{} ({})", tally.name, range.name);
            if result.user_stats.is_empty() {
                let _ = writeln!(out, "  No commits found");
                continue;
            }
            out.push_str(&table(&ranking_headers(), &ranking_rows(result)));
            if !result.failed_branches.is_empty() {
                let _ = writeln!(
                    out,
                    "  Failed branches: {}",
                    result.failed_branches.join(", ")
                );
            }
            if detailed {
                for (user, stats) in result.ranked_users() {
                    let _ = writeln!(out, "\n  {user}");
                    let rows = branch_rows(stats);
                    for line in table(&["Branch", "Unique", "Share"], &rows).lines() {
                        let _ = writeln!(out, "  {line}");
                    }
                }
            }
        }
    }
    out
}

pub fn count_markdown(tallies: &[RepoTally], detailed: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Commit Summary\n");
    out.push_str(&markdown_table(&summary_headers(), &summary_rows(tallies)));

    for tally in tallies {
        for (range, result) in &tally.ranges {
            let _ = writeln!(out, "\n## {} ({})\n", tally.name, range.name);
            if result.user_stats.is_empty() {
                let _ = writeln!(out, "_No commits found._");
                continue;
            }
            out.push_str(&markdown_table(&ranking_headers(), &ranking_rows(result)));
            if !result.failed_branches.is_empty() {
                let names: Vec<String> = result
                    .failed_branches
                    .iter()
                    .map(|b| format!("`{b}`"))
                    .collect();
                let _ = writeln!(out, "\n**Failed branches:** {}", names.join(", "));
            }
            if detailed {
                for (user, stats) in result.ranked_users() {
                    let _ = writeln!(out, "\n### {user}\n");
                    out.push_str(&markdown_table(
                        &["Branch", "Unique", "Share"],
                        &branch_rows(stats),
                    ));
                }
            }
        }
    }
    out
}

pub fn investigation_text(report: &PatternReport) -> String {
    let mut out = String::new();
    let ta = &report.time_analysis;
    let _ = writeln!(out, "Investigation: {}", report.user);
    let _ = writeln!(out, "  Total commits:        {}", report.total_commits);
    let _ = writeln!(out, "  Branches contributed: {}", report.branches_contributed);
    let _ = writeln!(out, "  Time span:            {} days", ta.time_span_days);
    let _ = writeln!(out, "  Commits per day:      {:.2}", ta.avg_commits_per_day);
    let _ = writeln!(out, "  Duplicate messages:   {}", report.total_duplicates);
    if let Some(min) = ta.min_time_diff_seconds {
        let _ = writeln!(out, "  Shortest gap:         {min:.1}s");
    }
    if let Some(line) = busiest(report) {
        let _ = writeln!(out, "  Busiest:              {line}");
    }

    let _ = writeln!(out, "\nSuspicious indicators");
    if !report.is_suspicious() {
        let _ = writeln!(out, "  No obvious suspicious patterns detected");
    }
    for flag in &report.flags {
        let _ = writeln!(out, "  ! {flag}");
    }

    if !report.duplicate_messages.is_empty() {
        let _ = writeln!(out, "\nDuplicate messages");
        for (message, count) in report.duplicate_messages.iter().take(DUPLICATES_SHOWN) {
            let _ = writeln!(out, "  {count}x  {}", truncate_message(message));
        }
    }

    let top = report.top_branches(TOP_BRANCHES);
    if !top.is_empty() {
        let _ = writeln!(out, "\nTop branches");
        let rows: Vec<Vec<String>> = top
            .iter()
            .map(|(b, c)| vec![b.to_string(), c.to_string()])
            .collect();
        for line in table(&["Branch", "Commits"], &rows).lines() {
            let _ = writeln!(out, "  {line}");
        }
    }
    out
}

pub fn investigation_markdown(report: &PatternReport) -> String {
    let mut out = String::new();
    let ta = &report.time_analysis;
    let _ = writeln!(out, "# Investigation: {}\n", report.user);
    let _ = writeln!(out, "- **Total commits:** {}", report.total_commits);
    let _ = writeln!(out, "- **Branches contributed:** {}", report.branches_contributed);
    let _ = writeln!(out, "- **Time span:** {} days", ta.time_span_days);
    let _ = writeln!(out, "- **Commits per day:** {:.2}", ta.avg_commits_per_day);
    let _ = writeln!(out, "- **Duplicate messages:** {}", report.total_duplicates);

    let _ = writeln!(out, "\n## Suspicious indicators\n");
    if !report.is_suspicious() {
        let _ = writeln!(out, "No obvious suspicious patterns detected.");
    }
    for flag in &report.flags {
        let _ = writeln!(out, "- {flag}");
    }

    if !report.duplicate_messages.is_empty() {
        let _ = writeln!(out, "\n## Duplicate messages\n");
        let rows: Vec<Vec<String>> = report
            .duplicate_messages
            .iter()
            .take(DUPLICATES_SHOWN)
            .map(|(m, c)| vec![truncate_message(m), c.to_string()])
            .collect();
        out.push_str(&markdown_table(&["Message", "Count"], &rows));
    }

    let top = report.top_branches(TOP_BRANCHES);
    if !top.is_empty() {
        let _ = writeln!(out, "\n## Top branches\n");
        let rows: Vec<Vec<String>> = top
            .iter()
            .map(|(b, c)| vec![format!("`{b}`"), c.to_string()])
            .collect();
        out.push_str(&markdown_table(&["Branch", "Commits"], &rows));
    }
    out
}

fn summary_headers() -> [&'static str; 5] {
    ["Repository", "Time Range", "Unique Commits", "Branches", "Contributors"]
}

fn summary_rows(tallies: &[RepoTally]) -> Vec<Vec<String>> {
    tallies
        .iter()
        .flat_map(|t| {
            t.ranges.iter().map(|(range, result)| {
                vec![
                    t.name.clone(),
                    range.name.clone(),
                    result.unique_commits.to_string(),
                    result.total_branches.to_string(),
                    result.active_contributors().to_string(),
                ]
            })
        })
        .collect()
}

fn ranking_headers() -> [&'static str; 7] {
    ["Rank", "User", "Unique", "Total", "Branches", "First", "Last"]
}

fn ranking_rows(result: &AggregateResult) -> Vec<Vec<String>> {
    result
        .ranked_users()
        .into_iter()
        .enumerate()
        .map(|(i, (user, stats))| {
            vec![
                (i + 1).to_string(),
                user.to_string(),
                stats.unique_commits.to_string(),
                stats.total_commits.to_string(),
                stats.branches_touched.len().to_string(),
                format_date(stats.first_commit_at),
                format_date(stats.last_commit_at),
            ]
        })
        .collect()
}

fn branch_rows(stats: &branchtally_gitpulse::aggregate::UserStats) -> Vec<Vec<String>> {
    let mut branches: Vec<(&String, &u64)> = stats.unique_commits_by_branch.iter().collect();
    branches.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    branches
        .into_iter()
        .map(|(branch, count)| {
            vec![
                branch.clone(),
                count.to_string(),
                format!("{:.1}%", stats.unique_share(branch)),
            ]
        })
        .collect()
}

fn busiest(report: &PatternReport) -> Option<String> {
    let (hour, _) = report
        .hour_distribution
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))?;
    let (day, _) = report
        .day_distribution
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))?;
    let day = WEEKDAYS.get(*day as usize).copied().unwrap_or("?");
    Some(format!("{day}, {hour:02}:00 UTC"))
}

fn format_date(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".into())
}

fn truncate_message(message: &str) -> String {
    let flat = message.trim().replace('\n', " ");
    if flat.chars().count() > DUPLICATE_MESSAGE_WIDTH {
        let cut: String = flat.chars().take(DUPLICATE_MESSAGE_WIDTH).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    build_table(UTF8_FULL_CONDENSED, headers, rows.iter().map(|row| row.iter()))
}

/// Pipes inside cells are escaped so GitHub keeps the column count.
fn markdown_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    build_table(
        ASCII_MARKDOWN,
        headers,
        rows.iter()
            .map(|row| row.iter().map(|c| c.replace('|', "\\|"))),
    )
}

fn build_table<R, C>(preset: &str, headers: &[&str], rows: R) -> String
where
    R: IntoIterator,
    R::Item: IntoIterator<Item = C>,
    C: Into<Cell>,
{
    let mut table = Table::new();
    table.load_preset(preset).set_header(headers.iter().copied());
    for row in rows {
        table.add_row(row.into_iter().collect::<Vec<C>>());
    }
    format!("{table}\n")
}
