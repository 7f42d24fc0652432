//! Output formatting utilities for the CLI

use tabled::{settings::Style, Table, Tabled};

use bf_core::api::{FleetHealth, HealthResponse};
use bf_core::types::{BotStatus, BotStatusInfo};

/// Format bot statuses as a table, with a per-status summary line
pub fn format_statuses(statuses: &[BotStatusInfo]) -> String {
    if statuses.is_empty() {
        return "No bots supervised".to_string();
    }

    #[derive(Tabled)]
    struct BotRow {
        #[tabled(rename = "REPLICA")]
        replica_id: String,
        #[tabled(rename = "SLUG")]
        slug: String,
        #[tabled(rename = "OWNER")]
        owner: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "PID")]
        pid: String,
    }

    let rows: Vec<BotRow> = statuses
        .iter()
        .map(|s| BotRow {
            replica_id: truncate(s.replica_id.as_str(), 36),
            slug: s.slug.clone().unwrap_or_else(|| "-".to_string()),
            owner: truncate(&s.owner_id, 36),
            status: s.status.to_string(),
            pid: s
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let running = statuses
        .iter()
        .filter(|s| s.status == BotStatus::Running)
        .count();

    format!(
        "{}\n{} of {} bots running",
        Table::new(rows).with(Style::rounded()),
        running,
        statuses.len()
    )
}

/// Format fleet health as a human-readable string
pub fn format_health(health: &HealthResponse) -> String {
    let label = match health.status {
        FleetHealth::Healthy => "Healthy",
        FleetHealth::Unhealthy => "Unhealthy",
    };
    format!(
        "Fleet: {}\nUptime: {}",
        label,
        format_duration(health.uptime)
    )
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
