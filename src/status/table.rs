use std::fmt::Write as _;

use terminal_size::{Width, terminal_size};

use super::{HealthSnapshot, OverallHealth, UnitHealth};

const GREEN_BOLD: &str = "\x1b[1;32m";
const RED_BOLD: &str = "\x1b[1;31m";
const YELLOW_BOLD: &str = "\x1b[1;33m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

const DEFAULT_WIDTH: usize = 120;

fn color_for(health: UnitHealth) -> &'static str {
    match health {
        UnitHealth::Healthy => GREEN_BOLD,
        UnitHealth::Degraded => YELLOW_BOLD,
        UnitHealth::Failing => RED_BOLD,
        UnitHealth::Inactive => DIM,
    }
}

fn overall_color(health: OverallHealth) -> &'static str {
    match health {
        OverallHealth::Healthy => GREEN_BOLD,
        OverallHealth::Degraded => YELLOW_BOLD,
        OverallHealth::Failing => RED_BOLD,
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let keep = max.saturating_sub(1);
    let mut out: String = value.chars().take(keep).collect();
    out.push('…');
    out
}

/// Renders a snapshot as a fixed-column table sized to the terminal.
pub fn render_table(snapshot: &HealthSnapshot, color: bool) -> String {
    let width = terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(DEFAULT_WIDTH);

    let paint = |code: &str, text: &str| {
        if color {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Overall: {}  ({} services, captured {})",
        paint(
            overall_color(snapshot.overall_health),
            snapshot.overall_health.as_ref()
        ),
        snapshot.services.len(),
        snapshot.captured_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    let name_width = snapshot
        .services
        .keys()
        .map(|name| name.chars().count())
        .max()
        .unwrap_or(4)
        .clamp(4, 24);

    let _ = writeln!(
        out,
        "{:<name_width$}  {:<9}  {:<8}  {:>7}  {:>8}  {:>5}  DETAIL",
        "NAME", "STATE", "HEALTH", "PID", "UPTIME", "FAILS"
    );

    // Everything before DETAIL; leave the rest of the line to the probe detail.
    let fixed = name_width + 2 + 9 + 2 + 8 + 2 + 7 + 2 + 8 + 2 + 5 + 2;
    let detail_width = width.saturating_sub(fixed).max(16);

    for (name, report) in &snapshot.services {
        let pid = report
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".into());
        let uptime = report
            .uptime
            .as_ref()
            .map(|uptime| uptime.human.clone())
            .unwrap_or_else(|| "-".into());
        let detail = report
            .last_probe
            .as_ref()
            .map(|probe| probe.detail.as_str())
            .unwrap_or("-");
        let health = format!("{:<8}", report.health.as_ref());

        let _ = writeln!(
            out,
            "{:<name_width$}  {:<9}  {}  {:>7}  {:>8}  {:>5}  {}",
            truncate(name, name_width),
            report.state.as_ref(),
            paint(color_for(report.health), &health),
            pid,
            uptime,
            report.consecutive_failures,
            truncate(detail, detail_width),
        );
    }

    out
}
