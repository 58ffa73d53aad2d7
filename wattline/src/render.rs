use colored::{Color, Colorize};
use std::fmt::Write;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use wattconfig::DisplayConfig;
use wattson::types::{EnergyPoint, Period, Statistics};

const PEAK_FORMAT: &[time::format_description::FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// Columns of bar for `value` when `max` fills `width`.
pub fn bar_length(value: f64, max: f64, width: usize) -> usize {
    if max <= 0.0 || value <= 0.0 || !value.is_finite() {
        return 0;
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let len = ((value / max) * width as f64).round() as usize;
    len.clamp(1, width)
}

fn bar_color(value: f64, max: f64) -> Color {
    let ratio = if max > 0.0 { value / max } else { 0.0 };
    match ratio {
        r if r >= 0.75 => Color::Red,
        r if r >= 0.5 => Color::Yellow,
        _ => Color::Green,
    }
}

/// Peak time in the local zone, or UTC when the offset is unknown.
pub fn format_peak_time(timestamp: OffsetDateTime) -> String {
    let local = UtcOffset::current_local_offset()
        .map_or(timestamp, |offset| timestamp.to_offset(offset));
    local
        .format(PEAK_FORMAT)
        .unwrap_or_else(|_| timestamp.to_string())
}

pub fn format_statistics(statistics: &Statistics, display: &DisplayConfig) -> String {
    let peak_at = statistics
        .peak_consumption
        .timestamp
        .map(|ts| format!(" at {}", format_peak_time(ts)))
        .unwrap_or_default();

    let mut output = String::new();
    let _ = writeln!(
        output,
        "{:18}{:.2} kWh",
        "Total consumption",
        statistics.total_consumption
    );
    let _ = writeln!(
        output,
        "{:18}{:.2} kWh",
        "Daily average", statistics.average_daily
    );
    let _ = writeln!(
        output,
        "{:18}{:.2} kWh{peak_at}",
        "Peak", statistics.peak_consumption.value
    );
    let _ = write!(
        output,
        "{:18}{}{:.2}",
        "Estimated cost", display.currency_symbol, statistics.estimated_cost
    );
    output
}

pub fn format_energy(energy: &[EnergyPoint], display: &DisplayConfig) -> String {
    if energy.is_empty() {
        return "No readings yet. Upload a CSV to get started.".to_string();
    }

    let max = energy
        .iter()
        .map(|point| point.consumption)
        .fold(0.0_f64, f64::max);
    let label_width = energy
        .iter()
        .map(|point| point.label().chars().count())
        .max()
        .unwrap_or_default();

    let mut output = String::new();
    for (i, point) in energy.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        let bar = "█".repeat(bar_length(point.consumption, max, display.bar_width));
        let _ = write!(
            output,
            "{:label_width$}  {} {:.2}",
            point.label(),
            bar.color(bar_color(point.consumption, max)),
            point.consumption
        );
    }
    output
}

pub fn print_dashboard(
    period: Period,
    energy: &[EnergyPoint],
    statistics: &Statistics,
    display: &DisplayConfig,
) {
    println!("{}", "Statistics".bold());
    println!("{}", format_statistics(statistics, display));
    println!();
    println!("{} ({period})", "Consumption".bold());
    println!("{}", format_energy(energy, display));
}

#[cfg(test)]
mod tests {
    use super::*;
    use wattson::types::Peak;

    fn point(label: &str, consumption: f64) -> EnergyPoint {
        EnergyPoint {
            consumption,
            name: Some(label.to_string()),
            hour: None,
        }
    }

    #[test]
    fn largest_value_fills_the_width() {
        assert_eq!(bar_length(50.0, 50.0, 40), 40);
        assert_eq!(bar_length(25.0, 50.0, 40), 20);
    }

    #[test]
    fn tiny_values_still_get_a_bar() {
        assert_eq!(bar_length(0.01, 1000.0, 40), 1);
    }

    #[test]
    fn zero_and_degenerate_values_get_none() {
        assert_eq!(bar_length(0.0, 50.0, 40), 0);
        assert_eq!(bar_length(10.0, 0.0, 40), 0);
        assert_eq!(bar_length(f64::NAN, 50.0, 40), 0);
    }

    #[test]
    fn statistics_use_currency_symbol() {
        let display = DisplayConfig {
            currency_symbol: "€".to_string(),
            ..DisplayConfig::default()
        };
        let statistics = Statistics {
            total_consumption: 120.0,
            average_daily: 4.0,
            peak_consumption: Peak {
                value: 9.5,
                timestamp: None,
            },
            estimated_cost: 14.4,
        };
        let text = format_statistics(&statistics, &display);
        assert!(text.contains("120.00 kWh"));
        assert!(text.contains("€14.40"));
        assert!(!text.contains(" at "));
    }

    #[test]
    fn empty_series_has_hint() {
        let text = format_energy(&[], &DisplayConfig::default());
        assert!(text.contains("Upload a CSV"));
    }

    #[test]
    fn one_line_per_point() {
        colored::control::set_override(false);
        let text = format_energy(
            &[point("Jan", 10.0), point("Feb", 20.0)],
            &DisplayConfig::default(),
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Jan"));
        assert!(lines[1].ends_with("20.00"));
    }
}
