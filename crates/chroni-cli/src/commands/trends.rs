use chroni_core::models::TrendSeries;
use chroni_core::JournalClient;

use crate::error::CliError;

fn format_point(value: Option<u8>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}

/// One line per entry, oldest first, preceded by a header.
pub fn format_trend_lines(series: &TrendSeries) -> Vec<String> {
    if series.is_empty() {
        return vec![format!("No entries in the last {} days", series.period_days)];
    }

    let mut lines = vec![
        format!(
            "{} entries over the last {} days",
            series.total_entries(),
            series.period_days
        ),
        format!(
            "{:<10}  {:>4}  {:>6}  {:>4}  {:>7}  {:>7}",
            "date", "mood", "energy", "pain", "anxiety", "fatigue"
        ),
    ];
    for (index, date) in series.dates.iter().enumerate() {
        lines.push(format!(
            "{:<10}  {:>4}  {:>6}  {:>4}  {:>7}  {:>7}",
            date.format("%Y-%m-%d").to_string(),
            format_point(series.mood[index]),
            format_point(series.energy[index]),
            format_point(series.pain[index]),
            format_point(series.anxiety[index]),
            format_point(series.fatigue[index]),
        ));
    }
    lines
}

pub async fn run_trends(days: u32, as_json: bool, client: &JournalClient) -> Result<(), CliError> {
    let series = client.insights().trends(days).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&series)?);
    } else {
        for line in format_trend_lines(&series) {
            println!("{line}");
        }
    }
    Ok(())
}
