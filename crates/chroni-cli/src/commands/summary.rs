use chroni_core::models::EntrySummary;
use chroni_core::JournalClient;

use crate::error::CliError;

fn format_average(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:.1}"))
}

pub fn format_summary_lines(summary: &EntrySummary) -> Vec<String> {
    let averages = &summary.recent_averages;
    vec![
        format!(
            "{} entries ({} morning, {} evening)",
            summary.total_entries, summary.morning_entries, summary.evening_entries
        ),
        format!(
            "recent averages: mood {}  energy {}  pain {}",
            format_average(averages.mood),
            format_average(averages.energy),
            format_average(averages.pain)
        ),
    ]
}

pub async fn run_summary(as_json: bool, client: &JournalClient) -> Result<(), CliError> {
    let summary = client.summary().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_summary_lines(&summary) {
            println!("{line}");
        }
    }
    Ok(())
}
