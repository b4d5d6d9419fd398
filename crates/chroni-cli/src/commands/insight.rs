use chroni_core::JournalClient;

use crate::cli::InsightCommands;
use crate::commands::common::{join_words, resolve_record};
use crate::error::CliError;

/// Cache operation name for a free-form question.
pub fn question_operation(question: &str) -> String {
    question
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

pub async fn run_insight(command: InsightCommands, client: &JournalClient) -> Result<(), CliError> {
    let insights = client.insights();
    let text = match command {
        InsightCommands::Daily => insights.daily_insight().await?,
        InsightCommands::Weekly => insights.weekly_reflection().await?,
        InsightCommands::Predict { days } => insights.predictive_insights(days).await?,
        InsightCommands::Entry { id } => {
            let record = resolve_record(&id, client).await?;
            insights.entry_summary(&record.id).await?
        }
        InsightCommands::Ask { question } => {
            let question = join_words(&question).ok_or(CliError::EmptyQuestion)?;
            insights
                .ask(&question_operation(&question), &question)
                .await?
        }
        InsightCommands::Usage => {
            println!("{}", insights.usage_today().await);
            return Ok(());
        }
    };

    println!("{text}");
    Ok(())
}
