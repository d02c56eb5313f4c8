//! CLI inbound adapter that translates command-line arguments into application service calls.

mod definitions;

pub use definitions::*;

use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::{
    core::{
        domain::{EvaluationRow, MAX_RATING, MIN_RATING, RoundPhase},
        error::Error as CoreError,
        ports::{EvaluationService, RatingInput, RoundView, SaveOutcome, SubmitRequest},
    },
    review_export::{CatalogExport, EvaluationListExport, clip},
};

/// Rating used when the user just presses enter.
pub const DEFAULT_RATING: i64 = MIN_RATING as i64;

/// CLI adapter that consumes the `EvaluationService` to execute commands.
pub struct CliAdapter {
    service: Arc<dyn EvaluationService>,
}

#[derive(Serialize)]
struct EvaluateOutput<'a> {
    round: &'a RoundView,
    saved: usize,
}

impl CliAdapter {
    pub fn new(service: Arc<dyn EvaluationService>) -> Self {
        Self { service }
    }

    /// Execute a CLI command by dispatching to the appropriate service method.
    pub async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Evaluate(args) => {
                let stdin = io::stdin();
                let mut input = stdin.lock();
                let mut output = io::stdout();
                self.evaluate_command(args, &mut input, &mut output).await
            }
            Commands::Review(args) => self.review_command(args, &mut io::stdout()).await,
            Commands::Models(args) => self.models_command(args, &mut io::stdout()),
            Commands::Serve(_) => Err(anyhow!(
                "Serve command should be handled by the composition root"
            )),
        }
    }

    pub async fn evaluate_command<R: BufRead, W: Write>(
        &self,
        args: EvaluateArgs,
        input: &mut R,
        output: &mut W,
    ) -> Result<()> {
        let models = (!args.models.is_empty()).then(|| args.models.clone());
        let round = self
            .service
            .submit(SubmitRequest {
                prompt: args.prompt.clone(),
                models,
            })
            .await?;

        let interactive = args.ratings.is_none();
        if !args.json || interactive {
            render_round(&round, output)?;
        }

        let ratings = match &args.ratings {
            Some(values) => values.iter().copied().enumerate().collect(),
            None => read_ratings(&round, input, output)?,
        };

        let outcome = self.save_with_retry(ratings, interactive, input, output).await?;
        if args.json {
            let payload = EvaluateOutput {
                round: &round,
                saved: outcome.saved,
            };
            writeln!(output, "{}", serde_json::to_string_pretty(&payload)?)?;
        } else {
            writeln!(output, "Saved {} evaluations.", outcome.saved)?;
        }
        Ok(())
    }

    async fn save_with_retry<R: BufRead, W: Write>(
        &self,
        ratings: RatingInput,
        interactive: bool,
        input: &mut R,
        output: &mut W,
    ) -> Result<SaveOutcome> {
        loop {
            match self.service.record_ratings(ratings.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err @ CoreError::Persistence(_)) if interactive => {
                    writeln!(output, "{err}")?;
                    write!(output, "Retry saving? [y/N]: ")?;
                    output.flush()?;
                    let mut answer = String::new();
                    input.read_line(&mut answer)?;
                    if !matches!(answer.trim(), "y" | "Y" | "yes") {
                        self.service.reset().await;
                        return Err(err.into());
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn review_command<W: Write>(&self, args: ReviewArgs, output: &mut W) -> Result<()> {
        let rows = self.service.list_evaluations(args.limit).await?;
        if args.json {
            let payload = EvaluationListExport::from_rows(rows);
            writeln!(output, "{}", serde_json::to_string_pretty(&payload)?)?;
        } else if rows.is_empty() {
            writeln!(output, "No evaluations saved yet.")?;
        } else {
            render_rows(&rows, output)?;
        }
        Ok(())
    }

    pub fn models_command<W: Write>(&self, args: ModelsArgs, output: &mut W) -> Result<()> {
        let models = self.service.catalog();
        if args.json {
            let payload = CatalogExport { models };
            writeln!(output, "{}", serde_json::to_string_pretty(&payload)?)?;
        } else {
            writeln!(output, "Available models:")?;
            for model in models {
                writeln!(output, "- {model}")?;
            }
        }
        Ok(())
    }
}

fn render_round<W: Write>(round: &RoundView, output: &mut W) -> Result<()> {
    writeln!(output, "Prompt: {}", round.prompt)?;
    for (index, entry) in round.responses.iter().enumerate() {
        writeln!(output)?;
        let marker = if entry.failed { " (query failed)" } else { "" };
        writeln!(output, "[{index}] Model: {}{marker}", entry.model)?;
        writeln!(output, "{}", entry.response)?;
    }
    writeln!(output)?;
    Ok(())
}

/// Ask for one rating per response. A blank line keeps [`DEFAULT_RATING`].
pub fn read_ratings<R: BufRead, W: Write>(
    round: &RoundView,
    input: &mut R,
    output: &mut W,
) -> Result<RatingInput> {
    if round.phase != RoundPhase::AwaitingRatings {
        return Err(anyhow!("No responses are awaiting ratings"));
    }
    let mut ratings = RatingInput::new();
    for (index, entry) in round.responses.iter().enumerate() {
        loop {
            write!(
                output,
                "Rating for {} [{MIN_RATING}-{MAX_RATING}, default {DEFAULT_RATING}]: ",
                entry.model
            )?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Err(anyhow!("Input ended before every response was rated"));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                ratings.insert(index, DEFAULT_RATING);
                break;
            }
            match trimmed.parse::<i64>() {
                Ok(value) if (i64::from(MIN_RATING)..=i64::from(MAX_RATING)).contains(&value) => {
                    ratings.insert(index, value);
                    break;
                }
                _ => writeln!(
                    output,
                    "Please enter a whole number from {MIN_RATING} to {MAX_RATING}."
                )?,
            }
        }
    }
    Ok(ratings)
}

fn render_rows<W: Write>(rows: &[EvaluationRow], output: &mut W) -> Result<()> {
    writeln!(
        output,
        "{:>5}  {:<24}  {:<36}  {:>6}  {:<30}  RESPONSE",
        "ID", "CREATED", "MODEL", "RATING", "PROMPT"
    )?;
    for row in rows {
        writeln!(
            output,
            "{:>5}  {:<24}  {:<36}  {:>6}  {:<30}  {}",
            row.id,
            row.created_at,
            clip(&row.model_name, 36),
            row.rating,
            clip(&row.prompt, 30),
            clip(&row.response, 60)
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::ModelResponse;
    use std::io::Cursor;

    fn pending_round() -> RoundView {
        RoundView {
            phase: RoundPhase::AwaitingRatings,
            round_id: Some("r1".into()),
            prompt: "2+2?".into(),
            responses: vec![
                ModelResponse {
                    model: "A".into(),
                    response: "4".into(),
                    failed: false,
                },
                ModelResponse {
                    model: "B".into(),
                    response: "[error] timeout".into(),
                    failed: true,
                },
            ],
        }
    }

    #[test]
    fn reads_one_rating_per_response() {
        let mut input = Cursor::new("5\n2\n");
        let mut output = Vec::new();
        let ratings = read_ratings(&pending_round(), &mut input, &mut output).unwrap();
        assert_eq!(ratings, RatingInput::from([(0, 5), (1, 2)]));
    }

    #[test]
    fn blank_line_uses_default_and_bad_input_reprompts() {
        let mut input = Cursor::new("\nseven\n9\n4\n");
        let mut output = Vec::new();
        let ratings = read_ratings(&pending_round(), &mut input, &mut output).unwrap();
        assert_eq!(ratings, RatingInput::from([(0, DEFAULT_RATING), (1, 4)]));

        let transcript = String::from_utf8(output).unwrap();
        assert_eq!(transcript.matches("Please enter a whole number").count(), 2);
    }

    #[test]
    fn early_end_of_input_is_an_error() {
        let mut input = Cursor::new("5\n");
        let mut output = Vec::new();
        let err = read_ratings(&pending_round(), &mut input, &mut output).unwrap_err();
        assert!(err.to_string().contains("Input ended"));
    }

    #[test]
    fn round_rendering_flags_failed_queries() {
        let mut output = Vec::new();
        render_round(&pending_round(), &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("[0] Model: A\n4"));
        assert!(text.contains("[1] Model: B (query failed)"));
    }
}
