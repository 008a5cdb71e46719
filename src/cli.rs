//! Quizforge command line
//!
//! Every subcommand reads JSON (or raw text) from a file or `-` for stdin
//! and writes JSON to stdout. Logs go to stderr.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{ApiClient, RetryPolicy, RetryingInvoker, TextGenerator};
use crate::config::Config;
use crate::observability::{
    init_tracing, init_tracing_verbose, logging_retry_observer, track_stage,
};
use crate::quiz::distribution::plan_distribution_with_rng;
use crate::quiz::{analyze, plan_distribution, CompositionRequest, QuizComposer, QuizQuestion};
use crate::response_parser::parse_response_detailed;
use crate::text::normalize_with;
use crate::topics::extract::{candidates_from_names, topic_names};
use crate::topics::{apply_analysis, Deduplicator, TopicBuckets, TopicExtractor, TopicRecord};

#[derive(Parser)]
#[command(name = "quizforge")]
#[command(about = "Turn study material into adaptive quizzes with a language model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Log progress to stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Repair and parse a raw model response into JSON
    Parse {
        /// Response text file, or `-` for stdin
        #[arg(default_value = "-")]
        input: String,

        /// Print how the payload was recovered alongside the value
        #[arg(long)]
        report: bool,
    },

    /// Print the canonical key for each topic name
    Normalize {
        #[arg(required = true)]
        names: Vec<String>,

        /// Fold accented letters to their base letter
        #[arg(long)]
        fold: bool,
    },

    /// Deduplicate a JSON list of topic names
    Dedupe {
        #[arg(default_value = "-")]
        input: String,

        /// Similarity above which two topics are merged
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Allocate questions across topic buckets
    Plan {
        /// Topic buckets, or a list of topic records
        #[arg(default_value = "-")]
        input: String,

        /// Number of questions to allocate
        #[arg(short = 'n', long)]
        total: Option<usize>,

        /// Spread evenly instead of weighting weak topics
        #[arg(long)]
        even: bool,

        /// Seed the topic shuffle for reproducible plans
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Score a completed quiz
    Analyze {
        /// Questions (a list, or an object with `questions`)
        questions: String,

        /// Answers as a JSON object of question id to chosen option
        answers: String,

        /// Topic records to update with the new statuses
        #[arg(long, value_name = "FILE")]
        topics: Option<String>,
    },

    /// Ask the model for the sub-topics of a document
    Topics {
        #[arg(default_value = "-")]
        document: String,

        #[arg(long, default_value = "12")]
        max_topics: usize,
    },

    /// Generate a quiz for topic buckets
    Generate {
        /// Topic buckets, or a list of topic records
        input: String,

        #[arg(short = 'n', long)]
        total: Option<usize>,

        #[arg(long)]
        even: bool,

        /// Study material to ground the questions in
        #[arg(long, value_name = "FILE")]
        source: Option<String>,
    },
}

/// Topic input: grouped buckets or a flat list of records.
#[derive(Deserialize)]
#[serde(untagged)]
enum TopicInput {
    Buckets(TopicBuckets),
    Records(Vec<TopicRecord>),
}

impl TopicInput {
    fn into_buckets(self) -> TopicBuckets {
        match self {
            TopicInput::Buckets(b) => b,
            TopicInput::Records(r) => TopicBuckets::from_records(r),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionInput {
    List(Vec<QuizQuestion>),
    Wrapped { questions: Vec<QuizQuestion> },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOutput<'a> {
    analysis: &'a crate::quiz::AnalysisResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    topics: Option<Vec<TopicRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed: Option<usize>,
}

pub async fn run(cancel: CancellationToken) -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        init_tracing_verbose();
    } else {
        init_tracing();
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse { input, report } => {
            let text = read_input(&input)?;
            let parsed = parse_response_detailed::<Value>(&text)?;
            info!(
                "Recovered payload via {:?} ({} repairs, {:?} stage)",
                parsed.extraction,
                parsed.repairs.len(),
                parsed.stage
            );
            if report {
                print_json(&serde_json::json!({
                    "value": parsed.value,
                    "method": parsed.extraction,
                    "repairs": parsed.repairs,
                    "stage": parsed.stage,
                }))?;
            } else {
                print_json(&parsed.value)?;
            }
        }

        Commands::Normalize { names, fold } => {
            let mut options = config.normalizer.clone();
            options.fold_diacritics |= fold;
            for name in names {
                println!("{}", normalize_with(&name, &options));
            }
        }

        Commands::Dedupe { input, threshold } => {
            let payload: Value = read_json(&input)?;
            let names = topic_names(payload)?;
            let deduplicator =
                Deduplicator::new(threshold.unwrap_or(config.dedup.similarity_threshold));
            let topics = candidates_from_names(&names, &config.normalizer, &deduplicator);
            info!("Kept {} of {} topics", topics.len(), names.len());
            print_json(&topics)?;
        }

        Commands::Plan {
            input,
            total,
            even,
            seed,
        } => {
            let buckets = read_json::<TopicInput>(&input)?.into_buckets();
            let total = total.unwrap_or(config.quiz.default_total_questions);
            let prioritize = !even && config.quiz.prioritize_weak_and_medium_topics;
            let plan = match seed {
                Some(seed) => {
                    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
                    plan_distribution_with_rng(&buckets, total, prioritize, &mut rng)?
                }
                None => plan_distribution(&buckets, total, prioritize)?,
            };
            print_json(&plan)?;
        }

        Commands::Analyze {
            questions,
            answers,
            topics,
        } => {
            let mut questions = match read_json::<QuestionInput>(&questions)? {
                QuestionInput::List(qs) | QuestionInput::Wrapped { questions: qs } => qs,
            };
            for question in &mut questions {
                question.renormalize(&config.normalizer);
            }
            let answers: HashMap<String, String> = read_json(&answers)?;
            let analysis = analyze(&questions, &answers);

            let (topics, changed) = match topics {
                Some(path) => {
                    let mut records: Vec<TopicRecord> = read_json(&path)?;
                    let changed = apply_analysis(&mut records, &analysis);
                    (Some(records), Some(changed))
                }
                None => (None, None),
            };
            print_json(&AnalyzeOutput {
                analysis: &analysis,
                topics,
                changed,
            })?;
        }

        Commands::Topics {
            document,
            max_topics,
        } => {
            let document = read_input(&document)?;
            let extractor = TopicExtractor::new(generator(&config)?, invoker(&config))
                .with_normalizer(config.normalizer.clone())
                .with_deduplicator(Deduplicator::new(config.dedup.similarity_threshold))
                .with_max_topics(max_topics);
            let topics =
                track_stage("extract_topics", || extractor.extract(&document, &cancel)).await?;
            print_json(&topics)?;
        }

        Commands::Generate {
            input,
            total,
            even,
            source,
        } => {
            let buckets = read_json::<TopicInput>(&input)?.into_buckets();
            let source_text = source.as_deref().map(read_input).transpose()?;
            let request = CompositionRequest {
                buckets,
                total_questions: total.unwrap_or(config.quiz.default_total_questions),
                prioritize_weak_and_medium_topics: !even
                    && config.quiz.prioritize_weak_and_medium_topics,
                source_text,
            };
            let composer = QuizComposer::new(generator(&config)?, invoker(&config))
                .with_normalizer(config.normalizer.clone())
                .with_settings(config.quiz.clone());
            let quiz =
                track_stage("compose_quiz", || composer.compose_with_cancel(&request, &cancel))
                    .await?;
            print_json(&quiz)?;
        }
    }

    Ok(())
}

fn generator(config: &Config) -> Result<Arc<dyn TextGenerator>> {
    Ok(Arc::new(ApiClient::new(config)?))
}

fn invoker(config: &Config) -> RetryingInvoker {
    RetryingInvoker::new(RetryPolicy::from_settings(&config.retry))
        .with_observer(logging_retry_observer())
}

/// Read a file, or stdin for `-`.
fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let text = read_input(path)?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
