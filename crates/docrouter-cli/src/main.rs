//! `docrouter`: operational surface for the document intake pipeline.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::info;

use docrouter::config::{default_config_path, load_config};
use docrouter::db::record_repo::{ApprovalFilter, Record, RecordFilter, ValidationState};
use docrouter::registry::{self, PromptInput};
use docrouter::review::RecordReview;
use docrouter::DocRouter;

mod logging;

#[derive(Parser, Debug)]
#[command(name = "docrouter")]
#[command(about = "Classify, extract, validate and approve staged documents")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ~/.docrouter/config.json)
    #[arg(long, global = true, env = "DOCROUTER_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the stage directory and database, and seed the registry from config
    Setup,
    /// Manage document types
    #[command(subcommand)]
    Types(TypesCommand),
    /// Manage a document type's field prompts
    #[command(subcommand)]
    Prompts(PromptsCommand),
    /// Copy files into the stage and process them
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Only stage the files
        #[arg(long)]
        no_process: bool,
    },
    /// Run the pipeline for one staged file
    Process { file_name: String },
    /// Process every new arrival in the stage
    Batch,
    /// Process new arrivals continuously until Ctrl-C
    Watch,
    /// List processed records, newest first
    Records(RecordsArgs),
    /// Show the review view of a file's newest record
    Show {
        file_name: String,
        #[arg(long)]
        json: bool,
    },
    /// Approve a file's newest record with edited fields
    Approve(ApproveArgs),
    /// Re-run validation for records that are pending or failed
    Revalidate,
}

#[derive(Subcommand, Debug)]
enum TypesCommand {
    List,
    /// Register a type; an existing type keeps its description
    Add {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Change the description of a registered type
    Describe {
        name: String,
        #[arg(long)]
        description: String,
    },
}

#[derive(Subcommand, Debug)]
enum PromptsCommand {
    Show { document_type: String },
    /// Replace all prompts of a type with the entries of a JSON array file
    Set {
        document_type: String,
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ApprovalArg {
    All,
    Approved,
    NotApproved,
}

impl From<ApprovalArg> for ApprovalFilter {
    fn from(arg: ApprovalArg) -> Self {
        match arg {
            ApprovalArg::All => ApprovalFilter::All,
            ApprovalArg::Approved => ApprovalFilter::Approved,
            ApprovalArg::NotApproved => ApprovalFilter::NotApproved,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StateArg {
    Pending,
    Complete,
    Skipped,
    Failed,
}

impl From<StateArg> for ValidationState {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Pending => ValidationState::Pending,
            StateArg::Complete => ValidationState::Complete,
            StateArg::Skipped => ValidationState::Skipped,
            StateArg::Failed => ValidationState::Failed,
        }
    }
}

#[derive(Args, Debug)]
struct RecordsArgs {
    /// Document type, including NO_MATCH
    #[arg(long = "type")]
    document_type: Option<String>,
    #[arg(long, value_enum, default_value = "all")]
    approval: ApprovalArg,
    #[arg(long, value_enum)]
    state: Option<StateArg>,
    #[arg(long, default_value_t = 50)]
    limit: u64,
    #[arg(long, default_value_t = 0)]
    offset: u64,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ApproveArgs {
    file_name: String,
    /// Edited fields as a JSON object
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    json: Option<String>,
    /// File holding the edited fields
    #[arg(long)]
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path().context("Cannot locate home directory; pass --config")?,
    };
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let router = DocRouter::open(&config).context("Failed to initialize docrouter")?;

    match cli.command {
        Command::Setup => {
            let report = router.setup()?;
            println!(
                "Stage ready at {}; {} new document type(s), {} prompt set(s) replaced",
                router.stage().directory().display(),
                report.types_created,
                report.prompt_sets_replaced
            );
        }
        Command::Types(cmd) => run_types(&router, cmd)?,
        Command::Prompts(cmd) => run_prompts(&router, cmd)?,
        Command::Upload { files, no_process } => {
            let report = router.upload_and_process(&files, !no_process);
            for processed in &report.processed {
                println!(
                    "{}\t{}\trecord {}\tvalidation {}",
                    processed.file_name,
                    processed.document_type,
                    processed.record_id,
                    processed.validation_state
                );
            }
            println!("Uploaded {} file(s)", report.uploaded.len());
            if !report.errors.is_empty() {
                for error in &report.errors {
                    eprintln!("error: {}", error);
                }
                bail!("{} file(s) had errors", report.errors.len());
            }
        }
        Command::Process { file_name } => {
            let processed = router.process_one_file(&file_name)?;
            println!("{}", serde_json::to_string_pretty(&processed)?);
        }
        Command::Batch => {
            let report = router.process_new_files()?;
            for result in &report.results {
                match &result.error {
                    None => println!(
                        "{}\t{}\trecord {}",
                        result.file_name,
                        result.document_type.as_deref().unwrap_or("-"),
                        result.record_id.unwrap_or_default()
                    ),
                    Some(error) => println!("{}\tFAILED\t{}", result.file_name, error),
                }
            }
            println!(
                "Processed {} file(s): {} succeeded, {} failed",
                report.processed,
                report.succeeded(),
                report.failed
            );
        }
        Command::Watch => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            ctrlc::set_handler(move || {
                flag.store(true, Ordering::Relaxed);
            })
            .context("Failed to install Ctrl-C handler")?;

            info!("Watching stage; press Ctrl-C to stop");
            router.watch(shutdown)?;
        }
        Command::Records(args) => {
            let filter = RecordFilter {
                document_type: args.document_type,
                approval: args.approval.into(),
                validation_state: args.state.map(Into::into),
                file_name: None,
                limit: Some(args.limit),
                offset: Some(args.offset),
            };
            let (records, total) = router.list_records(&filter)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    println!("{}", record_line(record));
                }
                println!("{} of {} record(s)", records.len(), total);
            }
        }
        Command::Show { file_name, json } => {
            let review = router.review(&file_name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&review)?);
            } else {
                print_review(&review);
            }
        }
        Command::Approve(args) => {
            let raw = match (&args.json, &args.file) {
                (Some(json), _) => json.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("Pass --json or --file"),
            };
            let edited: Value = serde_json::from_str(&raw).context("Edited fields are not valid JSON")?;
            if !edited.is_object() {
                bail!("Edited fields must be a JSON object");
            }
            let record = router.approve_latest(&args.file_name, &edited)?;
            println!(
                "Approved record {} ({}) at {}",
                record.id,
                record.file_name,
                record
                    .approved_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default()
            );
        }
        Command::Revalidate => {
            let report = router.revalidate_pending()?;
            println!(
                "Revalidated {} record(s), {} failed",
                report.revalidated, report.failed
            );
        }
    }

    Ok(())
}

fn run_types(router: &DocRouter, cmd: TypesCommand) -> Result<()> {
    let db = router.database();
    match cmd {
        TypesCommand::List => {
            for doc_type in registry::list_document_types(db)? {
                println!("{}\t{}", doc_type.name, doc_type.description);
            }
        }
        TypesCommand::Add { name, description } => {
            if registry::upsert_document_type(db, &name, &description)? {
                println!("Registered {}", name.trim());
            } else {
                println!("{} already registered; description unchanged", name.trim());
            }
        }
        TypesCommand::Describe { name, description } => {
            registry::update_document_type_description(db, &name, &description)?;
            println!("Updated description of {}", name.trim());
        }
    }
    Ok(())
}

fn run_prompts(router: &DocRouter, cmd: PromptsCommand) -> Result<()> {
    let db = router.database();
    match cmd {
        PromptsCommand::Show { document_type } => {
            let prompts = registry::field_prompts(db, &document_type)?;
            if prompts.is_empty() {
                println!("No field prompts configured for {}", document_type);
            }
            for prompt in prompts {
                println!(
                    "{}\t{}\t{}",
                    prompt.sort_order, prompt.field_name, prompt.retrieval_prompt
                );
            }
        }
        PromptsCommand::Set {
            document_type,
            file,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let inputs: Vec<PromptInput> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array of prompts", file.display()))?;
            let stored = registry::replace_field_prompts(db, &document_type, &inputs)?;
            println!(
                "Stored {} prompt(s) for {} ({} dropped)",
                stored,
                document_type,
                inputs.len() - stored
            );
        }
    }
    Ok(())
}

fn record_line(record: &Record) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M"),
        record.file_name,
        record.document_type,
        record.validation_state,
        if record.approved { "approved" } else { "-" }
    )
}

fn print_review(review: &RecordReview) {
    println!(
        "{}  [{}] [{}]",
        review.file_name,
        review.document_type,
        review.status.as_str()
    );
    println!(
        "Processed: {}  (record {}, schema v{}, {})",
        review.created_at.format("%Y-%m-%d %H:%M"),
        review.record_id,
        review.schema_version,
        review.file_kind.as_str()
    );
    if let Some(url) = &review.file_url {
        println!("File: {}", url);
    }
    println!("Validation: {}", review.validation.label.as_str());
    if !review.validation.notes.is_empty() {
        println!("  {}", review.validation.notes);
    }
    println!();
    if review.fields.is_empty() {
        println!("No extracted fields.");
    }
    for row in &review.fields {
        let value = match &row.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("{:<24} {}", row.name, value);
    }
}
