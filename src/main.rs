//! Docforge - generate documentation from source material with an LLM.
//!
//! Ingests files, pasted notes or Azure DevOps work items, asks the model
//! any clarifying questions, drafts each requested document type and lets
//! the user review and export the results.

#![allow(clippy::single_match_else)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docforge::core::{Config, DocTypeRegistry, DocumentTypeId};

/// Generate documentation from source material with an LLM
#[derive(Parser)]
#[command(name = "docforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use a specific configuration file
    #[arg(long, global = true, env = "DOCFORGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate documents from files, text or work items
    #[cfg(feature = "ai")]
    Generate {
        /// Source files or directories (repeatable)
        #[arg(short, long = "file", conflicts_with = "work_items")]
        files: Vec<PathBuf>,

        /// Pasted source text ("-" reads standard input)
        #[arg(short, long, conflicts_with = "work_items")]
        text: Option<String>,

        /// Import work items matching this search text from Azure DevOps
        #[arg(long)]
        work_items: Option<String>,

        /// Restrict the work item import to a project (repeatable)
        #[arg(long = "project", requires = "work_items")]
        projects: Vec<String>,

        /// Document type to generate (repeatable)
        #[arg(short = 'T', long = "type", required = true)]
        types: Vec<String>,

        /// Improve pasted text with the model before generating
        #[arg(long, requires = "text", conflicts_with_all = ["files", "work_items"])]
        enhance: bool,

        /// Skip clarifying questions
        #[arg(long)]
        skip_questions: bool,

        /// Write every document and exit without the review prompt
        #[arg(short, long)]
        non_interactive: bool,

        /// Output directory (defaults to export.output_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write a ZIP archive instead of separate files
        #[arg(long)]
        zip: bool,
    },

    /// List available document types
    Types {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List Azure DevOps projects
    #[cfg(feature = "devops")]
    Projects {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Search Azure DevOps work items
    #[cfg(feature = "devops")]
    Search {
        /// Free text matched against title and description
        text: Option<String>,

        /// Work item type (repeatable)
        #[arg(long = "type")]
        types: Vec<String>,

        /// State (repeatable)
        #[arg(long = "state")]
        states: Vec<String>,

        /// Project (repeatable)
        #[arg(long = "project")]
        projects: Vec<String>,

        /// Iteration path
        #[arg(long)]
        iteration: Option<String>,

        /// Assignee (name, email or @me)
        #[arg(long)]
        assigned_to: Option<String>,

        /// Only items changed on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<chrono::NaiveDate>,

        /// Only items changed on or before this date (YYYY-MM-DD)
        #[arg(long)]
        until: Option<chrono::NaiveDate>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<u32>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Write the default configuration to the global config file
        #[arg(long, conflicts_with = "path")]
        init: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    // Credentials may live in a local .env file
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load()?,
    };

    // Handle commands
    match cli.command {
        #[cfg(feature = "ai")]
        Commands::Generate {
            files,
            text,
            work_items,
            projects,
            types,
            enhance,
            skip_questions,
            non_interactive,
            out,
            zip,
        } => {
            let options = GenerateOptions {
                files,
                text,
                work_items,
                projects,
                types,
                enhance,
                skip_questions: skip_questions || non_interactive,
                non_interactive,
                out: out.unwrap_or_else(|| config.export.output_dir.clone()),
                zip,
            };
            cmd_generate(&config, options)?;
        }
        Commands::Types { format } => {
            cmd_types(&config, &format)?;
        }
        #[cfg(feature = "devops")]
        Commands::Projects { format } => {
            cmd_projects(&config, &format)?;
        }
        #[cfg(feature = "devops")]
        Commands::Search {
            text,
            types,
            states,
            projects,
            iteration,
            assigned_to,
            since,
            until,
            limit,
            format,
        } => {
            let query = docforge::WorkItemQuery {
                search_text: text,
                work_item_types: types,
                states,
                projects,
                iteration_path: iteration,
                assigned_to,
                changed_date_from: since,
                changed_date_to: until,
                max_results: limit,
                ..Default::default()
            };
            cmd_search(&config, &query, &format)?;
        }
        Commands::Config { path, init } => {
            cmd_config(&config, path, init)?;
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
        }
    }

    Ok(())
}

/// Options for the generate command.
#[cfg(feature = "ai")]
struct GenerateOptions {
    files: Vec<PathBuf>,
    text: Option<String>,
    work_items: Option<String>,
    projects: Vec<String>,
    types: Vec<String>,
    enhance: bool,
    skip_questions: bool,
    non_interactive: bool,
    out: PathBuf,
    zip: bool,
}

/// Parse type names against the registry, reporting the valid choices.
fn parse_types(registry: &DocTypeRegistry, raw: &[String]) -> Result<Vec<DocumentTypeId>> {
    raw.iter()
        .flat_map(|value| value.split(','))
        .filter(|value| !value.trim().is_empty())
        .map(|value| {
            registry.parse(value).map_err(|e| {
                let known: Vec<String> = registry.ids().iter().map(|id| id.to_string()).collect();
                anyhow::anyhow!("{e}\nAvailable types: {}", known.join(", "))
            })
        })
        .collect()
}

/// Terminal input read line by line on the runtime.
#[cfg(feature = "ai")]
type InputLines = tokio::io::Lines<tokio::io::BufReader<tokio::io::Stdin>>;

/// Prompt for one line of input. `None` at end of input.
#[cfg(feature = "ai")]
async fn prompt(input: &mut InputLines, message: &str) -> Result<Option<String>> {
    print!("{message}");
    io::stdout().flush()?;

    Ok(input.next_line().await?)
}

/// Run the generation pipeline.
#[cfg(feature = "ai")]
fn cmd_generate(config: &Config, options: GenerateOptions) -> Result<()> {
    use std::sync::Arc;

    use docforge::ai::{build_provider, GenerationClient};
    use docforge::ingest::{expand_paths, ingest_input, FileInput, SourceContent};
    use docforge::pipeline::{Orchestrator, PipelinePhase};
    use tokio::io::{AsyncBufReadExt, BufReader};

    let registry = Arc::new(config.registry()?);
    let types = parse_types(&registry, &options.types)?;

    let files: Vec<FileInput> =
        expand_paths(&options.files).iter().map(|path| FileInput::from_path(path)).collect();
    if !options.files.is_empty() && files.is_empty() {
        anyhow::bail!("No readable files found in the given paths");
    }

    let pasted = match options.text.as_deref() {
        Some("-") => Some(io::read_to_string(io::stdin())?),
        other => other.map(String::from),
    };

    // Credentials are checked before any request is made
    let provider = build_provider(&config.ai)?;
    let client =
        GenerationClient::new(provider, registry).with_timeout(config.ai.timeout());

    // Create tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let source: SourceContent = if let Some(search) = &options.work_items {
            import_work_items(config, search, &options.projects).await?
        } else if options.enhance && options.files.is_empty() {
            let raw = pasted.as_deref().unwrap_or_default();
            ingest_input(&[], Some(raw))?;
            println!("Enhancing source text...");
            SourceContent::new(client.enhance(raw).await?)
        } else {
            ingest_input(&files, pasted.as_deref())?
        };

        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut orchestrator = Orchestrator::new(client, config.generation.clone());
        let printer = tokio::spawn(print_events(orchestrator.subscribe()));

        println!("Generating {} document type(s)...\n", types.len());
        let mut phase = orchestrator.start(source, &types).await?;

        if phase == PipelinePhase::AwaitingAnswers {
            phase = if options.skip_questions {
                orchestrator.skip_questions().await?
            } else {
                answer_questions(&mut orchestrator, &mut input).await?;
                orchestrator.continue_with_answers().await?
            };
        }

        if phase == PipelinePhase::Reviewing {
            print_documents(&orchestrator);
            if options.non_interactive {
                let docs = documents(&orchestrator);
                let all: Vec<usize> = (0..docs.len()).collect();
                export_documents(config, &options.out, options.zip, &docs, &all)?;
            } else {
                review_loop(config, &mut orchestrator, &mut input, &options.out, options.zip)
                    .await?;
            }
        }

        drop(orchestrator);
        let _ = printer.await;
        Ok(())
    })
}

/// Print lifecycle events as they arrive.
#[cfg(feature = "ai")]
async fn print_events(
    mut events: tokio::sync::broadcast::Receiver<docforge::pipeline::PipelineEvent>,
) {
    use docforge::pipeline::PipelineEvent;
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(PipelineEvent::Progress { message }) => eprintln!("{message}"),
            Ok(PipelineEvent::Started { doc_type }) => eprintln!("  ... {doc_type}"),
            Ok(PipelineEvent::Settled { doc_type, ok, duration_ms }) => {
                let status = if ok { "done" } else { "FAILED" };
                eprintln!("  {status} {doc_type} ({duration_ms} ms)");
            }
            Ok(PipelineEvent::PhaseChanged { .. }) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

/// Ask each clarifying question on the terminal.
#[cfg(feature = "ai")]
async fn answer_questions(
    orchestrator: &mut docforge::pipeline::Orchestrator,
    input: &mut InputLines,
) -> Result<()> {
    let questions: Vec<String> =
        orchestrator.questions().iter().map(|q| q.question.clone()).collect();

    println!("\nA few questions before generating (press Enter to skip one):\n");
    for (index, question) in questions.iter().enumerate() {
        println!("{}. {}", index + 1, question);
        let Some(answer) = prompt(input, "   > ").await? else {
            break;
        };
        orchestrator.answer(index, answer.trim())?;
    }
    println!();
    Ok(())
}

/// Search Azure DevOps and ingest the results.
#[cfg(all(feature = "ai", feature = "devops"))]
async fn import_work_items(
    config: &Config,
    search: &str,
    projects: &[String],
) -> Result<docforge::ingest::SourceContent> {
    use docforge::integrations::{DevOpsClient, WorkItemQuery};

    let client = DevOpsClient::from_env(&config.devops)?;
    let query = WorkItemQuery {
        search_text: Some(search.to_string()),
        projects: projects.to_vec(),
        ..Default::default()
    };

    let results = client.search(&query).await?;
    println!("Imported {} work item(s)", results.count);
    Ok(docforge::ingest::ingest_work_items(&results.work_items)?)
}

#[cfg(all(feature = "ai", not(feature = "devops")))]
async fn import_work_items(
    _config: &Config,
    _search: &str,
    _projects: &[String],
) -> Result<docforge::ingest::SourceContent> {
    anyhow::bail!("This build does not include Azure DevOps support")
}

/// Print the current documents with their indices.
#[cfg(feature = "ai")]
fn print_documents(orchestrator: &docforge::pipeline::Orchestrator) {
    let Some(run) = orchestrator.run() else {
        return;
    };

    println!("\nDocuments:\n");
    for (index, doc) in run.results.iter().enumerate() {
        match &doc.error {
            Some(error) => println!("  [{}] {} - failed: {}", index + 1, doc.label, error),
            None => println!(
                "  [{}] {} ({}, {} chars, {} ms)",
                index + 1,
                doc.label,
                doc.filename,
                doc.content.len(),
                doc.duration_ms
            ),
        }
    }
    println!();
}

/// Snapshot of the current documents.
#[cfg(feature = "ai")]
fn documents(orchestrator: &docforge::pipeline::Orchestrator) -> Vec<docforge::pipeline::GeneratedDoc> {
    orchestrator.run().map(|run| run.results.clone()).unwrap_or_default()
}

/// Parse 1-based document numbers; no numbers selects everything.
fn parse_indices(args: &[&str], len: usize) -> Result<Vec<usize>> {
    if args.is_empty() {
        return Ok((0..len).collect());
    }
    args.iter()
        .map(|arg| match arg.parse::<usize>() {
            Ok(n) if (1..=len).contains(&n) => Ok(n - 1),
            _ => anyhow::bail!("Invalid document number: {arg} (expected 1-{len})"),
        })
        .collect()
}

const REVIEW_HELP: &str = "\
Commands:
  list                 Show documents
  show <n>             Print a document
  regen <n>            Regenerate a document
  polish <n>           Tidy a document with the model
  edit <n> <file>      Replace a document with the contents of a file
  available            List types not generated yet
  more <type>...       Generate additional types
  export [n]...        Write documents (all when no numbers given)
  zip [n]...           Write a ZIP archive (all when no numbers given)
  quit                 Exit";

/// Interactive review of a finished run.
#[cfg(feature = "ai")]
async fn review_loop(
    config: &Config,
    orchestrator: &mut docforge::pipeline::Orchestrator,
    input: &mut InputLines,
    out: &Path,
    zip: bool,
) -> Result<()> {
    println!("{REVIEW_HELP}\n");

    while let Some(line) = prompt(input, "docforge> ").await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = parts.split_first() else {
            continue;
        };

        let len = orchestrator.run().map_or(0, |run| run.results.len());

        let outcome: Result<()> = match *command {
            "list" | "ls" => {
                print_documents(orchestrator);
                Ok(())
            }
            "show" => parse_indices(args, len).map(|indices| {
                let docs = documents(orchestrator);
                for index in indices {
                    println!("--- {} ---\n{}\n", docs[index].filename, docs[index].content);
                }
            }),
            "regen" | "polish" | "edit" if args.is_empty() => {
                Err(anyhow::anyhow!("Usage: {command} <n>"))
            }
            "regen" => match parse_indices(&args[..1], len) {
                Ok(indices) => {
                    let doc_type = documents(orchestrator)[indices[0]].doc_type.clone();
                    match orchestrator.regenerate(&doc_type).await {
                        Ok(_) => {
                            print_documents(orchestrator);
                            Ok(())
                        }
                        Err(e) => Err(e.into()),
                    }
                }
                Err(e) => Err(e),
            },
            "polish" => match parse_indices(&args[..1], len) {
                Ok(indices) => match orchestrator.polish_document(indices[0]).await {
                    Ok(()) => {
                        println!("Polished document {}", indices[0] + 1);
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                },
                Err(e) => Err(e),
            },
            "edit" => match (parse_indices(&args[..1], len), args.get(1)) {
                (Ok(indices), Some(file)) => std::fs::read_to_string(file)
                    .with_context(|| format!("Failed to read {file}"))
                    .and_then(|content| {
                        orchestrator.edit_document(indices[0], content)?;
                        println!("Updated document {}", indices[0] + 1);
                        Ok(())
                    }),
                (Ok(_), None) => Err(anyhow::anyhow!("Usage: edit <n> <file>")),
                (Err(e), _) => Err(e),
            },
            "available" => {
                let available = orchestrator.available_types();
                if available.is_empty() {
                    println!("Every document type has been generated.");
                } else {
                    for id in available {
                        let label = orchestrator
                            .client()
                            .registry()
                            .get(&id)
                            .map_or("", |p| p.label.as_str())
                            .to_string();
                        println!("  {id:<16} {label}");
                    }
                }
                Ok(())
            }
            "more" => {
                let raw: Vec<String> = args.iter().map(|s| (*s).to_string()).collect();
                match parse_types(orchestrator.client().registry(), &raw) {
                    Ok(types) => match orchestrator.generate_more(&types).await {
                        Ok(()) => {
                            print_documents(orchestrator);
                            Ok(())
                        }
                        Err(e) => Err(e.into()),
                    },
                    Err(e) => Err(e),
                }
            }
            "export" | "zip" => parse_indices(args, len).and_then(|indices| {
                let docs = documents(orchestrator);
                export_documents(config, out, zip || *command == "zip", &docs, &indices)
            }),
            "quit" | "exit" | "q" => break,
            "help" | "?" => {
                println!("{REVIEW_HELP}");
                Ok(())
            }
            other => Err(anyhow::anyhow!("Unknown command: {other} (try 'help')")),
        };

        if let Err(e) = outcome {
            eprintln!("Error: {e:#}");
        }
    }

    orchestrator.reset();
    Ok(())
}

/// Write the selected documents as files or as one archive.
#[cfg(feature = "ai")]
fn export_documents(
    config: &Config,
    out: &Path,
    zip: bool,
    docs: &[docforge::pipeline::GeneratedDoc],
    indices: &[usize],
) -> Result<()> {
    use docforge::export::{write_archive, write_documents};

    if zip {
        let path = out.join(&config.export.archive_name);
        write_archive(&path, docs, indices)?;
        println!("Wrote {} document(s) to {}", indices.len(), path.display());
    } else {
        let selected: Vec<_> = indices.iter().map(|&i| docs[i].clone()).collect();
        for path in write_documents(out, &selected)? {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// List document types.
fn cmd_types(config: &Config, format: &str) -> Result<()> {
    let registry = config.registry()?;

    match format {
        "json" => {
            let types: Vec<_> = registry.iter().collect();
            println!("{}", serde_json::to_string_pretty(&types)?);
        }
        _ => {
            for profile in registry.iter() {
                println!(
                    "{} {:<16} {:<20} {}",
                    profile.icon, profile.id, profile.label, profile.description
                );
            }
        }
    }

    Ok(())
}

/// List Azure DevOps projects.
#[cfg(feature = "devops")]
fn cmd_projects(config: &Config, format: &str) -> Result<()> {
    use docforge::integrations::DevOpsClient;

    let client = DevOpsClient::from_env(&config.devops)?;

    // Create tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;
    let list = rt.block_on(client.list_projects())?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&list)?),
        _ => {
            if list.projects.is_empty() {
                println!("  No projects found.");
            }
            for project in &list.projects {
                match project.description.as_deref().filter(|d| !d.is_empty()) {
                    Some(description) => println!("  {} - {}", project.name, description),
                    None => println!("  {}", project.name),
                }
            }
        }
    }

    Ok(())
}

/// Search Azure DevOps work items.
#[cfg(feature = "devops")]
fn cmd_search(config: &Config, query: &docforge::WorkItemQuery, format: &str) -> Result<()> {
    use docforge::integrations::{format_work_item, DevOpsClient};

    let client = DevOpsClient::from_env(&config.devops)?;

    // Create tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;
    let results = rt
        .block_on(client.search(query))
        .map_err(|e| anyhow::anyhow!("Failed to search work items: {}", e))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&results)?),
        _ => {
            if results.work_items.is_empty() {
                println!("  No work items found.");
            } else {
                for item in &results.work_items {
                    println!("{}", format_work_item(item));
                }
                println!("\nShowing {} work item(s)", results.count);
            }
        }
    }

    Ok(())
}

/// Show configuration.
fn cmd_config(config: &Config, show_path: bool, init: bool) -> Result<()> {
    if show_path {
        if let Some(path) = Config::global_config_path() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    if init {
        let path = Config::default().save()?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let toml = toml::to_string_pretty(config)?;
    println!("{toml}");

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "docforge", &mut io::stdout());
}
