use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nordik_client::{ApiClient, DownloadStore};
use nordik_console::{ActivityConsole, ConsoleConfig, ConsoleFile};
use nordik_core::{
    label_for, Catalog, Joiner, Operation, QueryBuilder, ReviewDecision, SearchResult,
    SessionStore, ValueKind,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nordik")]
#[command(about = "NordikDrive admin activity console")]
struct Cli {
    /// YAML file with page size and select option overrides.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List filterable fields and their operators.
    Fields,
    /// Search activity, e.g. `nordik search "status EQ approved" OR "firstname CONTAINS ann"`.
    Search {
        /// Clause expressions `<field> <OP> [value]`, optionally separated by AND/OR.
        filters: Vec<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        json: bool,
    },
    /// Show field changes, photos and documents of one request.
    Details {
        request_id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Download a document into the downloads directory.
    Download { document_id: i64 },
    /// Approve or reject a photo.
    ReviewPhoto {
        photo_id: i64,
        #[arg(value_enum)]
        decision: Decision,
    },
    /// Approve or reject a document.
    ReviewDocument {
        document_id: i64,
        #[arg(value_enum)]
        decision: Decision,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for ReviewDecision {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Approved => ReviewDecision::Approved,
            Decision::Rejected => ReviewDecision::Rejected,
        }
    }
}

/// Feeds `"<field> <OP> [value]"` expressions, optionally separated by
/// `AND`/`OR` tokens, through the builder.
fn apply_filters(builder: &mut QueryBuilder, filters: &[String]) -> Result<()> {
    let mut joiner = Joiner::And;
    for token in filters {
        match token.trim().to_ascii_uppercase().as_str() {
            "AND" => {
                joiner = Joiner::And;
                continue;
            }
            "OR" => {
                joiner = Joiner::Or;
                continue;
            }
            _ => {}
        }

        let mut parts = token.trim().splitn(3, char::is_whitespace);
        let field = parts.next().filter(|f| !f.is_empty());
        let op = parts.next();
        let rest = parts.next().unwrap_or("").trim();
        let (Some(field), Some(op)) = (field, op) else {
            bail!("expected `<field> <OP> [value]`, got `{token}`");
        };
        let op = Operation::parse(op).with_context(|| format!("unknown operator in `{token}`"))?;
        if op.value_kind() == ValueKind::None && !rest.is_empty() {
            bail!("{op} takes no value in `{token}`");
        }

        builder.set_next_joiner(joiner);
        builder.set_field(field);
        builder.set_op(op);
        match op.value_kind() {
            ValueKind::None => {}
            ValueKind::Scalar => builder.set_value(rest),
            ValueKind::List => {
                builder.set_values(rest.split(',').map(|v| v.trim().to_string()).collect())
            }
            ValueKind::Range => {
                let (start, end) = rest.split_once("..").unwrap_or((rest, ""));
                builder.set_start(start);
                builder.set_end(end);
            }
        }

        if builder.upsert().is_none() {
            let allowed = builder
                .catalog()
                .field(field)
                .filter(|f| builder.catalog().is_active(&f.key, builder.is_file_scoped()))
                .map(|f| {
                    f.field_type
                        .operations()
                        .iter()
                        .map(|o| o.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                });
            builder.clear_builder();
            match allowed {
                Some(ops) => bail!("incomplete clause `{token}` (operators: {ops})"),
                None => bail!("field `{field}` is not filterable here"),
            }
        }
        joiner = Joiner::And;
    }
    Ok(())
}

/// One line per aggregation, e.g. `status: approved=12 rejected=3`.
fn aggregation_lines(result: &SearchResult) -> Vec<String> {
    result
        .aggregations
        .keys()
        .map(|key| {
            let counts = result
                .aggregation(key)
                .iter()
                .map(|b| format!("{}={}", b.key, b.count))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{key}: {counts}")
        })
        .collect()
}

fn print_fields(catalog: &Catalog) {
    for (section, fields) in [("fields", &catalog.common), ("with file_id", &catalog.detail)] {
        println!("{section}:");
        for field in fields {
            let ops = field
                .field_type
                .operations()
                .iter()
                .map(|o| o.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            println!("  {:<12} {:<14} {}", field.key, field.label, ops);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, "starting");

    let mut config = ConsoleConfig::from_env();
    let mut catalog = Catalog::activity();
    if let Some(path) = &cli.config {
        ConsoleFile::load(path)?.apply(&mut config, &mut catalog);
    }

    if let Commands::Fields = cli.command {
        print_fields(&catalog);
        return Ok(());
    }

    let session = config
        .session()
        .context("NORDIK_API_TOKEN is not set")?;
    let api = ApiClient::new(config.api_client_config())?;
    let mut console = ActivityConsole::new(
        api,
        SessionStore::signed_in(session),
        QueryBuilder::new(catalog),
        config.page_size,
        DownloadStore::new(&config.downloads_dir),
    );

    match cli.command {
        Commands::Fields => {}
        Commands::Search {
            filters,
            page,
            json,
        } => {
            apply_filters(console.builder_mut(), &filters)?;
            for clause in console.builder().clauses() {
                let catalog = console.builder().catalog();
                let joiner = clause.joiner.map(Joiner::as_str).unwrap_or("WHERE");
                println!("{joiner:>5} {}", label_for(clause, catalog, catalog));
            }
            console.apply().await;
            if page > 1 {
                // The page range is only known after a first response.
                console.goto_page(page).await;
            }

            if let Some(err) = console.search().error() {
                bail!("search failed: {err}");
            }
            let Some(result) = console.search().data() else {
                bail!("search returned nothing");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(result)?);
                return Ok(());
            }
            let s = result.summary();
            println!(
                "page {}/{}  rows={} changes={}",
                s.page, s.total_pages, s.total_rows, s.total_changes
            );
            for row in &result.data {
                let col = |k: &str| row.text(k).unwrap_or_else(|| "-".to_string());
                println!(
                    "  #{:<8} {:<20} {:<12} {:<12} {:<8} {}",
                    row.request_id().map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
                    col("created_at"),
                    col("firstname"),
                    col("lastname"),
                    col("action"),
                    col("status"),
                );
            }
            for line in aggregation_lines(result) {
                println!("  {line}");
            }
        }
        Commands::Details { request_id, json } => {
            console.open_details(request_id).await;
            if let Some(err) = console.detail().error() {
                bail!("loading request {request_id} failed: {err}");
            }
            let Some(detail) = console.detail().data() else {
                bail!("request {request_id} returned nothing");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(detail)?);
                return Ok(());
            }
            println!("request {request_id}: {} pending review(s)", detail.pending_reviews());
            for change in &detail.changes {
                let show = |v: &Option<serde_json::Value>| {
                    v.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into())
                };
                println!(
                    "  {:<16} {} -> {}",
                    change.field.as_deref().unwrap_or("-"),
                    show(&change.old_value),
                    show(&change.new_value)
                );
            }
            if let Some(err) = &detail.photos_error {
                println!("  photos unavailable: {err}");
            }
            if let Some(err) = &detail.documents_error {
                println!("  documents unavailable: {err}");
            }
            for photo in &detail.photos {
                println!(
                    "  photo #{:<6} {:<9} {}",
                    photo.id,
                    photo.status.label(),
                    photo.file_name.as_deref().unwrap_or("")
                );
            }
            for doc in &detail.documents {
                println!(
                    "  doc   #{:<6} {:<9} {}",
                    doc.id,
                    doc.status.label(),
                    doc.name.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Download { document_id } => match console.download_document(document_id).await? {
            Some(stored) => println!(
                "{} ({} bytes{})",
                stored.absolute_path.display(),
                stored.byte_size,
                if stored.deduplicated { ", already present" } else { "" }
            ),
            None => println!("download superseded"),
        },
        Commands::ReviewPhoto { photo_id, decision } => {
            console.review_photo(photo_id, decision.into()).await?;
            println!("photo {photo_id} marked {:?}", decision);
        }
        Commands::ReviewDocument {
            document_id,
            decision,
        } => {
            console.review_document(document_id, decision.into()).await?;
            println!("document {document_id} marked {:?}", decision);
        }
    }

    Ok(())
}
