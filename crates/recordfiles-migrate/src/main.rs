//! RecordFiles Migration CLI
//!
//! CLI tool for exporting and re-importing file records.
//! Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use recordfiles_migrate::{
    AttachmentExport, AttachmentImport, AttachmentRemapper, ContentVersionExport,
    ContentVersionImport, Credentials, MappingTable, MigrationSettings, RecordStore,
    RestRecordStore, ResultReporter, TransferStats,
};

#[derive(Parser)]
#[command(name = "recordfiles-migrate")]
#[command(version)]
#[command(about = "Export and re-import Attachment and ContentVersion files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file path (built-in defaults when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Access token override
    #[arg(long, env = "RF_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Batch size override
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Concurrent transfers per batch override
    #[arg(long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export Attachments of the records selected by a parent query
    ExportAttachments {
        /// Parent query, e.g. "SELECT Id FROM Account"
        #[arg(short, long)]
        query: String,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Credentials file path
        #[arg(short = 's', long, value_name = "FILE")]
        credentials: PathBuf,
    },

    /// Export the latest ContentVersions linked to a parent query
    ExportContentVersions {
        /// Parent query, e.g. "SELECT Id FROM Account"
        #[arg(short, long)]
        query: String,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Credentials file path
        #[arg(short = 's', long, value_name = "FILE")]
        credentials: PathBuf,

        /// Also export notes
        #[arg(long)]
        include_notes: bool,
    },

    /// Re-create Attachments under remapped parents and users
    ImportAttachments {
        /// Attachment manifest
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Directory with payloads named by original Id
        #[arg(short = 'f', long, value_name = "DIR")]
        input_dir: PathBuf,

        /// Credentials file path
        #[arg(short = 's', long, value_name = "FILE")]
        credentials: PathBuf,

        /// User id mapping (OriginalId,NewId)
        #[arg(short, long, value_name = "FILE")]
        user_mapping: PathBuf,

        /// Parent id mapping (OriginalId,NewId)
        #[arg(short, long, value_name = "FILE")]
        parent_mapping: PathBuf,

        /// Result file (stdout when omitted)
        #[arg(short, long, value_name = "FILE")]
        result_file: Option<PathBuf>,
    },

    /// Upsert ContentVersions keyed by their original Id
    ImportContentVersions {
        /// ContentVersion manifest
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Directory with payloads named by original Id
        #[arg(short = 'f', long, value_name = "DIR")]
        input_dir: PathBuf,

        /// Credentials file path
        #[arg(short = 's', long, value_name = "FILE")]
        credentials: PathBuf,

        /// External id field holding the original Id
        #[arg(short, long)]
        upsert_key: String,

        /// Result file (stdout when omitted)
        #[arg(short, long, value_name = "FILE")]
        result_file: Option<PathBuf>,
    },

    /// Validate settings file
    Validate,

    /// Generate example settings (or credentials) file
    Init {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a credentials template instead
        #[arg(long)]
        credentials: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => MigrationSettings::from_file(path)?,
        None => MigrationSettings::default(),
    };
    if let Some(bs) = cli.batch_size {
        settings.options.batch_size = bs;
    }
    if let Some(workers) = cli.workers {
        settings.options.workers = workers;
    }

    // Setup logging; stdout is reserved for result lines
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.options.log_level))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::ExportAttachments {
            query,
            output,
            credentials,
        } => {
            settings.validate()?;
            let store = connect(&credentials, cli.access_token)?;
            let stats = AttachmentExport::new(store, settings, output)
                .run(&query)
                .await?;
            print_summary("Attachment export complete!", &stats);
        }
        Commands::ExportContentVersions {
            query,
            output,
            credentials,
            include_notes,
        } => {
            settings.validate()?;
            let store = connect(&credentials, cli.access_token)?;
            let stats = ContentVersionExport::new(store, settings, output)
                .include_notes(include_notes)
                .run(&query)
                .await?;
            print_summary("ContentVersion export complete!", &stats);
        }
        Commands::ImportAttachments {
            input,
            input_dir,
            credentials,
            user_mapping,
            parent_mapping,
            result_file,
        } => {
            settings.validate()?;
            let store = connect(&credentials, cli.access_token)?;
            let remapper = AttachmentRemapper::new(
                MappingTable::load(&parent_mapping)?,
                MappingTable::load(&user_mapping)?,
            );
            let mut reporter = open_reporter(result_file.as_deref())?;
            let stats = AttachmentImport::new(store, remapper, settings.options)
                .run(&input, &input_dir, &mut reporter)
                .await?;
            print_summary("Attachment import complete!", &stats);
        }
        Commands::ImportContentVersions {
            input,
            input_dir,
            credentials,
            upsert_key,
            result_file,
        } => {
            settings.validate()?;
            let store = connect(&credentials, cli.access_token)?;
            let mut reporter = open_reporter(result_file.as_deref())?;
            let stats = ContentVersionImport::new(store, upsert_key, settings.options)
                .run(&input, &input_dir, &mut reporter)
                .await?;
            print_summary("ContentVersion import complete!", &stats);
        }
        Commands::Validate => {
            let path = cli
                .config
                .ok_or_else(|| anyhow::anyhow!("validate requires --config <FILE>"))?;
            validate_settings(&path, &settings)?;
        }
        Commands::Init {
            output,
            credentials,
        } => {
            generate_template(output, credentials)?;
        }
    }

    Ok(())
}

fn connect(path: &Path, token: Option<String>) -> anyhow::Result<Arc<dyn RecordStore>> {
    info!("Loading credentials from {:?}", path);

    let mut credentials = Credentials::from_file(path)?;
    if let Some(token) = token {
        credentials.access_token = token;
    }
    credentials.validate()?;

    if let Some(username) = &credentials.username {
        info!("Username: {}", username);
    }
    info!("Instance: {}", credentials.instance_url);

    let store = RestRecordStore::new(credentials.session());
    Ok(Arc::new(store))
}

fn open_reporter(result_file: Option<&Path>) -> anyhow::Result<ResultReporter> {
    Ok(match result_file {
        Some(path) => ResultReporter::new(Box::new(std::fs::File::create(path)?)),
        None => ResultReporter::stdout(),
    })
}

// Summaries go to stderr; stdout may carry result lines
fn print_summary(title: &str, stats: &TransferStats) {
    eprintln!("\n✅ {}", title);
    eprintln!("   Queried:     {}", stats.queried);
    eprintln!("   Transferred: {}", stats.transferred);
    eprintln!("   Failed:      {}", stats.failed);
    eprintln!("   Skipped:     {}", stats.skipped);
    eprintln!("   Batches:     {}", stats.batches);
    eprintln!("   Duration:    {:.2}s", stats.duration_secs);
    eprintln!("   Throughput:  {:.0} records/sec", stats.throughput());
}

fn validate_settings(path: &Path, settings: &MigrationSettings) -> anyhow::Result<()> {
    info!("Validating settings from {:?}", path);

    settings.validate()?;

    println!("✅ Settings are valid!");
    println!("   Attachment manifest:     {}", settings.attachment.output_file);
    println!(
        "   ContentVersion manifest: {}",
        settings.content_version.output_file
    );
    println!("   Batch size:              {}", settings.options.batch_size);
    println!("   Workers:                 {}", settings.options.workers);

    Ok(())
}

fn generate_template(output: Option<PathBuf>, credentials: bool) -> anyhow::Result<()> {
    let (template, default_name) = if credentials {
        (CREDENTIALS_TEMPLATE, "credentials.yaml")
    } else {
        (SETTINGS_TEMPLATE, "recordfiles.yaml")
    };
    let output = output.unwrap_or_else(|| PathBuf::from(default_name));

    std::fs::write(&output, template)?;
    println!("✅ Generated template: {:?}", output);
    if !credentials {
        println!(
            "   Edit the file and run: recordfiles-migrate validate --config {:?}",
            output
        );
    }

    Ok(())
}

const SETTINGS_TEMPLATE: &str = r#"# RecordFiles Migration Settings

attachment:
  output_file: Attachment.csv
  output_dir: Attachment
  query_fields: [Id, ParentId, OwnerId, CreatedById, CreatedDate, LastModifiedById,
                 LastModifiedDate, Name, ContentType, BodyLength, Description, IsPrivate, Body]

content_version:
  link_output_file: ContentDocumentLink.csv
  link_query_fields: [Id, ContentDocumentId, LinkedEntityId, ShareType, Visibility]
  output_file: ContentVersion.csv
  output_dir: ContentVersion
  query_fields: [Id, ContentDocumentId, Title, Description, PathOnClient, FileExtension,
                 ContentSize, CreatedDate, LastModifiedDate, ContentUrl, ReasonForChange,
                 SharingOption, SharingPrivacy, Origin, ContentLocation,
                 ExternalDocumentInfo1, ExternalDocumentInfo2, IsMajorVersion, VersionData]

options:
  batch_size: 100   # ids per query (1-2000)
  workers: 4        # concurrent downloads/uploads per batch
  log_level: info
"#;

const CREDENTIALS_TEMPLATE: &str = r#"# RecordFiles Migration Credentials

instance_url: https://your-instance.my.example.com
# Prefer RF_ACCESS_TOKEN over storing the token here
access_token: ""
api_version: v59.0
# username: admin@example.com
"#;
