use anyhow::{bail, Context};
use bcma_core::{
    classify, AdministrationStore, BcmaConfig, CompletionDetails, FileAdministrationStore,
    InMemoryAdministrationStore, MedicationRef, NonEmptyText, PatientRef, PublishOutcome,
    ScanDispatcher, StateName, SystemClock, Workflow, WorkflowContext,
};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bcma")]
#[command(about = "Barcode medication administration verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one or more barcodes
    Classify {
        /// Raw barcode text
        #[arg(required = true)]
        barcodes: Vec<String>,
    },
    /// Verify and record one administration, reading scanner input from stdin
    Administer(AdministerArgs),
}

#[derive(Args)]
struct AdministerArgs {
    /// Expected patient identifier, e.g. PT12345
    #[arg(long)]
    patient_id: String,
    /// Patient display name
    #[arg(long)]
    patient_name: String,
    /// Date of birth (YYYY-MM-DD)
    #[arg(long)]
    dob: NaiveDate,
    /// Expected medication identifier, e.g. MA00001
    #[arg(long)]
    medication_id: String,
    /// Medication name
    #[arg(long)]
    medication_name: String,
    /// Dose on the label
    #[arg(long)]
    dose: String,
    /// Dose on the order, if different from the label
    #[arg(long)]
    ordered_dose: Option<String>,
    /// Ordered route
    #[arg(long)]
    route: String,
    /// Route actually being used, when different from the ordered route
    #[arg(long)]
    administering_route: Option<String>,
    /// Scheduled time (RFC 3339). Defaults to now.
    #[arg(long)]
    scheduled: Option<DateTime<Utc>>,
    /// When this medication was last given (RFC 3339)
    #[arg(long)]
    last_administered: Option<DateTime<Utc>>,
    /// Medication category, e.g. diabetic
    #[arg(long, default_value = "general")]
    category: String,
    /// Person administering
    #[arg(long)]
    operator: String,
    /// Person verifying the administration
    #[arg(long)]
    verifier: String,
    #[arg(long)]
    witness: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    /// Ancillary reading, e.g. blood glucose in mmol/L
    #[arg(long)]
    reading: Option<f64>,
    /// Justification used to override failing rights
    #[arg(long)]
    justification: Option<String>,
    /// Directory for administration logs. Defaults to $BCMA_STORE_DIR, otherwise in memory.
    #[arg(long)]
    store_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bcma_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { barcodes } => {
            for raw in barcodes {
                let code = classify(&raw);
                println!("{}\t{}\t{}", code.kind, code.format.as_str(), code.value);
            }
        }
        Commands::Administer(args) => administer(args)?,
    }

    Ok(())
}

fn administer(args: AdministerArgs) -> anyhow::Result<()> {
    let config = Arc::new(BcmaConfig::from_env_lookup(|key| std::env::var(key).ok())?);
    let clock = Arc::new(SystemClock);

    let store_dir = args
        .store_dir
        .or_else(|| std::env::var("BCMA_STORE_DIR").ok().map(PathBuf::from));
    let store: Box<dyn AdministrationStore> = match store_dir {
        Some(dir) => Box::new(
            FileAdministrationStore::open(&dir)
                .with_context(|| format!("opening store at {}", dir.display()))?,
        ),
        None => Box::new(InMemoryAdministrationStore::new()),
    };

    let patient = PatientRef {
        id: args.patient_id,
        display_name: args.patient_name,
        date_of_birth: args.dob,
    };
    let medication = MedicationRef {
        id: args.medication_id,
        name: args.medication_name,
        dose: args.dose,
        ordered_dose: args.ordered_dose,
        route: args.route,
        scheduled_time: args.scheduled.unwrap_or_else(Utc::now),
        category: args.category,
        last_administered_at: args.last_administered,
    };
    let operator = NonEmptyText::new(&args.operator).context("--operator must not be blank")?;

    let mut context = WorkflowContext::new(patient, medication, operator);
    if let Some(route) = args.administering_route {
        context = context.with_administering_route(route);
    }

    let mut dispatcher = ScanDispatcher::new(&config, clock.clone());
    let mut workflow = Workflow::with_dispatcher(context, config, clock, &mut dispatcher);

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading scanner input from stdin")?;
    // A trailing scan without a terminator still counts.
    if !input.ends_with('\n') {
        input.push('\n');
    }

    let debounced = dispatcher
        .feed(&input)
        .into_iter()
        .filter(|o| *o == PublishOutcome::Debounced)
        .count();
    if debounced > 0 {
        eprintln!("{debounced} repeat scan(s) ignored");
    }
    for result in workflow.pump() {
        if let Err(e) = result {
            eprintln!("scan rejected: {e}");
        }
    }

    if workflow.state_name() != StateName::Verifying {
        bail!(
            "scanning ended in state '{}'; a patient and a medication scan are required",
            workflow.state_name()
        );
    }

    if let Some(value) = args.reading {
        workflow.record_reading(value, Utc::now())?;
    }

    if let Some(checks) = workflow.checks() {
        for (right, passed) in checks.iter() {
            eprintln!("{:<10} {}", right.as_str(), if passed { "ok" } else { "FAILED" });
        }
    }

    if !workflow.is_valid() {
        match args.justification {
            Some(reason) => {
                let overridden = workflow.override_checks(&reason)?;
                eprintln!(
                    "overridden: {}",
                    overridden
                        .iter()
                        .map(|r| r.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            None => bail!("five-rights checks failed; supply --justification to override"),
        }
    }

    let mut details = CompletionDetails::new(args.verifier);
    if let Some(witness) = args.witness {
        details = details.with_witness(witness);
    }
    if let Some(notes) = args.notes {
        details = details.with_notes(notes);
    }

    let log = workflow.complete(details, store.as_ref())?;
    print!("{}", serde_yaml::to_string(&log)?);

    Ok(())
}
