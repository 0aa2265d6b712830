//! eventdb CLI
//!
//! Inspect object files and append events from the command line.

use clap::{Parser, Subcommand};
use eventdb::{Database, Event, EventDbError, ObjectFile, PropertyValue, NO_ACTION};
use tracing_subscriber::{fmt, EnvFilter};

/// eventdb CLI
#[derive(Parser, Debug)]
#[command(name = "eventdb-cli")]
#[command(about = "Inspect and append to eventdb object files")]
#[command(version)]
struct Args {
    /// Database root directory
    #[arg(short, long, default_value = "./eventdb_data")]
    root: String,

    /// Object type (subdirectory of the root)
    #[arg(short, long)]
    object_type: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show block size, block count and registries
    Info,

    /// List block descriptors
    Blocks,

    /// Print stored events
    Dump {
        /// Only print events of this block
        #[arg(short, long)]
        block: Option<usize>,
    },

    /// Append one event
    Add {
        /// Object id
        #[arg(long)]
        object_id: u64,

        /// Microseconds since the Unix epoch
        #[arg(long, allow_hyphen_values = true)]
        timestamp: i64,

        /// Action name (registered if new)
        #[arg(long)]
        action: Option<String>,

        /// Property as name=value (registered if new); repeatable
        #[arg(long = "set", value_name = "NAME=VALUE")]
        properties: Vec<String>,

        /// Block size used if the object file does not exist yet
        #[arg(long)]
        block_size: Option<usize>,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,eventdb=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> eventdb::Result<()> {
    let database = Database::new(&args.root);
    let mut object_file = database.object_file(&args.object_type)?;

    match args.command {
        Commands::Info => {
            object_file.open()?;
            print_info(&object_file);
            object_file.close()
        }
        Commands::Blocks => {
            object_file.open()?;
            print_blocks(&object_file);
            object_file.close()
        }
        Commands::Dump { block } => {
            object_file.open()?;
            let events = match block {
                Some(ordinal) => object_file.read_block(ordinal)?.into_events(),
                None => object_file.events()?,
            };
            for event in &events {
                println!("{}", format_event(&object_file, event));
            }
            object_file.close()
        }
        Commands::Add {
            object_id,
            timestamp,
            action,
            properties,
            block_size,
        } => {
            if let Some(size) = block_size {
                object_file.set_block_size(size)?;
            }
            object_file.open()?;
            object_file.lock()?;

            let action_id = match action {
                Some(name) => object_file.action_id(&name)?,
                None => NO_ACTION,
            };
            let mut event = Event::new(timestamp, object_id, action_id);
            for assignment in &properties {
                let (name, value) = parse_assignment(assignment)?;
                let property_id = object_file.property_id(name)?;
                event = event.with_data(property_id, value);
            }

            object_file.add_event(event)?;
            tracing::info!(object_id, timestamp, blocks = object_file.block_count(), "event added");

            object_file.unlock()?;
            object_file.close()
        }
    }
}

fn print_info(object_file: &ObjectFile) {
    println!("object type:  {}", object_file.object_type());
    println!("path:         {}", object_file.path().display());
    println!("block size:   {}", object_file.block_size());
    println!("block count:  {}", object_file.block_count());
    println!("actions:      {}", object_file.action_count());
    for action in object_file.actions() {
        println!("  {:>4}  {}", action.id, action.name);
    }
    println!("properties:   {}", object_file.property_count());
    for property in object_file.properties() {
        println!("  {:>4}  {}", property.id, property.name);
    }
}

fn print_blocks(object_file: &ObjectFile) {
    println!(
        "{:>7}  {:>20}  {:>20}  {:>20}  {:>20}  spanned",
        "ordinal", "min object", "max object", "min timestamp", "max timestamp"
    );
    for d in object_file.descriptors() {
        let spanned = match d.part() {
            Some(part) => format!("part {}", part),
            None => "-".to_string(),
        };
        println!(
            "{:>7}  {:>20}  {:>20}  {:>20}  {:>20}  {}",
            d.ordinal(),
            d.min_object_id(),
            d.max_object_id(),
            d.min_timestamp(),
            d.max_timestamp(),
            spanned
        );
    }
}

fn format_event(object_file: &ObjectFile, event: &Event) -> String {
    let mut line = format!("{} {}", event.object_id(), event.timestamp());
    if event.has_action() {
        let name = object_file.action_name(event.action_id()).unwrap_or("?");
        line.push_str(&format!(" action={}({})", name, event.action_id()));
    }
    for (id, value) in event.data_iter() {
        let name = object_file.property_name(id).unwrap_or("?");
        line.push_str(&format!(" {}({})={}", name, id, value));
    }
    line
}

/// Parse `name=value`; the value is typed as int, float, bool, else string
fn parse_assignment(assignment: &str) -> eventdb::Result<(&str, PropertyValue)> {
    let (name, raw) = assignment.split_once('=').ok_or_else(|| {
        EventDbError::Config(format!("expected NAME=VALUE, got {:?}", assignment))
    })?;

    let value = if let Ok(v) = raw.parse::<i64>() {
        PropertyValue::Int(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        PropertyValue::Float(v)
    } else if let Ok(v) = raw.parse::<bool>() {
        PropertyValue::Boolean(v)
    } else {
        PropertyValue::String(raw.to_string())
    };
    Ok((name, value))
}
