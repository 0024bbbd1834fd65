use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use addrverify::cache::CachedLookup;
use addrverify::config::Config;
use addrverify::context::QuoteContext;
use addrverify::{
    AddressField, AddressLookup, AddressParts, FieldCommand, FieldEvent, FieldKind,
    FieldSession, FieldSnapshot, HttpLookup, LocationConstraint, QueryMode,
};
use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "addrverify", about = "Verify freight addresses against the geocoding proxy")]
struct Cli {
    /// Path to the TOML config
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify one address and print the resulting field state as JSON
    Verify {
        address: String,
        #[command(flatten)]
        target: Target,
        /// Send "{address}, {city}, {state} {zip}" instead of the raw text
        #[arg(long)]
        composed: bool,
        #[arg(long, default_value = "")]
        part_city: String,
        #[arg(long, default_value = "")]
        part_state: String,
        #[arg(long, default_value = "")]
        part_zip: String,
    },
    /// Drive a field interactively; one stdin line per edit
    Watch {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Args)]
struct Target {
    /// Which address slot on the form
    #[arg(long, value_enum, default_value_t = FieldArg::Origin)]
    field: FieldArg,
    /// Quote context JSON supplying the constraint; updated on exit
    #[arg(long)]
    context: Option<PathBuf>,
    /// Expected city (overrides the context)
    #[arg(long)]
    city: Option<String>,
    /// Expected state (overrides the context)
    #[arg(long)]
    state: Option<String>,
    /// Expected zip (overrides the context)
    #[arg(long)]
    zip: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FieldArg {
    Origin,
    Destination,
    ExtraPickup,
    ExtraDelivery,
}

impl From<FieldArg> for FieldKind {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::Origin => FieldKind::Origin,
            FieldArg::Destination => FieldKind::Destination,
            FieldArg::ExtraPickup => FieldKind::ExtraPickup,
            FieldArg::ExtraDelivery => FieldKind::ExtraDelivery,
        }
    }
}

impl Target {
    fn load_context(&self) -> anyhow::Result<Option<QuoteContext>> {
        self.context
            .as_deref()
            .map(QuoteContext::load)
            .transpose()
            .context("loading quote context")
    }

    /// Context stops first, explicit flags win
    fn constraint(&self, context: Option<&QuoteContext>) -> LocationConstraint {
        let mut constraint = context
            .map(|ctx| ctx.constraint_for(self.field.into()))
            .unwrap_or_default();
        if self.city.is_some() {
            constraint.city = self.city.clone();
        }
        if self.state.is_some() {
            constraint.state = self.state.clone();
        }
        if self.zip.is_some() {
            constraint.zip = self.zip.clone();
        }
        constraint
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let http = HttpLookup::new(&config.geocoder)?;

    if config.cache.enabled {
        run(cli.command, &config, CachedLookup::new(http, config.cache.ttl())).await
    } else {
        run(cli.command, &config, http).await
    }
}

async fn run<L: AddressLookup + 'static>(
    command: Command,
    config: &Config,
    lookup: L,
) -> anyhow::Result<()> {
    match command {
        Command::Verify {
            address,
            target,
            composed,
            part_city,
            part_state,
            part_zip,
        } => {
            let context = target.load_context()?;
            let mode = if composed {
                QueryMode::Composed
            } else {
                QueryMode::Raw
            };
            let mut field = AddressField::new(target.field.into(), target.constraint(context.as_ref()))
                .with_mode(mode)
                .with_min_chars(config.matching.min_chars);
            field.on_input(&address);
            field.set_parts(AddressParts::new(&part_city, &part_state, &part_zip));
            field.verify(&lookup).await;

            let snapshot = field.snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            save_verified(target.context.as_deref(), context, &snapshot)
        }
        Command::Watch { target } => {
            let context = target.load_context()?;
            let field = AddressField::new(target.field.into(), target.constraint(context.as_ref()))
                .with_min_chars(config.matching.min_chars);
            let snapshot = watch(field, Arc::new(lookup), config).await?;
            save_verified(target.context.as_deref(), context, &snapshot)
        }
    }
}

/// Write the accepted address back into the quote context, if there is one
fn save_verified(
    path: Option<&Path>,
    context: Option<QuoteContext>,
    snapshot: &FieldSnapshot,
) -> anyhow::Result<()> {
    let (Some(path), Some(mut context), Some(selected)) = (path, context, snapshot.selected.clone())
    else {
        return Ok(());
    };
    context.record_verified(snapshot.kind, selected);
    context.save(path)?;
    info!(path = %path.display(), "verified address saved to context");
    Ok(())
}

async fn watch<L: AddressLookup + 'static>(
    field: AddressField,
    lookup: Arc<L>,
    config: &Config,
) -> anyhow::Result<FieldSnapshot> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<FieldEvent>();
    let (cmd_tx, handle) = FieldSession::new(field, lookup, &config.debounce, event_tx).spawn();

    // Stdin thread, one line per edit
    let (input_tx, input_rx) = flume::unbounded::<String>();
    thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if input_tx.send(line).is_err() {
                break;
            }
        }
    });

    eprintln!("Type an address. Commands: :verify :pick N :top :city X :state X :zip X :quit\n");

    let mut parts = AddressParts::default();
    let mut last: Option<FieldSnapshot> = None;
    let mut input_open = true;

    loop {
        tokio::select! {
            line = input_rx.recv_async(), if input_open => {
                let Ok(line) = line else {
                    input_open = false;
                    let _ = cmd_tx.send(FieldCommand::Close);
                    continue;
                };
                match parse_line(&line, &mut parts) {
                    Some(cmd) => {
                        if cmd_tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => eprintln!("Unknown command: {}", line.trim()),
                }
            }

            event = event_rx.recv() => match event {
                Some(FieldEvent::Updated(snapshot)) => {
                    render(&snapshot, last.as_ref());
                    last = Some(snapshot);
                }
                Some(FieldEvent::LookupStarted { query }) => eprintln!("  ... looking up \"{}\"", query),
                Some(FieldEvent::Closed) | None => break,
            }
        }
    }

    let field = handle.await.context("field session panicked")?;
    Ok(field.snapshot())
}

fn parse_line(line: &str, parts: &mut AddressParts) -> Option<FieldCommand> {
    let Some(rest) = line.strip_prefix(':') else {
        return Some(FieldCommand::Input(line.to_string()));
    };
    let (cmd, arg) = match rest.split_once(' ') {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (rest.trim(), ""),
    };
    match cmd {
        "verify" | "v" => Some(FieldCommand::Verify),
        "top" => Some(FieldCommand::AcceptTopSuggestion),
        "pick" | "p" => arg
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(|n| FieldCommand::SelectIndex(n - 1)),
        "city" => {
            parts.city = arg.to_string();
            Some(FieldCommand::Parts(parts.clone()))
        }
        "state" => {
            parts.state = arg.to_string();
            Some(FieldCommand::Parts(parts.clone()))
        }
        "zip" => {
            parts.zip = arg.to_string();
            Some(FieldCommand::Parts(parts.clone()))
        }
        "quit" | "q" => Some(FieldCommand::Close),
        _ => None,
    }
}

fn render(snapshot: &FieldSnapshot, previous: Option<&FieldSnapshot>) {
    if previous == Some(snapshot) {
        return;
    }
    let status = match snapshot.verified {
        Some(true) => "✓",
        Some(false) => "✗",
        None => "·",
    };
    if !snapshot.message.is_empty() {
        println!("{} [{}] {}", status, snapshot.kind, snapshot.message);
    }
    if let Some(top) = &snapshot.top_suggestion {
        println!("    closest: {}  (:top to accept)", top.label());
    }
    if let Some(pos) = snapshot.resolved_position {
        println!("    position: {:.5}, {:.5}", pos.lat, pos.lng);
    }
    if snapshot.show_suggestions {
        for (i, candidate) in snapshot.suggestions.iter().enumerate() {
            println!("    {}. {}", i + 1, candidate.label());
        }
    }
    if snapshot.rate_limited {
        println!("    (geocoder is rate limiting, slow down)");
    }
}
