//! groundhog CLI: command-dialog agent over a hybrid knowledge base.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use groundhog::config::AgentConfig;
use groundhog::dialog::belief::{ArgMax, SelectionStrategy, WeightedRandom};
use groundhog::dialog::BeliefController;
use groundhog::ground::{GroundingInterpreter, Value};
use groundhog::io::KeyboardIo;
use groundhog::kb::facts::FactStore;
use groundhog::kb::KnowledgeBase;
use groundhog::lf::LogicalForm;
use groundhog::ontology::{Ontology, PredCategory};
use groundhog::parser::LexiconParser;
use groundhog::perception::features::FeatureBank;
use groundhog::perception::snapshot::Snapshot;
use groundhog::perception::PerceptionEnsemble;

#[derive(Parser)]
#[command(name = "groundhog", version, about = "Command-dialog agent core")]
struct Cli {
    /// Data directory holding ontology.toml, facts.txt, features.json, and
    /// the perception snapshot.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// Optional agent configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one clarification dialog on the keyboard.
    Dialog {
        /// Where to write the dialog trace (JSON).
        #[arg(long)]
        trace_out: Option<PathBuf>,

        /// Sample belief candidates stochastically instead of arg-max.
        #[arg(long)]
        stochastic: bool,

        /// Commit the updated classifier snapshot back to the data directory.
        #[arg(long)]
        write_classifiers: bool,
    },

    /// Train (or retrain) perception classifiers and commit the snapshot.
    Train {
        /// Comma-separated predicate names; default is every perceptual
        /// predicate in the ontology.
        #[arg(long)]
        predicates: Option<String>,
    },

    /// Query one perceptual predicate on one object.
    Query {
        /// Perceptual predicate name.
        #[arg(long)]
        predicate: String,

        /// Object index.
        #[arg(long)]
        object: u32,
    },

    /// Ground a logical form against the knowledge base.
    Ground {
        /// Logical form text, e.g. "the(lambda x:i.(cup(x)))".
        form: String,
    },

    /// Show ontology, fact store, and ensemble statistics.
    Info,
}

struct Loaded {
    ontology: Arc<Ontology>,
    kb: Arc<KnowledgeBase>,
    config: AgentConfig,
}

fn load(data_dir: &PathBuf, config_path: Option<&PathBuf>) -> Result<Loaded> {
    let config_path = config_path
        .cloned()
        .unwrap_or_else(|| data_dir.join("groundhog.toml"));
    let config = AgentConfig::load_or_default(&config_path).into_diagnostic()?;

    let ontology = Arc::new(Ontology::load(&data_dir.join("ontology.toml")).into_diagnostic()?);
    let facts = FactStore::load(&data_dir.join("facts.txt")).into_diagnostic()?;
    let features = FeatureBank::load(&data_dir.join("features.json")).into_diagnostic()?;

    let perception_dir = data_dir.join("perception");
    let perception = match Snapshot::read(&perception_dir).into_diagnostic()? {
        Some(snapshot) => {
            tracing::info!(dir = %perception_dir.display(), "restoring ensemble snapshot");
            snapshot.restore(features, config.ensemble.clone())
        }
        None => {
            let predicates: Vec<String> = ontology
                .entries_of_category(PredCategory::Perceptual)
                .map(|id| ontology.name(id).to_string())
                .collect();
            PerceptionEnsemble::new(features, predicates, Vec::new(), config.ensemble.clone())
        }
    };
    let perception = Arc::new(perception);

    let kb = Arc::new(KnowledgeBase::new(ontology.clone(), facts, perception));
    Ok(Loaded {
        ontology,
        kb,
        config,
    })
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let loaded = load(&cli.data_dir, cli.config.as_ref())?;

    match cli.command {
        Commands::Dialog {
            trace_out,
            stochastic,
            write_classifiers,
        } => {
            let strategy: Box<dyn SelectionStrategy> = if stochastic {
                Box::new(WeightedRandom::seeded(rand::random()))
            } else {
                Box::new(ArgMax)
            };
            let parser = Box::new(LexiconParser::new(loaded.ontology.clone()));
            let mut controller = BeliefController::new(
                loaded.ontology.clone(),
                loaded.kb.clone(),
                parser,
                strategy,
                loaded.config.dialog.clone(),
            )
            .into_diagnostic()?;

            let command = controller.run_dialog(&mut KeyboardIo).into_diagnostic()?;
            println!(
                "Confirmed: {}",
                loaded.ontology.name(command.action)
            );

            if let Some(path) = trace_out {
                controller.trace().write(&path).into_diagnostic()?;
                println!("Wrote dialog trace to {}", path.display());
            }
            if write_classifiers {
                let dir = cli.data_dir.join("perception");
                Snapshot::capture(loaded.kb.perception())
                    .write(&dir)
                    .into_diagnostic()?;
                println!("Committed ensemble snapshot to {}", dir.display());
            }
        }

        Commands::Train { predicates } => {
            let ensemble = loaded.kb.perception();
            let pidxs: Vec<usize> = match predicates {
                Some(names) => names
                    .split(',')
                    .map(|name| {
                        ensemble.predicate_index(name.trim()).ok_or_else(|| {
                            miette::miette!("unknown perceptual predicate '{}'", name.trim())
                        })
                    })
                    .collect::<Result<_>>()?,
                None => (0..ensemble.predicate_count()).collect(),
            };
            ensemble.train(&pidxs);
            let dir = cli.data_dir.join("perception");
            Snapshot::capture(ensemble).write(&dir).into_diagnostic()?;
            println!(
                "Trained {} predicate(s); snapshot committed to {}",
                pidxs.len(),
                dir.display()
            );
        }

        Commands::Query { predicate, object } => {
            let ensemble = loaded.kb.perception();
            let pidx = ensemble
                .predicate_index(&predicate)
                .ok_or_else(|| miette::miette!("unknown perceptual predicate '{predicate}'"))?;
            let (pos, neg) = ensemble.run(pidx, object).into_diagnostic()?;
            println!("{predicate}(oidx_{object}): pos={pos:.4} neg={neg:.4}");
        }

        Commands::Ground { form } => {
            let lf = LogicalForm::parse(&form, &loaded.ontology).into_diagnostic()?;
            let interpreter = GroundingInterpreter::new(&loaded.ontology, &loaded.kb);
            let groundings = interpreter.ground(&lf).into_diagnostic()?;
            if groundings.is_empty() {
                println!("No groundings: the form is unsatisfiable.");
            }
            for (i, g) in groundings.iter().enumerate() {
                let value = match &g.value {
                    Value::Bool(b) => b.to_string(),
                    Value::Entity(id) => loaded.ontology.name(*id).to_string(),
                    Value::Form(f) => f.render(&loaded.ontology),
                };
                let bindings: Vec<&str> = g
                    .bindings
                    .iter()
                    .map(|b| loaded.ontology.name(*b))
                    .collect();
                println!(
                    "  {}. {} (bindings: [{}], confidence: {:.4})",
                    i + 1,
                    value,
                    bindings.join(", "),
                    g.confidence
                );
            }
        }

        Commands::Info => {
            let ensemble = loaded.kb.perception();
            println!("groundhog agent info");
            println!("  ontology entries:  {}", loaded.ontology.len());
            println!(
                "  perceptual preds:  {}",
                ensemble.predicate_count()
            );
            println!(
                "  sensing contexts:  {}",
                ensemble.features().contexts().len()
            );
            println!("  labels:            {}", ensemble.label_set().len());
            println!("  knowledge base:    {:?}", loaded.kb);
        }
    }

    Ok(())
}
