use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use rand::rngs::StdRng;
use rand::SeedableRng;

use snn_mnist::assignment::LabelAssignment;
use snn_mnist::config::Config;
use snn_mnist::dataset::{DatasetSource, MnistDataset};
use snn_mnist::error::SNNError;
use snn_mnist::params::export_parameters;
use snn_mnist::pipeline::Pipeline;
use snn_mnist::simulator::ProcessSimulator;
use snn_mnist::spike_train::SpikeEncoder;

#[derive(Parser, Debug)]
#[command(about = "Spike encoding and population-vote decoding for a spiking MNIST classifier")]
struct Args {
    /// Also write the log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Log debug messages
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify images through the external simulator and report the accuracy of every window
    Run {
        /// JSON configuration file, defaults are used for missing fields
        #[arg(long)]
        config: Option<PathBuf>,
        /// The IDX images file
        #[arg(long, default_value = "./mnist/t10k-images-idx3-ubyte")]
        images: PathBuf,
        /// The IDX labels file
        #[arg(long, default_value = "./mnist/t10k-labels-idx1-ubyte")]
        labels: PathBuf,
        /// The label assignment of the output neurons (.npy, or text with one "<label>;" per line)
        #[arg(long, default_value = "./networkParameters/assignments.npy")]
        assignments: PathBuf,
        /// The number of cycles, i.e., images
        #[arg(short = 'n', long, default_value = "301")]
        num_cycles: usize,
        /// The number of cycles between accuracy evaluations
        #[arg(long)]
        update_interval: Option<usize>,
        /// The simulator executable
        #[arg(long)]
        simulator: Option<PathBuf>,
        /// The seed of the spike encoder, random if omitted
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write the text mirrors of thresholds.npy and weights.npy
    ExportParams {
        /// The parameters directory
        #[arg(long, default_value = "./networkParameters")]
        dir: PathBuf,
    },
    /// Write the text mirror of a label assignment
    ExportAssignments {
        /// The .npy assignment file
        #[arg(long, default_value = "./networkParameters/assignments.npy")]
        input: PathBuf,
        /// The text file to write
        #[arg(long, default_value = "./networkParameters/assignments.txt")]
        output: PathBuf,
    },
    /// Encode one image into a spike train hand-off file
    Encode {
        /// JSON configuration file, defaults are used for missing fields
        #[arg(long)]
        config: Option<PathBuf>,
        /// The IDX images file
        #[arg(long, default_value = "./mnist/t10k-images-idx3-ubyte")]
        images: PathBuf,
        /// The IDX labels file
        #[arg(long, default_value = "./mnist/t10k-labels-idx1-ubyte")]
        labels: PathBuf,
        /// The index of the image
        #[arg(long, default_value = "0")]
        index: usize,
        /// The hand-off file to write
        #[arg(long, default_value = "inputSpikes.txt")]
        output: PathBuf,
        /// The seed of the spike encoder, random if omitted
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn init_logging(log_file: Option<&Path>, verbose: bool) -> Result<(), SNNError> {
    let pattern = "{l} - {m}{n}";
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();
    let mut builder =
        LogConfig::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");

    if let Some(path) = log_file {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(pattern)))
            .build(path)
            .map_err(|e| SNNError::IOError(e.to_string()))?;
        builder = builder.appender(Appender::builder().build("logfile", Box::new(logfile)));
        root = root.appender("logfile");
    }

    let config = builder
        .build(root.build(level))
        .map_err(|e| SNNError::IOError(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| SNNError::IOError(e.to_string()))?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config, SNNError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Ok(Config::default()),
    }
}

fn load_assignment(path: &Path) -> Result<LabelAssignment, SNNError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("npy") => LabelAssignment::load_npy(path),
        _ => LabelAssignment::load_txt(path),
    }
}

fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn main() -> Result<(), SNNError> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref(), args.verbose)?;
    log::debug!("{:?}", args);

    match args.command {
        Command::Run {
            config,
            images,
            labels,
            assignments,
            num_cycles,
            update_interval,
            simulator,
            seed,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(update_interval) = update_interval {
                config.update_interval = update_interval;
            }
            if let Some(simulator) = simulator {
                config.simulator.program = simulator;
            }
            config.validate()?;

            let dataset = MnistDataset::load(&images, &labels)?;
            let assignment = load_assignment(&assignments)?;
            log::info!(
                "Loaded the assignment of {} neurons ({} with a label)",
                assignment.len(),
                assignment.num_assigned()
            );

            let simulator = ProcessSimulator::from_config(&config)?;
            let mut pipeline = Pipeline::build(&config, dataset, simulator, assignment)?;
            let mut rng = new_rng(seed);

            let accuracies = pipeline.run(num_cycles, &mut rng)?;
            match accuracies.last() {
                Some(accuracy) => log::info!(
                    "Done! {} windows evaluated, last accuracy {}",
                    accuracies.len(),
                    accuracy
                ),
                None => log::warn!("Done! Not enough cycles to evaluate a single window"),
            }
        }
        Command::ExportParams { dir } => {
            export_parameters(&dir)?;
        }
        Command::ExportAssignments { input, output } => {
            let assignment = LabelAssignment::load_npy(&input)?;
            assignment.save_txt(&output)?;
            log::info!(
                "Assignment of {} neurons written to {}",
                assignment.len(),
                output.display()
            );
        }
        Command::Encode {
            config,
            images,
            labels,
            index,
            output,
            seed,
        } => {
            let config = load_config(config.as_deref())?;
            let dataset = MnistDataset::load(&images, &labels)?;
            let (image, label) = dataset.get(index)?;

            let encoder = SpikeEncoder::from_config(&config)?;
            let spike_train = encoder.encode(image, &mut new_rng(seed))?;
            spike_train.save_to(&output)?;
            log::info!(
                "Image {} (label {}) encoded into {} spikes over {} steps, written to {}",
                index,
                label,
                spike_train.num_spikes(),
                spike_train.num_steps(),
                output.display()
            );
        }
    }
    Ok(())
}
