use std::fs;
use std::io;
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use ext_numsort::{ExternalRun, ExternalSorterBuilder, MalformedPolicy, MergeStrategy, RmpRun, TextRun};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let format: RunFormat = arg_parser.value_of_t_or_exit("format");
    let result = match format {
        RunFormat::Rmp => run::<RmpRun>(&arg_parser),
        RunFormat::Text => run::<TextRun>(&arg_parser),
    };

    if let Err(err) = result {
        log::error!("{}", err);
        process::exit(1);
    }
}

fn run<C: ExternalRun>(arg_parser: &clap::ArgMatches) -> Result<(), String> {
    let strategy: Strategy = arg_parser.value_of_t_or_exit("strategy");
    let on_malformed: OnMalformed = arg_parser.value_of_t_or_exit("on_malformed");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let memory = arg_parser.value_of("memory").expect("value has default");
    let chunk_capacity: Option<usize> = arg_parser
        .is_present("chunk_capacity")
        .then(|| arg_parser.value_of_t_or_exit("chunk_capacity"));
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));

    let input = arg_parser.value_of("input").expect("value is required");
    let input_stream = fs::File::open(input)
        .map(io::BufReader::new)
        .map_err(|err| format!("input file opening error: {}", err))?;

    let output = arg_parser.value_of("output").expect("value is required");
    let output_stream = fs::File::create(output).map_err(|err| format!("output file creation error: {}", err))?;

    let mut sorter_builder = ExternalSorterBuilder::<C>::new()
        .with_merge_strategy(match strategy {
            Strategy::Heap => MergeStrategy::Heap,
            Strategy::Scan => MergeStrategy::LinearScan,
        })
        .with_malformed_policy(match on_malformed {
            OnMalformed::Abort => MalformedPolicy::Abort,
            OnMalformed::Stop => MalformedPolicy::StopReading,
        });

    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    sorter_builder = match chunk_capacity {
        Some(chunk_capacity) => sorter_builder.with_chunk_capacity(chunk_capacity),
        None => sorter_builder
            .with_memory_budget(memory.parse::<ByteSize>().expect("value is pre-validated").as_u64()),
    };

    let sorter = sorter_builder
        .build()
        .map_err(|err| format!("sorter initialization error: {}", err))?;

    let summary = sorter
        .sort(input_stream, output_stream)
        .map_err(|err| format!("data sorting error: {}", err))?;

    log::info!("sorted {} values using {} runs", summary.values, summary.runs);

    return Ok(());
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum RunFormat {
    Rmp,
    Text,
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Strategy {
    Heap,
    Scan,
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum OnMalformed {
    Abort,
    Stop,
}

macro_rules! impl_arg_enum_parsing {
    ($($name:ident),*) => {
        $(
            impl $name {
                pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
                    Self::value_variants().iter().filter_map(|v| v.to_possible_value())
                }
            }

            impl std::str::FromStr for $name {
                type Err = String;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    <$name as clap::ArgEnum>::from_str(s, false)
                }
            }
        )*
    };
}

impl_arg_enum_parsing!(LogLevel, RunFormat, Strategy, OnMalformed);

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-numsort")
        .about("sorts files of numbers larger than memory")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file with whitespace or line delimited numbers to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file, one number per line")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("memory")
                .short('m')
                .long("memory")
                .help("memory budget for a single chunk")
                .takes_value(true)
                .default_value("100MiB")
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Memory budget format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("chunk_capacity")
                .short('c')
                .long("chunk-capacity")
                .help("number of values per chunk, overrides the memory budget")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("format")
                .short('f')
                .long("format")
                .help("intermediate run format")
                .takes_value(true)
                .default_value("rmp")
                .possible_values(RunFormat::possible_values()),
        )
        .arg(
            clap::Arg::new("strategy")
                .short('s')
                .long("strategy")
                .help("run merge algorithm")
                .takes_value(true)
                .default_value("heap")
                .possible_values(Strategy::possible_values()),
        )
        .arg(
            clap::Arg::new("on_malformed")
                .long("on-malformed")
                .help("what to do with tokens that are not numbers")
                .takes_value(true)
                .default_value("abort")
                .possible_values(OnMalformed::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel chunk sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store intermediate runs")
                .takes_value(true),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
