//! External sorter.

use log;
use std::io::{self, prelude::*};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use rayon::slice::ParallelSliceMut;

use crate::buffer::{chunk_capacity_for_memory, ChunkBuffer, DEFAULT_MEMORY_BUDGET};
use crate::input::{InputError, MalformedPolicy, ValueReader};
use crate::merger::{BinaryHeapMerger, LinearScanMerger, MergeStrategy};
use crate::run::{ExternalRun, RmpRun, RunError, RunSet};
use crate::value::Value;

/// Sorting error.
#[derive(Debug, thiserror::Error)]
pub enum SortError {
    /// Invalid sorter configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Workers thread pool initialization error.
    #[error("thread pool initialization failed: {0}")]
    ThreadPoolBuild(#[from] rayon::ThreadPoolBuildError),
    /// Input data stream error.
    #[error("input read error: {0}")]
    InputRead(#[from] InputError),
    /// Run creation, writing or reading error.
    #[error("run storage error: {0}")]
    RunStorage(#[from] RunError),
    /// Output sink error.
    #[error("output write error: {0}")]
    OutputWrite(#[source] io::Error),
}

/// Result of a completed sort job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSummary {
    /// Number of runs the input was split into.
    pub runs: usize,
    /// Number of values written to the output.
    pub values: u64,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder<C = RmpRun>
where
    C: ExternalRun,
{
    /// Number of threads to be used to sort chunks.
    threads_number: Option<usize>,
    /// Directory to be used to store runs.
    tmp_dir: Option<PathBuf>,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Maximum number of values held in memory at once.
    chunk_capacity: usize,
    /// Malformed input token handling.
    malformed_policy: MalformedPolicy,
    /// Run merge algorithm.
    merge_strategy: MergeStrategy,

    /// External run type.
    external_run_type: PhantomData<C>,
}

impl<C> ExternalSorterBuilder<C>
where
    C: ExternalRun,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<C>, SortError> {
        ExternalSorter::new(
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.chunk_capacity,
            self.rw_buf_size,
            self.malformed_policy,
            self.merge_strategy,
        )
    }

    /// Sets number of threads to be used to sort chunks in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder<C> {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store runs.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder<C> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets the number of values a chunk may hold.
    pub fn with_chunk_capacity(mut self, chunk_capacity: usize) -> ExternalSorterBuilder<C> {
        self.chunk_capacity = chunk_capacity;
        return self;
    }

    /// Derives the chunk capacity from a memory budget in bytes.
    pub fn with_memory_budget(mut self, budget: u64) -> ExternalSorterBuilder<C> {
        self.chunk_capacity = chunk_capacity_for_memory(budget);
        return self;
    }

    /// Sets run read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder<C> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets malformed input token handling.
    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> ExternalSorterBuilder<C> {
        self.malformed_policy = policy;
        return self;
    }

    /// Sets run merge algorithm.
    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> ExternalSorterBuilder<C> {
        self.merge_strategy = strategy;
        return self;
    }
}

impl<C> Default for ExternalSorterBuilder<C>
where
    C: ExternalRun,
{
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: None,
            chunk_capacity: chunk_capacity_for_memory(DEFAULT_MEMORY_BUDGET),
            malformed_policy: MalformedPolicy::default(),
            merge_strategy: MergeStrategy::default(),
            external_run_type: PhantomData,
        }
    }
}

/// External sorter.
///
/// Sorting happens in two sequential phases: [`ExternalSorter::produce_runs`] splits the input into sorted runs,
/// [`ExternalSorter::merge_runs`] merges them into the output. [`ExternalSorter::sort`] runs both and removes the
/// runs afterwards.
pub struct ExternalSorter<C = RmpRun>
where
    C: ExternalRun,
{
    /// Chunk sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store runs.
    tmp_dir: Option<PathBuf>,
    /// Maximum number of values held in memory at once.
    chunk_capacity: usize,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Malformed input token handling.
    malformed_policy: MalformedPolicy,
    /// Run merge algorithm.
    merge_strategy: MergeStrategy,

    /// External run type.
    external_run_type: PhantomData<C>,
}

impl<C> ExternalSorter<C>
where
    C: ExternalRun,
{
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort chunks in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store runs. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `chunk_capacity` - Maximum number of values held in memory at once. Must be positive.
    /// * `rw_buf_size` - Run file read/write buffer size.
    /// * `malformed_policy` - What to do with input tokens that are not numbers.
    /// * `merge_strategy` - Run merge algorithm.
    pub fn new(
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        chunk_capacity: usize,
        rw_buf_size: Option<usize>,
        malformed_policy: MalformedPolicy,
        merge_strategy: MergeStrategy,
    ) -> Result<Self, SortError> {
        if chunk_capacity == 0 {
            return Err(SortError::Config("chunk capacity must be at least 1".to_string()));
        }
        if rw_buf_size == Some(0) {
            return Err(SortError::Config("read/write buffer size must be at least 1".to_string()));
        }

        log::info!("chunk capacity: {} values", chunk_capacity);

        return Ok(ExternalSorter {
            chunk_capacity,
            rw_buf_size,
            malformed_policy,
            merge_strategy,
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: tmp_path.map(Path::to_path_buf),
            external_run_type: PhantomData,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder.build()?;

        return Ok(thread_pool);
    }

    /// Maximum number of values held in memory at once.
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Sorts numbers read from the input and writes them to the output one per line.
    /// Intermediate runs are removed when the job finishes, whether it succeeded or not.
    ///
    /// # Arguments
    /// * `input` - Whitespace or line delimited numbers
    /// * `output` - Sorted numbers destination
    pub fn sort<R, W>(&self, input: R, output: W) -> Result<SortSummary, SortError>
    where
        R: BufRead,
        W: Write,
    {
        let runs = self.produce_runs(ValueReader::new(input).with_policy(self.malformed_policy))?;
        let run_count = runs.len();

        let merged = self.merge_runs(&runs, output);
        if let Err(err) = runs.cleanup() {
            log::warn!("run cleanup failed: {}", err);
        }

        return Ok(SortSummary {
            runs: run_count,
            values: merged?,
        });
    }

    /// Splits the input into chunks of at most `chunk_capacity` values, sorts every chunk and persists it as a run.
    /// Only one chunk is held in memory at a time.
    ///
    /// # Arguments
    /// * `input` - Input values stream
    pub fn produce_runs<I>(&self, input: I) -> Result<RunSet<C>, SortError>
    where
        I: IntoIterator<Item = Result<Value, InputError>>,
    {
        let mut runs = RunSet::create(self.tmp_dir.as_deref(), self.rw_buf_size)?;
        let mut chunk: Option<ChunkBuffer> = None;

        for value in input.into_iter() {
            let buffer = chunk.get_or_insert_with(|| ChunkBuffer::new(self.chunk_capacity));
            buffer.push(value?);

            if buffer.is_full() {
                if let Some(buffer) = chunk.take() {
                    self.persist_chunk(&mut runs, buffer)?;
                }
            }
        }

        if let Some(buffer) = chunk.take() {
            self.persist_chunk(&mut runs, buffer)?;
        }

        log::info!("input split into {} runs ({} values)", runs.len(), runs.total_values());

        return Ok(runs);
    }

    fn persist_chunk(&self, runs: &mut RunSet<C>, mut buffer: ChunkBuffer) -> Result<(), SortError> {
        log::debug!("sorting chunk of {} values ...", buffer.len());
        self.thread_pool.install(|| {
            buffer.par_sort_unstable();
        });

        log::debug!("saving chunk data");
        runs.persist(buffer)?;

        return Ok(());
    }

    /// Merges all runs into the output, one value per line. The output is written incrementally and flushed at the
    /// end. Returns the number of values written. The runs are left in place; see [`RunSet::cleanup`].
    ///
    /// # Arguments
    /// * `runs` - Runs to be merged
    /// * `output` - Sorted values destination
    pub fn merge_runs<W>(&self, runs: &RunSet<C>, output: W) -> Result<u64, SortError>
    where
        W: Write,
    {
        log::info!(
            "merging {} runs ({} values, strategy: {:?})",
            runs.len(),
            runs.total_values(),
            self.merge_strategy
        );

        let cursors = runs.open_all()?;
        let written = match self.merge_strategy {
            MergeStrategy::Heap => self.write_sorted(BinaryHeapMerger::new(cursors), output)?,
            MergeStrategy::LinearScan => self.write_sorted(LinearScanMerger::new(cursors), output)?,
        };

        if written != runs.total_values() {
            return Err(SortError::RunStorage(RunError::LengthMismatch {
                expected: runs.total_values(),
                actual: written,
            }));
        }

        log::info!("merge done ({} values written)", written);

        return Ok(written);
    }

    fn write_sorted<I, W>(&self, sorted: I, output: W) -> Result<u64, SortError>
    where
        I: Iterator<Item = Result<Value, RunError>>,
        W: Write,
    {
        let mut writer = match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, output),
            None => io::BufWriter::new(output),
        };

        let mut written = 0;
        for value in sorted {
            writeln!(writer, "{}", value?).map_err(SortError::OutputWrite)?;
            written += 1;
        }
        writer.flush().map_err(SortError::OutputWrite)?;

        return Ok(written);
    }
}
