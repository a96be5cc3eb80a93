//! `ext-numsort` sorts files of numbers that do not fit into memory.
//!
//! Sorting is achieved in two sequential phases. During the first phase the input is split into chunks bounded by
//! a memory budget, every chunk is sorted in memory and saved to a temporary file as a sorted *run*. During the
//! second phase all runs are merged into a single sorted output by repeatedly picking the smallest head value
//! among them (k-way merge). For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Bounded memory:**
//!   at most one chunk is held in memory at a time. Chunk capacity is given directly or derived from a memory budget.
//! * **Explicit phases:**
//!   [`ExternalSorter::produce_runs`] returns a [`RunSet`] which [`ExternalSorter::merge_runs`] consumes, so each phase
//!   can be driven and tested on its own. [`RunSet::cleanup`] removes the runs.
//! * **Run format agnostic:**
//!   runs are stored as `MessagePack` by default ([`RmpRun`]) or as plain text ([`TextRun`]); other formats can be
//!   added by implementing [`ExternalRun`].
//! * **Multithreading support:**
//!   chunks are sorted using a thread pool.
//!
//! NaN never enters a sort: it is rejected while reading the input.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//! use std::path;
//!
//! use log;
//!
//! use ext_numsort::{ExternalSorter, ExternalSorterBuilder};
//!
//! fn main() {
//!     let input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
//!     let output_writer = fs::File::create("output.txt").unwrap();
//!
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_memory_budget(50 * 1024 * 1024)
//!         .build()
//!         .unwrap();
//!
//!     let summary = sorter.sort(input_reader, output_writer).unwrap();
//!     log::info!("{} values sorted", summary.values);
//! }
//! ```

pub mod buffer;
pub mod input;
pub mod merger;
pub mod run;
pub mod sort;
pub mod value;

pub use buffer::{chunk_capacity_for_memory, ChunkBuffer};
pub use input::{InputError, MalformedPolicy, ValueReader};
pub use merger::{BinaryHeapMerger, LinearScanMerger, MergeStrategy};
pub use run::{ExternalRun, RmpRun, RunError, RunInfo, RunSet, TextRun};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortSummary};
pub use value::{ParseValueError, Value};
