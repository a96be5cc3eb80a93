//! Sorted runs stored on file system.

use std::fs;
use std::io::{self, prelude::*};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use log;
use tempfile;

use crate::value::Value;

/// Run storage error.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Run file creation, writing or reading failed.
    #[error("I/O operation failed: {0}")]
    Io(#[from] io::Error),
    /// Value serialization error.
    #[error("value serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    /// Value deserialization error.
    #[error("value deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    /// A text run contains something that is not a value.
    #[error("corrupted run record {token:?}")]
    Corrupt { token: String },
    /// Fewer or more values were read back than were persisted.
    #[error("runs hold {expected} values but {actual} were merged")]
    LengthMismatch { expected: u64, actual: u64 },
}

/// External run interface. Provides methods for writing sorted values to a file and reading them back.
pub trait ExternalRun: Sized + Iterator<Item = Result<Value, RunError>> {
    /// Creates a run reading values from the provided reader.
    fn new(reader: io::Take<io::BufReader<fs::File>>) -> Self;

    /// Dumps values to a run file. Returns the number of values written.
    fn dump(writer: &mut io::BufWriter<fs::File>, values: impl IntoIterator<Item = Value>) -> Result<u64, RunError>;
}

/// RMP (Rust MessagePack) run implementation.
/// It uses MessagePack as a data serialization format.
/// For more information see https://msgpack.org/.
pub struct RmpRun {
    reader: io::Take<io::BufReader<fs::File>>,
}

impl ExternalRun for RmpRun {
    fn new(reader: io::Take<io::BufReader<fs::File>>) -> Self {
        RmpRun { reader }
    }

    fn dump(
        mut writer: &mut io::BufWriter<fs::File>,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<u64, RunError> {
        let mut count = 0;
        for value in values.into_iter() {
            rmp_serde::encode::write(&mut writer, &value)?;
            count += 1;
        }

        return Ok(count);
    }
}

impl Iterator for RmpRun {
    type Item = Result<Value, RunError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.limit() == 0 {
            None
        } else {
            Some(rmp_serde::decode::from_read(&mut self.reader).map_err(RunError::from))
        }
    }
}

/// Plain text run implementation. One value per line.
pub struct TextRun {
    reader: io::Take<io::BufReader<fs::File>>,
    line: String,
}

impl ExternalRun for TextRun {
    fn new(reader: io::Take<io::BufReader<fs::File>>) -> Self {
        TextRun {
            reader,
            line: String::new(),
        }
    }

    fn dump(writer: &mut io::BufWriter<fs::File>, values: impl IntoIterator<Item = Value>) -> Result<u64, RunError> {
        let mut count = 0;
        for value in values.into_iter() {
            writeln!(writer, "{}", value)?;
            count += 1;
        }

        return Ok(count);
    }
}

impl Iterator for TextRun {
    type Item = Result<Value, RunError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(RunError::Io(err))),
            }

            let token = self.line.trim();
            if token.is_empty() {
                continue;
            }

            return Some(token.parse::<Value>().map_err(|_| RunError::Corrupt {
                token: token.to_owned(),
            }));
        }
    }
}

/// A persisted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    /// Run file location.
    pub path: PathBuf,
    /// Number of values in the run.
    pub len: u64,
}

/// All runs of one sort job, stored in a dedicated temporary directory.
///
/// Only fully written runs are ever registered. The directory and every run in it is removed by
/// [`RunSet::cleanup`], or when the set is dropped.
pub struct RunSet<C = RmpRun> {
    dir: tempfile::TempDir,
    runs: Vec<RunInfo>,
    rw_buf_size: Option<usize>,

    run_type: PhantomData<C>,
}

impl<C: ExternalRun> RunSet<C> {
    /// Creates an empty run set.
    ///
    /// # Arguments
    /// * `tmp_path` - Directory the run directory is created in. If the parameter is [`None`] default OS temporary
    ///   directory will be used.
    /// * `rw_buf_size` - Run file read/write buffer size.
    pub fn create(tmp_path: Option<&Path>, rw_buf_size: Option<usize>) -> Result<Self, RunError> {
        let dir = match tmp_path {
            Some(tmp_path) => tempfile::Builder::new().prefix("runs-").tempdir_in(tmp_path),
            None => tempfile::Builder::new().prefix("runs-").tempdir(),
        }?;

        log::info!("using {} as a run directory", dir.path().display());

        return Ok(RunSet {
            dir,
            runs: Vec::new(),
            rw_buf_size,
            run_type: PhantomData,
        });
    }

    /// Writes sorted values as a new run and registers it.
    /// Nothing is registered for an empty input. If writing fails the partial file is removed.
    pub fn persist(&mut self, values: impl IntoIterator<Item = Value>) -> Result<Option<&RunInfo>, RunError> {
        let index = self.runs.len();
        let path = self.dir.path().join(format!("run-{:06}", index));

        let len = match self.write_run(&path, values) {
            Ok(len) => len,
            Err(err) => {
                if let Err(remove_err) = fs::remove_file(&path) {
                    log::debug!("partial run {} not removed: {}", path.display(), remove_err);
                }
                return Err(err);
            }
        };

        if len == 0 {
            fs::remove_file(&path)?;
            return Ok(None);
        }

        log::debug!("run {} saved ({} values)", index, len);
        self.runs.push(RunInfo { path, len });

        return Ok(self.runs.last());
    }

    fn write_run(&self, path: &Path, values: impl IntoIterator<Item = Value>) -> Result<u64, RunError> {
        let file = fs::File::create(path)?;
        let mut writer = match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        let len = C::dump(&mut writer, values)?;
        writer.flush()?;

        return Ok(len);
    }

    /// Opens a run for reading.
    pub fn open(&self, run: &RunInfo) -> Result<C, RunError> {
        let file = fs::File::open(&run.path)?;
        let file_len = file.metadata()?.len();

        let reader = match self.rw_buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(C::new(reader.take(file_len)));
    }

    /// Opens every run. Each returned cursor holds its own file handle.
    pub fn open_all(&self) -> Result<Vec<C>, RunError> {
        self.runs.iter().map(|run| self.open(run)).collect()
    }

    /// Persisted runs in creation order.
    pub fn runs(&self) -> &[RunInfo] {
        &self.runs
    }

    /// Number of persisted runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Checks if no run was persisted.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Total number of values across all runs.
    pub fn total_values(&self) -> u64 {
        self.runs.iter().map(|run| run.len).sum()
    }

    /// Run directory location.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes every run together with the run directory.
    pub fn cleanup(self) -> Result<(), RunError> {
        let path = self.dir.path().to_owned();
        self.dir.close()?;
        log::debug!("run directory {} removed", path.display());

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::{self, prelude::*};

    use rstest::*;

    use super::{ExternalRun, RmpRun, RunError, RunSet, TextRun};
    use crate::value::Value;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn values(numbers: &[f64]) -> Vec<Value> {
        numbers.iter().map(|&n| Value::new(n).unwrap()).collect()
    }

    fn check_persisted_runs<C: ExternalRun>(tmp_dir: &tempfile::TempDir) {
        let mut run_set: RunSet<C> = RunSet::create(Some(tmp_dir.path()), None).unwrap();

        let first = values(&[-1.5, 0.0, 0.1, 7.0, 1e300]);
        let second = values(&[f64::NEG_INFINITY, 2.0, 2.0]);

        run_set.persist(first.clone()).unwrap();
        run_set.persist(second.clone()).unwrap();

        assert_eq!(run_set.len(), 2);
        assert_eq!(run_set.total_values(), 8);
        assert_eq!(run_set.runs()[1].len, 3);
        assert!(run_set.runs()[1].path.ends_with("run-000001"));

        let restored: Vec<Vec<Value>> = run_set
            .open_all()
            .unwrap()
            .into_iter()
            .map(|run| run.collect::<Result<Vec<_>, RunError>>().unwrap())
            .collect();

        assert_eq!(restored, vec![first, second]);
    }

    #[rstest]
    fn test_rmp_runs(tmp_dir: tempfile::TempDir) {
        check_persisted_runs::<RmpRun>(&tmp_dir);
    }

    #[rstest]
    fn test_text_runs(tmp_dir: tempfile::TempDir) {
        check_persisted_runs::<TextRun>(&tmp_dir);
    }

    #[rstest]
    fn test_empty_run_not_registered(tmp_dir: tempfile::TempDir) {
        let mut run_set: RunSet<RmpRun> = RunSet::create(Some(tmp_dir.path()), Some(64)).unwrap();

        assert!(run_set.persist(Vec::new()).unwrap().is_none());
        assert!(run_set.is_empty());
        assert_eq!(std::fs::read_dir(run_set.path()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_cleanup(tmp_dir: tempfile::TempDir) {
        let mut run_set: RunSet<TextRun> = RunSet::create(Some(tmp_dir.path()), None).unwrap();
        let run_path = run_set.persist(values(&[1.0])).unwrap().unwrap().path.clone();
        let dir_path = run_set.path().to_owned();
        assert!(run_path.exists());

        run_set.cleanup().unwrap();

        assert!(!run_path.exists());
        assert!(!dir_path.exists());
    }

    #[rstest]
    fn test_corrupted_text_run(tmp_dir: tempfile::TempDir) {
        let mut run_set: RunSet<TextRun> = RunSet::create(Some(tmp_dir.path()), None).unwrap();
        let run_path = run_set.persist(values(&[1.0, 2.0])).unwrap().unwrap().path.clone();
        std::fs::write(&run_path, "1\noops\n").unwrap();

        let restored: Result<Vec<Value>, RunError> = run_set.open_all().unwrap().remove(0).collect();
        assert!(matches!(restored, Err(RunError::Corrupt { ref token }) if token == "oops"));
    }

    /// Run format that fails half way through writing.
    struct BrokenRun;

    impl ExternalRun for BrokenRun {
        fn new(_: io::Take<io::BufReader<fs::File>>) -> Self {
            BrokenRun
        }

        fn dump(writer: &mut io::BufWriter<fs::File>, values: impl IntoIterator<Item = Value>) -> Result<u64, RunError> {
            for value in values.into_iter().take(2) {
                writeln!(writer, "{}", value)?;
            }
            writer.flush()?;

            Err(RunError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }
    }

    impl Iterator for BrokenRun {
        type Item = Result<Value, RunError>;

        fn next(&mut self) -> Option<Self::Item> {
            None
        }
    }

    #[rstest]
    fn test_failed_run_not_registered(tmp_dir: tempfile::TempDir) {
        let mut run_set: RunSet<BrokenRun> = RunSet::create(Some(tmp_dir.path()), None).unwrap();

        let result = run_set.persist(values(&[1.0, 2.0, 3.0]));

        assert!(matches!(result, Err(RunError::Io(_))));
        assert!(run_set.is_empty());
        assert_eq!(run_set.total_values(), 0);
        assert_eq!(fs::read_dir(run_set.path()).unwrap().count(), 0);
    }
}
