//! Input value stream.

use std::io::{self, BufRead};

use log;

use crate::value::{ParseValueError, Value};

/// Input data stream error.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The underlying reader failed.
    #[error("input stream read failed: {0}")]
    Io(#[from] io::Error),
    /// A token that is not a number.
    #[error("malformed token {token:?} at line {line}")]
    Malformed { token: String, line: u64 },
    /// A NaN token. NaN has no position in the sort order.
    #[error("unorderable value {token:?} at line {line}")]
    NotANumber { token: String, line: u64 },
}

/// What to do when the input contains a token that is not a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Fail the whole job.
    #[default]
    Abort,
    /// Treat the malformed token as the end of input.
    StopReading,
}

/// Longest token accepted as a number. Longer tokens are reported as malformed without being buffered in full.
pub const MAX_TOKEN_LEN: usize = 1024;

/// Reads whitespace or line delimited numbers from a buffered reader.
///
/// Tokens are scanned straight out of the reader's buffer, so memory use does not depend on line length.
pub struct ValueReader<R> {
    reader: R,
    policy: MalformedPolicy,
    token: Vec<u8>,
    token_truncated: bool,
    line_number: u64,
    finished: bool,
}

impl<R: BufRead> ValueReader<R> {
    pub fn new(reader: R) -> Self {
        ValueReader {
            reader,
            policy: MalformedPolicy::default(),
            token: Vec::with_capacity(32),
            token_truncated: false,
            line_number: 1,
            finished: false,
        }
    }

    /// Sets the malformed token policy.
    pub fn with_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        return self;
    }

    /// Reads the next token into `self.token`. Returns `false` at the end of input.
    /// The whitespace byte ending a token is left unconsumed.
    fn next_token(&mut self) -> io::Result<bool> {
        self.token.clear();
        self.token_truncated = false;

        loop {
            let buf = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if buf.is_empty() {
                return Ok(!self.token.is_empty());
            }

            let mut used = 0;
            let mut complete = false;
            for &byte in buf {
                if byte.is_ascii_whitespace() {
                    if !self.token.is_empty() {
                        complete = true;
                        break;
                    }
                    if byte == b'\n' {
                        self.line_number += 1;
                    }
                } else if self.token.len() < MAX_TOKEN_LEN {
                    self.token.push(byte);
                } else {
                    self.token_truncated = true;
                }
                used += 1;
            }
            self.reader.consume(used);

            if complete {
                return Ok(true);
            }
        }
    }

    fn malformed(&self) -> InputError {
        InputError::Malformed {
            token: self.token_text(),
            line: self.line_number,
        }
    }

    fn token_text(&self) -> String {
        let text = String::from_utf8_lossy(&self.token);
        if self.token_truncated {
            format!("{}...", text)
        } else {
            text.into_owned()
        }
    }
}

impl<R: BufRead> Iterator for ValueReader<R> {
    type Item = Result<Value, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_token() {
            Ok(true) => {}
            Ok(false) => {
                self.finished = true;
                return None;
            }
            Err(err) => {
                self.finished = true;
                return Some(Err(InputError::Io(err)));
            }
        }

        let parsed = match std::str::from_utf8(&self.token) {
            Ok(token) if !self.token_truncated => token.parse::<Value>().map_err(Some),
            _ => Err(None),
        };

        match parsed {
            Ok(value) => Some(Ok(value)),
            Err(Some(ParseValueError::NotANumber)) => {
                self.finished = true;
                Some(Err(InputError::NotANumber {
                    token: self.token_text(),
                    line: self.line_number,
                }))
            }
            Err(Some(ParseValueError::Malformed(_))) | Err(None) => {
                self.finished = true;
                match self.policy {
                    MalformedPolicy::Abort => Some(Err(self.malformed())),
                    MalformedPolicy::StopReading => {
                        log::warn!(
                            "malformed token {:?} at line {}, treating it as end of input",
                            self.token_text(),
                            self.line_number
                        );
                        None
                    }
                }
            }
        }
    }
}
