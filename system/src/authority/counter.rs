use serde::{Deserialize, Serialize};
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::info;

#[derive(Debug, Serialize, Deserialize)]
struct CounterFile {
    last_issued: u64,
    leader: Option<u64>,
}

/// The leader's durable identifier counter.
///
/// The file always holds the last value handed out and the number the leader
/// claimed for itself. A missing file means nothing has been issued yet.
#[derive(Debug)]
pub struct Counter {
    path: PathBuf,
    last_issued: u64,
    leader: Option<u64>,
}

impl Counter {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Counter, Error> {
        let path = path.into();

        let counter_file = match fs::read(&path).await {
            Ok(bytes) => postcard::from_bytes(&bytes).map_err(|error| {
                Error::Storage(format!("{} is corrupt -> {}", path.display(), error))
            })?,
            Err(error) if error.kind() == ErrorKind::NotFound => CounterFile {
                last_issued: 0,
                leader: None,
            },
            Err(error) => {
                return Err(Error::Storage(format!(
                    "reading {} -> {}",
                    path.display(),
                    error,
                )))
            }
        };

        let CounterFile {
            last_issued,
            leader,
        } = counter_file;

        if leader.map_or(false, |num| num > last_issued) {
            return Err(Error::Storage(format!(
                "{} names leader {:?} beyond last issued {}",
                path.display(),
                leader,
                last_issued,
            )));
        }

        info!("last issued identifier -> {}", last_issued);

        Ok(Counter {
            path,
            last_issued,
            leader,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_issued(&self) -> u64 {
        self.last_issued
    }

    pub fn leader(&self) -> Option<u64> {
        self.leader
    }

    /// Persists the next value and only then hands it out. On error the
    /// in-memory value is left untouched so a retry cannot skip or repeat.
    pub async fn increment(&mut self) -> Result<u64, Error> {
        let next = self.next()?;

        self.store(next, self.leader).await?;

        Ok(next)
    }

    /// The leader's own number. Claimed from the counter once, then read back
    /// on every restart. The flag is true when the number was read back.
    pub async fn claim_leader(&mut self) -> Result<(u64, bool), Error> {
        if let Some(num) = self.leader {
            return Ok((num, true));
        }

        let next = self.next()?;

        self.store(next, Some(next)).await?;

        Ok((next, false))
    }

    fn next(&self) -> Result<u64, Error> {
        self.last_issued
            .checked_add(1)
            .ok_or_else(|| Error::Storage(String::from("identifier space exhausted")))
    }

    async fn store(&mut self, last_issued: u64, leader: Option<u64>) -> Result<(), Error> {
        let counter_file = CounterFile {
            last_issued,
            leader,
        };

        self.persist(&counter_file).await.map_err(|error| {
            Error::Storage(format!("writing {} -> {}", self.path.display(), error))
        })?;

        self.last_issued = last_issued;
        self.leader = leader;

        Ok(())
    }

    async fn persist(&self, counter_file: &CounterFile) -> io::Result<()> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        fs::create_dir_all(directory).await?;

        let payload = postcard::to_stdvec(counter_file)
            .map_err(|error| io::Error::new(ErrorKind::InvalidData, error))?;
        let tmp = self.tmp_path()?;
        let mut file = fs::File::create(&tmp).await?;

        file.write_all(&payload).await?;
        file.sync_all().await?;

        fs::rename(&tmp, &self.path).await?;

        // the rename is only durable once the directory entry is
        fs::File::open(directory).await?.sync_all().await?;

        Ok(())
    }

    /// Sibling of the counter file, named by appending to the full file name
    /// so it can never coincide with the counter itself.
    fn tmp_path(&self) -> io::Result<PathBuf> {
        let mut file_name = self
            .path
            .file_name()
            .ok_or_else(|| {
                io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("{} has no file name", self.path.display()),
                )
            })?
            .to_os_string();

        file_name.push(".tmp");

        Ok(self.path.with_file_name(file_name))
    }
}
