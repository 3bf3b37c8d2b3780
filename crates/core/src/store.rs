//! Saving and loading transcripts.
//!
//! Transcripts are stored as a JSON array of `{"role", "content"}` objects.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::conversation::Transcript;
use crate::error::PersistenceError;

/// Somewhere transcripts can be saved to and loaded from.
///
/// Calls are synchronous and complete before returning.
pub trait TranscriptStore {
    /// Identifies a saved transcript.
    type Handle;

    /// Saves `transcript`, returning the handle to load it again.
    fn save(&self, transcript: &Transcript) -> Result<Self::Handle, PersistenceError>;

    /// Loads the transcript saved under `handle`.
    fn load(&self, handle: &Self::Handle) -> Result<Transcript, PersistenceError>;
}

/// An in-memory store, mostly useful for tests.
///
/// Handles are sequence numbers starting from 0. Entries are kept
/// serialized, so loading goes through the same checks as a file would.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of saved transcripts.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing has been saved.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TranscriptStore for MemoryStore {
    type Handle = usize;

    fn save(&self, transcript: &Transcript) -> Result<usize, PersistenceError> {
        let json = serde_json::to_string(transcript)?;
        let mut entries =
            self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push(json);
        Ok(entries.len() - 1)
    }

    fn load(&self, handle: &usize) -> Result<Transcript, PersistenceError> {
        let entries =
            self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let json = entries
            .get(*handle)
            .ok_or_else(|| PersistenceError::NotFound(handle.to_string()))?;
        Ok(serde_json::from_str(json)?)
    }
}

const PROMPTS_DIR: &str = "prompts";
const HISTORY_PREFIX: &str = "history-";

/// A directory of JSON transcript files, plus saved system prompts.
///
/// ```text
/// <dir>/history-1.json
/// <dir>/<name>.json
/// <dir>/prompts/<name>.txt
/// ```
///
/// Handles are file paths. Files are written to a temporary name first and
/// then renamed, so a crash never leaves a truncated transcript behind.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Opens the store at `dir`, creating the directory if needed.
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!("opened transcript store at {}", dir.display());
        Ok(Self { dir })
    }

    /// Returns the directory of this store.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path a transcript saved as `name` lives at.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, PersistenceError> {
        check_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Saves `transcript` as `name`, replacing an existing one.
    pub fn save_as(
        &self,
        name: &str,
        transcript: &Transcript,
    ) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(name)?;
        let json = serde_json::to_string_pretty(transcript)?;
        write_atomically(&path, json.as_bytes())?;
        debug!(turns = transcript.len(), "saved to {}", path.display());
        Ok(path)
    }

    /// Returns a store that always saves as `name`.
    pub fn named(&self, name: &str) -> Result<Named<'_>, PersistenceError> {
        check_name(name)?;
        Ok(Named {
            store: self,
            name: name.to_owned(),
        })
    }

    /// Lists the names of saved transcripts, sorted.
    pub fn list(&self) -> Result<Vec<String>, PersistenceError> {
        list_stems(&self.dir, "json")
    }

    /// Saves a system prompt as `name`, replacing an existing one.
    pub fn save_prompt(
        &self,
        name: &str,
        prompt: &str,
    ) -> Result<PathBuf, PersistenceError> {
        check_name(name)?;
        let dir = self.dir.join(PROMPTS_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{name}.txt"));
        write_atomically(&path, prompt.as_bytes())?;
        Ok(path)
    }

    /// Loads the system prompt saved as `name`.
    pub fn load_prompt(&self, name: &str) -> Result<String, PersistenceError> {
        check_name(name)?;
        let path = self.dir.join(PROMPTS_DIR).join(format!("{name}.txt"));
        fs::read_to_string(&path).map_err(|err| not_found_or_io(err, name))
    }

    /// Lists the names of saved system prompts, sorted.
    pub fn list_prompts(&self) -> Result<Vec<String>, PersistenceError> {
        let dir = self.dir.join(PROMPTS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        list_stems(&dir, "txt")
    }

    fn next_history_path(&self) -> PathBuf {
        let mut n = 1u64;
        loop {
            let path = self.dir.join(format!("{HISTORY_PREFIX}{n}.json"));
            if !path.exists() {
                return path;
            }
            n += 1;
        }
    }
}

impl TranscriptStore for JsonFileStore {
    type Handle = PathBuf;

    /// Saves `transcript` as `history-<n>.json` with the first free `n`.
    fn save(&self, transcript: &Transcript) -> Result<PathBuf, PersistenceError> {
        let path = self.next_history_path();
        let json = serde_json::to_string_pretty(transcript)?;
        write_atomically(&path, json.as_bytes())?;
        debug!(turns = transcript.len(), "saved to {}", path.display());
        Ok(path)
    }

    fn load(&self, handle: &PathBuf) -> Result<Transcript, PersistenceError> {
        let json = fs::read_to_string(handle)
            .map_err(|err| not_found_or_io(err, &handle.display().to_string()))?;
        let transcript: Transcript = serde_json::from_str(&json)?;
        debug!(turns = transcript.len(), "loaded {}", handle.display());
        Ok(transcript)
    }
}

/// A fixed name in a [`JsonFileStore`], see [`JsonFileStore::named`].
#[derive(Clone, Debug)]
pub struct Named<'a> {
    store: &'a JsonFileStore,
    name: String,
}

impl TranscriptStore for Named<'_> {
    type Handle = PathBuf;

    #[inline]
    fn save(&self, transcript: &Transcript) -> Result<PathBuf, PersistenceError> {
        self.store.save_as(&self.name, transcript)
    }

    #[inline]
    fn load(&self, handle: &PathBuf) -> Result<Transcript, PersistenceError> {
        self.store.load(handle)
    }
}

fn check_name(name: &str) -> Result<(), PersistenceError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidName(name.to_owned()))
    }
}

fn not_found_or_io(err: io::Error, what: &str) -> PersistenceError {
    if err.kind() == io::ErrorKind::NotFound {
        PersistenceError::NotFound(what.to_owned())
    } else {
        PersistenceError::Io(err)
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

fn list_stems(dir: &Path, extension: &str) -> Result<Vec<String>, PersistenceError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file()
            || path.extension().and_then(|ext| ext.to_str()) != Some(extension)
        {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            names.push(stem.to_owned());
        }
    }
    names.sort();
    Ok(names)
}
