//! File-backed identifier registry.
//!
//! Issues short conversation identifiers with an at-most-one-owner
//! guarantee under concurrent allocators, possibly across processes.
//! The draw is optimistic; ownership is decided under an exclusive
//! advisory lock on the registry file, with membership re-checked after
//! the lock is acquired. The expanded registry is persisted with a
//! write-temp-then-rename so a crash never leaves a torn file. Lock
//! contention is retried with jittered exponential backoff.

use async_trait::async_trait;
use fs2::FileExt;
use rand::Rng;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::foundation::{ConversationId, ID_ALPHABET};
use crate::ports::{AllocationError, IdAllocator};

/// Identifier allocator backed by a lock-protected registry file.
///
/// Allocation serializes on the registry lock, which is acceptable
/// because allocation is rare relative to conversation turns.
#[derive(Debug, Clone)]
pub struct FileIdRegistry {
    registry_path: PathBuf,
    id_length: usize,
    max_draws: u32,
    lock_retries: u32,
    backoff_base: Duration,
}

impl FileIdRegistry {
    /// Create a registry at the given path with default parameters.
    pub fn new<P: AsRef<Path>>(registry_path: P) -> Self {
        Self {
            registry_path: registry_path.as_ref().to_path_buf(),
            id_length: 6,
            max_draws: 16,
            lock_retries: 5,
            backoff_base: Duration::from_millis(25),
        }
    }

    /// Sets the identifier length.
    pub fn with_id_length(mut self, length: usize) -> Self {
        self.id_length = length.clamp(4, 16);
        self
    }

    /// Sets the bound on optimistic draws per allocation.
    pub fn with_max_draws(mut self, draws: u32) -> Self {
        self.max_draws = draws.max(1);
        self
    }

    /// Sets the lock retry budget.
    pub fn with_lock_retries(mut self, retries: u32) -> Self {
        self.lock_retries = retries;
        self
    }

    /// Sets the base backoff delay between lock attempts.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Draws a random candidate token from the identifier alphabet.
    fn draw(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.id_length)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect()
    }

    /// The synchronous allocation path; runs on the blocking pool.
    fn allocate_blocking(&self) -> Result<ConversationId, AllocationError> {
        let draws = (0..self.max_draws).map(|_| self.draw());
        self.allocate_from(draws)
    }

    /// Decides ownership for each candidate in turn, under the lock.
    fn allocate_from<I>(&self, candidates: I) -> Result<ConversationId, AllocationError>
    where
        I: IntoIterator<Item = String>,
    {
        for candidate in candidates {
            let lock = self.acquire_lock()?;
            let registry = self.read_registry()?;

            // the pre-lock draw is optimistic; decide ownership under the lock
            if registry.contains(&candidate) {
                drop(lock);
                continue;
            }

            self.persist(&registry, &candidate)?;
            drop(lock);

            return ConversationId::new(candidate)
                .map_err(|e| AllocationError::Io(format!("drew an invalid token: {}", e)));
        }

        tracing::error!(draws = self.max_draws, "identifier space exhausted");
        Err(AllocationError::Exhausted {
            draws: self.max_draws,
        })
    }

    /// Acquires the exclusive advisory lock, retrying with jittered
    /// exponential backoff.
    fn acquire_lock(&self) -> Result<RegistryLock, AllocationError> {
        if let Some(parent) = self.registry_path.parent() {
            fs::create_dir_all(parent).map_err(|e| AllocationError::Io(e.to_string()))?;
        }
        let lock_path = self.registry_path.with_extension("lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| AllocationError::Io(e.to_string()))?;

        let mut rng = rand::thread_rng();
        for attempt in 0..=self.lock_retries {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(RegistryLock { file }),
                Err(_) if attempt < self.lock_retries => {
                    let backoff = self.backoff_base * 2u32.saturating_pow(attempt);
                    let jitter = Duration::from_millis(
                        rng.gen_range(0..=self.backoff_base.as_millis().max(1) as u64),
                    );
                    std::thread::sleep(backoff + jitter);
                }
                Err(err) => {
                    tracing::error!(error = %err, attempts = self.lock_retries + 1,
                        "registry lock contention exhausted retry budget");
                    return Err(AllocationError::LockContention {
                        attempts: self.lock_retries + 1,
                    });
                }
            }
        }
        unreachable!("loop always returns")
    }

    /// Reads the registry: one issued token per line.
    fn read_registry(&self) -> Result<HashSet<String>, AllocationError> {
        if !self.registry_path.exists() {
            return Ok(HashSet::new());
        }
        let content = fs::read_to_string(&self.registry_path)
            .map_err(|e| AllocationError::Io(e.to_string()))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Persists the expanded registry atomically (write-temp-then-rename).
    fn persist(
        &self,
        registry: &HashSet<String>,
        candidate: &str,
    ) -> Result<(), AllocationError> {
        let mut lines: Vec<&str> = registry.iter().map(String::as_str).collect();
        lines.sort_unstable();
        lines.push(candidate);
        let body = format!("{}\n", lines.join("\n"));

        let tmp_path = self.registry_path.with_extension("tmp");
        let mut tmp = File::create(&tmp_path).map_err(|e| AllocationError::Io(e.to_string()))?;
        tmp.write_all(body.as_bytes())
            .map_err(|e| AllocationError::Io(e.to_string()))?;
        tmp.sync_all().map_err(|e| AllocationError::Io(e.to_string()))?;
        drop(tmp);

        fs::rename(&tmp_path, &self.registry_path).map_err(|e| AllocationError::Io(e.to_string()))
    }
}

/// Held for the critical section; unlocks on drop.
struct RegistryLock {
    file: File,
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[async_trait]
impl IdAllocator for FileIdRegistry {
    async fn allocate(&self) -> Result<ConversationId, AllocationError> {
        let registry = self.clone();
        tokio::task::spawn_blocking(move || registry.allocate_blocking())
            .await
            .map_err(|e| AllocationError::Io(format!("allocator task failed: {}", e)))?
    }
}
