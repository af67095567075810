use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BackendError, Result};
use crate::models::{normalize_string, ProviderInput, ProviderRecord};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProviderStoreFile {
    #[serde(default)]
    providers: Vec<ProviderRecord>,
}

#[derive(Debug, Default)]
struct ProviderStoreState {
    providers: Vec<ProviderRecord>,
}

/// Ordered provider list backed by a single JSON file. Every mutation rewrites the
/// whole file before returning.
#[derive(Debug)]
pub struct ProviderStore {
    path: PathBuf,
    state: Mutex<ProviderStoreState>,
}

impl ProviderStore {
    pub fn load(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::load_from_path(path.to_path_buf())
    }

    fn load_from_path(path: PathBuf) -> Result<Self> {
        let state = match fs::read_to_string(&path) {
            Ok(contents) => {
                if contents.trim().is_empty() {
                    ProviderStoreState::default()
                } else {
                    parse_store_contents(&contents)?
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => ProviderStoreState::default(),
            Err(err) => return Err(err.into()),
        };

        log::debug!(
            "loaded {} providers from {}",
            state.providers.len(),
            path.display()
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn list(&self) -> Result<Vec<ProviderRecord>> {
        let state = self.lock_state()?;
        Ok(state.providers.clone())
    }

    pub fn get(&self, provider_id: &str) -> Result<Option<ProviderRecord>> {
        let provider_id = provider_id.trim();
        if provider_id.is_empty() {
            return Ok(None);
        }
        let state = self.lock_state()?;
        Ok(state
            .providers
            .iter()
            .find(|provider| provider.id == provider_id)
            .cloned())
    }

    pub fn add(&self, input: ProviderInput) -> Result<ProviderRecord> {
        let mut state = self.lock_state()?;
        let provider = new_record(&state.providers, input);
        state.providers.push(provider.clone());
        self.save_locked(&state)?;
        Ok(provider)
    }

    /// Replaces every field except the id. Returns `None` without touching the file when
    /// the id is unknown.
    pub fn update(&self, provider_id: &str, input: ProviderInput) -> Result<Option<ProviderRecord>> {
        let Some(provider_id) = normalize_string(provider_id) else {
            return Ok(None);
        };

        let mut state = self.lock_state()?;
        let Some(index) = state
            .providers
            .iter()
            .position(|provider| provider.id == provider_id)
        else {
            return Ok(None);
        };

        let unit = input.resolved_unit();
        let provider = ProviderRecord {
            id: provider_id,
            name: input.name,
            url: input.url,
            api_key: input.api_key,
            user_id: input.user_id,
            unit,
        };
        state.providers[index] = provider.clone();
        self.save_locked(&state)?;
        Ok(Some(provider))
    }

    pub fn delete(&self, provider_id: &str) -> Result<Option<ProviderRecord>> {
        let provider_id = provider_id.trim();
        if provider_id.is_empty() {
            return Ok(None);
        }

        let mut state = self.lock_state()?;
        let index = state
            .providers
            .iter()
            .position(|provider| provider.id == provider_id);
        let removed = index.map(|index| state.providers.remove(index));
        if removed.is_some() {
            self.save_locked(&state)?;
        }
        Ok(removed)
    }

    /// Appends already-validated entries in order with a single write.
    pub fn import(&self, inputs: Vec<ProviderInput>) -> Result<Vec<ProviderRecord>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.lock_state()?;
        let mut added = Vec::with_capacity(inputs.len());
        for input in inputs {
            let provider = new_record(&state.providers, input);
            state.providers.push(provider.clone());
            added.push(provider);
        }
        self.save_locked(&state)?;
        Ok(added)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ProviderStoreState>> {
        self.state
            .lock()
            .map_err(|_| BackendError::Store("provider store mutex poisoned".to_string()))
    }

    fn save_locked(&self, state: &ProviderStoreState) -> Result<()> {
        let payload = ProviderStoreFile {
            providers: state.providers.clone(),
        };
        let serialized = serde_json::to_string_pretty(&payload)?;
        fs::write(&self.path, serialized)?;
        Ok(())
    }
}

fn new_record(existing: &[ProviderRecord], input: ProviderInput) -> ProviderRecord {
    let mut id = Uuid::new_v4().to_string();
    while existing.iter().any(|provider| provider.id == id) {
        id = Uuid::new_v4().to_string();
    }

    let unit = input.resolved_unit();
    ProviderRecord {
        id,
        name: input.name,
        url: input.url,
        api_key: input.api_key,
        user_id: input.user_id,
        unit,
    }
}

fn parse_store_contents(contents: &str) -> Result<ProviderStoreState> {
    let store_file = serde_json::from_str::<ProviderStoreFile>(contents)?;
    Ok(ProviderStoreState {
        providers: store_file.providers,
    })
}
