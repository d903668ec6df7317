//! Tracking of participating sites.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use derive_more::{Display, From, Into};
use thiserror::Error;

/// Unique, stable id of a participating site.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into, Serialize, Deserialize,
)]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque credential material a site presents at registration.
#[derive(Clone, PartialEq, Eq, From, Into, Serialize, Deserialize)]
pub struct Credentials(String);

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Credentials(<redacted>)")
    }
}

impl From<&str> for Credentials {
    fn from(material: &str) -> Self {
        Self(material.to_string())
    }
}

/// Fingerprint of a site's local dataset.
#[derive(Debug, Clone, PartialEq, Eq, Display, From, Into, Serialize, Deserialize)]
pub struct DataFingerprint(String);

/// One participating site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    /// Unique, stable id of the site.
    pub id: ClientId,
    /// Human readable name, shown in logs and reports.
    pub display_name: String,
    /// Credential material presented at registration.
    pub credential_material: Credentials,
    /// Fingerprint of the site's local dataset, if the site reported one.
    pub data_fingerprint: Option<DataFingerprint>,
    /// The latest committed round this site contributed to.
    pub last_update_round: Option<u64>,
}

/// An error related to registering sites.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("client {0} is already registered")]
    Duplicate(ClientId),
}

/// A cheaply clonable handle over the shared set of registered sites.
///
/// All clones observe the same state. The registry is safe to use while a round is
/// running; the coordinator snapshots [`active_ids`] once at round start.
///
/// [`active_ids`]: Registry::active_ids
#[derive(Debug, Clone, Default)]
pub struct Registry {
    clients: Arc<Mutex<HashMap<ClientId, Client>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new site.
    ///
    /// # Errors
    /// Rejects an id that is already present and leaves the existing record untouched.
    pub fn register_client(
        &self,
        id: ClientId,
        display_name: &str,
        credential_material: Credentials,
    ) -> Result<(), RegistrationError> {
        let mut clients = self.lock();
        if clients.contains_key(&id) {
            return Err(RegistrationError::Duplicate(id));
        }
        clients.insert(
            id.clone(),
            Client {
                id,
                display_name: display_name.to_string(),
                credential_material,
                data_fingerprint: None,
                last_update_round: None,
            },
        );
        Ok(())
    }

    /// Inserts or replaces a site record, keyed by its id.
    pub fn register(&self, client: Client) {
        self.lock().insert(client.id.clone(), client);
    }

    /// Looks up one site.
    pub fn lookup(&self, id: &ClientId) -> Option<Client> {
        self.lock().get(id).cloned()
    }

    /// The ids of all registered sites, sorted.
    pub fn active_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Marks the given sites as contributors to a committed round.
    pub fn record_participation(&self, ids: &[ClientId], round_number: u64) {
        let mut clients = self.lock();
        for id in ids {
            if let Some(client) = clients.get_mut(id) {
                client.last_update_round = Some(round_number);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<HashMap<ClientId, Client>> {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
