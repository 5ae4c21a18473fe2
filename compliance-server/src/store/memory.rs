use super::Persistence;
use crate::error::StoreError;
use crate::models::Report;
use parking_lot::Mutex;
use std::sync::Arc;

/// Persistance volatile (mode `persist: false`, tests).
/// Les clones partagent le même contenu, ce qui permet de "rouvrir" un store.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    saved: Arc<Mutex<Vec<Report>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dernier état sauvegardé
    pub fn saved(&self) -> Vec<Report> {
        self.saved.lock().clone()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<Vec<Report>, StoreError> {
        Ok(self.saved.lock().clone())
    }

    fn save(&self, reports: &[Report]) -> Result<(), StoreError> {
        *self.saved.lock() = reports.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory (not persisted)".to_string()
    }
}
