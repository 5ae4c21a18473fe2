/**
 * REPORT STORE - Log append-only des rapports de conformité
 *
 * RÔLE :
 * Collection ordonnée (ordre d'insertion) de tous les rapports reçus.
 * Aucun index : le moteur de requêtes rescanne tout à chaque lecture.
 *
 * FONCTIONNEMENT :
 * - Persistence trait = frontière avec le support durable (fichier JSON, mémoire)
 * - ReportStore = cache mémoire + un seul écrivain à la fois
 * - append valide, ajoute, persiste ; si la persistance échoue l'ajout est annulé
 * - les lecteurs voient l'état avant ou après un append, jamais entre les deux
 *
 * Instance construite explicitement dans main puis passée à l'état HTTP.
 */

mod json_file;
mod memory;

pub use json_file::JsonFilePersistence;
pub use memory::MemoryPersistence;

use crate::error::{AppendError, StoreError};
use crate::models::{Report, ReportInput};
use parking_lot::RwLock;
use tracing::info;

/// Support durable du log. `save` reçoit toujours la collection complète.
pub trait Persistence: Send + Sync {
    fn load(&self) -> Result<Vec<Report>, StoreError>;
    fn save(&self, reports: &[Report]) -> Result<(), StoreError>;
    /// Description courte pour les logs et /system/health
    fn describe(&self) -> String;
}

pub struct ReportStore {
    persistence: Box<dyn Persistence>,
    reports: RwLock<Vec<Report>>,
}

impl ReportStore {
    /// Charge le log existant (ou le crée vide)
    pub fn open<P: Persistence + 'static>(persistence: P) -> Result<Self, StoreError> {
        let reports = persistence.load()?;
        info!("[store] loaded {} reports from {}", reports.len(), persistence.describe());
        Ok(Self {
            persistence: Box::new(persistence),
            reports: RwLock::new(reports),
        })
    }

    /// Valide puis ajoute un rapport. Retourne une fois le log persisté.
    pub fn append(&self, input: ReportInput) -> Result<Report, AppendError> {
        let report = input.validate()?;

        let mut reports = self.reports.write();
        reports.push(report.clone());
        if let Err(e) = self.persistence.save(&reports) {
            reports.pop();
            return Err(e.into());
        }
        Ok(report)
    }

    /// Vue cohérente du log (ordre d'insertion) sous le verrou lecteur
    pub fn with_reports<R>(&self, f: impl FnOnce(&[Report]) -> R) -> R {
        let reports = self.reports.read();
        f(&reports)
    }

    pub fn len(&self) -> usize {
        self.reports.read().len()
    }

    pub fn describe(&self) -> String {
        self.persistence.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct BrokenDisk;

    impl Persistence for BrokenDisk {
        fn load(&self) -> Result<Vec<Report>, StoreError> {
            Ok(Vec::new())
        }
        fn save(&self, _reports: &[Report]) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        }
        fn describe(&self) -> String {
            "broken".into()
        }
    }

    fn input(v: serde_json::Value) -> ReportInput {
        ReportInput::from_json(v).unwrap()
    }

    #[test]
    fn test_append_keeps_insertion_order() {
        let store = ReportStore::open(MemoryPersistence::new()).unwrap();
        for (id, ts) in [("b", 5), ("a", 1), ("b", 2)] {
            store.append(input(json!({"machine_id": id, "timestamp": ts, "checks": {}}))).unwrap();
        }
        let seen: Vec<(String, i64)> =
            store.with_reports(|reports| reports.iter().map(|r| (r.machine_id.clone(), r.timestamp)).collect());
        assert_eq!(seen, vec![("b".to_string(), 5), ("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn test_rejected_report_leaves_store_untouched() {
        let store = ReportStore::open(MemoryPersistence::new()).unwrap();
        store.append(input(json!({"machine_id": "m1", "timestamp": 1, "checks": {}}))).unwrap();

        let err = store.append(input(json!({"machine_id": "m1", "checks": {}}))).unwrap_err();
        assert!(matches!(err, AppendError::Invalid(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_failed_save_is_rolled_back() {
        let store = ReportStore::open(BrokenDisk).unwrap();
        let err = store
            .append(input(json!({"machine_id": "m1", "timestamp": 1, "checks": {}})))
            .unwrap_err();
        assert!(matches!(err, AppendError::Store(_)));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_append_persists_full_collection() {
        let disk = MemoryPersistence::new();
        let store = ReportStore::open(disk.clone()).unwrap();
        store.append(input(json!({"machine_id": "m1", "timestamp": 1, "checks": {}}))).unwrap();
        store.append(input(json!({"machine_id": "m2", "timestamp": 2, "checks": {}}))).unwrap();
        assert_eq!(disk.saved().len(), 2);

        // réouverture = même contenu
        let reopened = ReportStore::open(disk).unwrap();
        assert_eq!(reopened.with_reports(|r| r.to_vec()), store.with_reports(|r| r.to_vec()));
    }
}
