/**
 * PERSISTANCE JSON - Log des rapports dans un fichier unique
 *
 * FORMAT : `{"reports": [...]}`, timestamp stocké sous `ts`
 * (lisible tel quel par l'ancienne base JSON du serveur).
 *
 * CHARGEMENT : rapport par rapport. L'ancienne base acceptait des enregistrements
 * que le modèle actuel refuse (`ts: null` issu d'un NaN, check qui n'est pas un objet) :
 * ils sont ignorés avec un warning et le fichier d'origine est copié en `.bak`,
 * puisque la prochaine écriture ne les contiendra plus.
 *
 * ÉCRITURE : fichier temporaire voisin + fsync + rename, un lecteur du fichier
 * voit toujours l'ancienne ou la nouvelle version complète.
 */

use super::Persistence;
use crate::error::StoreError;
use crate::models::Report;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// Document brut : chaque rapport est converti séparément
#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    reports: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    reports: &'a [Report],
}

pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "db.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "db.json".into());
        name.push(".bak");
        self.path.with_file_name(name)
    }

    fn ensure_parent_dir(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl Persistence for JsonFilePersistence {
    fn load(&self) -> Result<Vec<Report>, StoreError> {
        if !self.path.exists() {
            // Premier démarrage : on crée un document vide
            self.save(&[])?;
            info!("[store] created empty database at {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let doc: RawDocument = serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))?;

        let total = doc.reports.len();
        let mut reports = Vec::with_capacity(total);
        for (index, raw) in doc.reports.into_iter().enumerate() {
            match serde_json::from_value::<Report>(raw) {
                Ok(r) => reports.push(r),
                Err(e) => warn!("[store] skipping unreadable report #{index}: {e}"),
            }
        }

        let skipped = total - reports.len();
        if skipped > 0 {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup)?;
            warn!(
                "[store] {skipped} of {total} reports skipped, original kept at {}",
                backup.display()
            );
        }
        Ok(reports)
    }

    fn save(&self, reports: &[Report]) -> Result<(), StoreError> {
        self.ensure_parent_dir()?;
        let json = serde_json::to_vec_pretty(&DocumentRef { reports })?;

        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckResult;
    use std::collections::BTreeMap;

    fn report(id: &str, ts: i64) -> Report {
        let mut checks = BTreeMap::new();
        checks.insert("antivirus".to_string(), CheckResult::with_status("ok"));
        Report { machine_id: id.into(), hostname: Some("host".into()), os: None, timestamp: ts, checks }
    }

    #[test]
    fn test_load_creates_missing_file_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("db.json");
        let disk = JsonFilePersistence::new(&path);

        assert!(disk.load().unwrap().is_empty());
        assert!(path.exists());
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"reports": []}));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let disk = JsonFilePersistence::new(dir.path().join("db.json"));
        let reports = vec![report("m1", 10), report("m2", 20)];

        disk.save(&reports).unwrap();
        assert_eq!(disk.load().unwrap(), reports);
        assert!(!disk.temp_path().exists());
    }

    #[test]
    fn test_reads_legacy_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(
            &path,
            r#"{"reports":[{"machine_id":"m1","hostname":null,"os":"Darwin","ts":1700000000,
                "checks":{"disk_encryption":{"ok":true,"summary":"FileVault enabled","data":{},"status":"ok"}}}]}"#,
        )
        .unwrap();

        let loaded = JsonFilePersistence::new(&path).load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].timestamp, 1_700_000_000);
        assert_eq!(loaded[0].os.as_deref(), Some("Darwin"));
        assert_eq!(loaded[0].checks["disk_encryption"].status_or_unknown(), "ok");
    }

    #[test]
    fn test_legacy_records_the_model_rejects_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let original = r#"{"reports":[
            {"machine_id":"good","hostname":null,"os":null,"ts":10,"checks":{"antivirus":{"status":"ok"}}},
            {"machine_id":"nan-ts","hostname":null,"os":null,"ts":null,"checks":{}},
            {"machine_id":"flat-check","hostname":null,"os":null,"ts":20,"checks":{"antivirus":"ok"}}
        ]}"#;
        fs::write(&path, original).unwrap();

        let disk = JsonFilePersistence::new(&path);
        let loaded = disk.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].machine_id, "good");

        // l'original reste disponible avant la prochaine réécriture
        assert_eq!(fs::read_to_string(disk.backup_path()).unwrap(), original);
    }

    #[test]
    fn test_clean_load_writes_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let disk = JsonFilePersistence::new(dir.path().join("db.json"));
        disk.save(&[report("m1", 1)]).unwrap();
        assert_eq!(disk.load().unwrap().len(), 1);
        assert!(!disk.backup_path().exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFilePersistence::new(&path).load(), Err(StoreError::Corrupt(_))));
    }
}
