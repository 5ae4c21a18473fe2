/**
 * MODÈLES - Rapports de conformité et vues dérivées
 *
 * RÔLE : Format des rapports envoyés par les agents (chiffrement disque, mises à jour OS,
 * antivirus, veille) + vues calculées à la demande (MachineSummary, HistoryEntry).
 *
 * Les checks restent un dictionnaire ouvert : un nouveau type de check ne demande
 * aucune modification du moteur, seul l'export CSV connaît des noms fixes.
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ValidationError;

/// Statut réservé qui signale un check en échec
pub const ISSUE_STATUS: &str = "issue";
/// Rendu d'un check absent ou sans statut
pub const UNKNOWN_STATUS: &str = "unknown";

pub type Checks = BTreeMap<String, CheckResult>;

/// Résultat d'un check : `status` + champs libres (summary, data...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl CheckResult {
    pub fn with_status(status: &str) -> Self {
        Self { status: Some(status.to_string()), extra: serde_json::Map::new() }
    }

    /// Statut effectif, `unknown` si absent ou vide
    pub fn status_or_unknown(&self) -> &str {
        match self.status.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => UNKNOWN_STATUS,
        }
    }

    pub fn is_issue(&self) -> bool {
        self.status_or_unknown() == ISSUE_STATUS
    }
}

/// Rapport stocké, immuable une fois ajouté au log.
/// Sur disque le timestamp s'appelle `ts` (compatibilité avec l'ancienne base JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub machine_id: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(rename = "ts")]
    pub timestamp: i64,
    pub checks: Checks,
}

/// Dernier état connu d'une machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineSummary {
    pub machine_id: String,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub timestamp: i64,
    pub checks: Checks,
}

impl From<&Report> for MachineSummary {
    fn from(r: &Report) -> Self {
        Self {
            machine_id: r.machine_id.clone(),
            hostname: r.hostname.clone(),
            os: r.os.clone(),
            timestamp: r.timestamp,
            checks: r.checks.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub checks: Checks,
}

impl From<&Report> for HistoryEntry {
    fn from(r: &Report) -> Self {
        Self {
            timestamp: r.timestamp,
            hostname: r.hostname.clone(),
            os: r.os.clone(),
            checks: r.checks.clone(),
        }
    }
}

/// Payload brut de POST /api/v1/report, avant validation.
/// Tout est `Value` : la coercition du timestamp et les messages d'erreur sont gérés ici,
/// pas par serde.
#[derive(Debug, Default, Deserialize)]
pub struct ReportInput {
    #[serde(default)]
    pub machine_id: Option<Value>,
    #[serde(default)]
    pub hostname: Option<Value>,
    #[serde(default)]
    pub os: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub checks: Option<Value>,
}

impl ReportInput {
    pub fn from_json(body: Value) -> Result<Self, ValidationError> {
        if !body.is_object() {
            return Err(ValidationError::InvalidField {
                field: "body",
                reason: "expected a JSON object".into(),
            });
        }
        serde_json::from_value(body).map_err(|e| ValidationError::InvalidField {
            field: "body",
            reason: e.to_string(),
        })
    }

    /// Champs requis : `machine_id` non vide, `timestamp` numérique, `checks` objet.
    /// Un timestamp qui vaut 0 seconde une fois converti compte comme absent,
    /// comme l'ancien serveur qui refusait toute valeur "fausse".
    pub fn validate(self) -> Result<Report, ValidationError> {
        let machine_id = match self.machine_id {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            None | Some(Value::String(_)) => return Err(ValidationError::MissingField("machine_id")),
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "machine_id",
                    reason: "expected a string".into(),
                })
            }
        };

        let timestamp = match self.timestamp {
            None => return Err(ValidationError::MissingField("timestamp")),
            Some(v) => coerce_timestamp(&v).ok_or_else(|| ValidationError::InvalidField {
                field: "timestamp",
                reason: format!("cannot coerce {v} to seconds since epoch"),
            })?,
        };
        if timestamp == 0 {
            return Err(ValidationError::MissingField("timestamp"));
        }

        let checks = match self.checks {
            None => return Err(ValidationError::MissingField("checks")),
            Some(v @ Value::Object(_)) => serde_json::from_value::<Checks>(v).map_err(|e| {
                ValidationError::InvalidField { field: "checks", reason: e.to_string() }
            })?,
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "checks",
                    reason: "expected an object keyed by check name".into(),
                })
            }
        };

        Ok(Report {
            machine_id,
            hostname: optional_text("hostname", self.hostname)?,
            os: optional_text("os", self.os)?,
            timestamp,
            checks,
        })
    }
}

/// Entier, flottant fini (tronqué) ou chaîne numérique
fn coerce_timestamp(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_to_seconds)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_seconds))
        }
        _ => None,
    }
}

fn float_to_seconds(f: f64) -> Option<i64> {
    // i64::MAX n'est pas représentable exactement en f64
    if f.is_finite() && f.abs() < 9.0e18 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn optional_text(field: &'static str, v: Option<Value>) -> Result<Option<String>, ValidationError> {
    match v {
        None => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ValidationError::InvalidField { field, reason: "expected a string".into() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(v: Value) -> Result<Report, ValidationError> {
        ReportInput::from_json(v)?.validate()
    }

    #[test]
    fn test_valid_report_defaults_optional_fields() {
        let r = input(json!({
            "machine_id": "m1",
            "timestamp": 100,
            "checks": {"antivirus": {"status": "ok", "summary": "Defender on"}}
        }))
        .unwrap();
        assert_eq!(r.machine_id, "m1");
        assert_eq!(r.hostname, None);
        assert_eq!(r.os, None);
        assert_eq!(r.timestamp, 100);
        assert_eq!(r.checks["antivirus"].status.as_deref(), Some("ok"));
        assert_eq!(r.checks["antivirus"].extra["summary"], json!("Defender on"));
    }

    #[test]
    fn test_missing_required_fields() {
        let err = input(json!({"machine_id": "m1", "checks": {}})).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("timestamp"));

        let err = input(json!({"timestamp": 1, "checks": {}})).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("machine_id"));

        let err = input(json!({"machine_id": "  ", "timestamp": 1, "checks": {}})).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("machine_id"));

        let err = input(json!({"machine_id": "m1", "timestamp": 1, "checks": null})).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("checks"));
    }

    #[test]
    fn test_timestamp_coercion() {
        let base = |ts: Value| json!({"machine_id": "m1", "timestamp": ts, "checks": {}});
        assert_eq!(input(base(json!("1700000000"))).unwrap().timestamp, 1_700_000_000);
        assert_eq!(input(base(json!(" 42 "))).unwrap().timestamp, 42);
        assert_eq!(input(base(json!(12.9))).unwrap().timestamp, 12);
        assert_eq!(input(base(json!("1e3"))).unwrap().timestamp, 1000);

        for bad in [json!("yesterday"), json!(""), json!(true), json!({"s": 1}), json!("NaN")] {
            assert!(matches!(
                input(base(bad)),
                Err(ValidationError::InvalidField { field: "timestamp", .. })
            ));
        }
    }

    #[test]
    fn test_zero_timestamp_counts_as_missing() {
        for zero in [json!(0), json!("0"), json!(0.0)] {
            let err = input(json!({"machine_id": "m1", "timestamp": zero, "checks": {}})).unwrap_err();
            assert_eq!(err, ValidationError::MissingField("timestamp"));
        }
        assert_eq!(input(json!({"machine_id": "m1", "timestamp": 1, "checks": {}})).unwrap().timestamp, 1);
    }

    #[test]
    fn test_checks_shape() {
        let err = input(json!({"machine_id": "m1", "timestamp": 1, "checks": ["antivirus"]})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "checks", .. }));

        let err = input(json!({"machine_id": "m1", "timestamp": 1, "checks": {"av": {"status": 3}}})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "checks", .. }));
    }

    #[test]
    fn test_empty_strings_become_null() {
        let r = input(json!({"machine_id": "m1", "hostname": "", "os": "", "timestamp": 1, "checks": {}})).unwrap();
        assert_eq!(r.hostname, None);
        assert_eq!(r.os, None);
    }

    #[test]
    fn test_non_object_body() {
        assert!(ReportInput::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_status_or_unknown() {
        assert_eq!(CheckResult::default().status_or_unknown(), "unknown");
        assert_eq!(CheckResult::with_status("").status_or_unknown(), "unknown");
        assert!(CheckResult::with_status("issue").is_issue());
        assert!(!CheckResult::with_status("ok").is_issue());
    }

    #[test]
    fn test_report_uses_ts_on_disk() {
        let r = input(json!({"machine_id": "m1", "timestamp": 5, "checks": {}})).unwrap();
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["ts"], json!(5));
        let back: Report = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }
}
