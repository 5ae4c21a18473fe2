//! Export CSV du dernier état par machine.
//!
//! Projection fixe : seuls ces quatre checks sont exportés, quels que soient
//! les noms présents dans les données.

use crate::models::{MachineSummary, UNKNOWN_STATUS};

pub const CSV_CONTENT_TYPE: &str = "text/csv";

const EXPORTED_CHECKS: [&str; 4] = ["disk_encryption", "os_updates", "antivirus", "sleep_policy"];

const HEADER: [&str; 8] = [
    "machine_id",
    "hostname",
    "os",
    "timestamp",
    "disk_encryption.status",
    "os_updates.status",
    "antivirus.status",
    "sleep_policy.status",
];

/// En-tête puis une ligne par machine, séparées par `\n` (pas de saut final)
pub fn to_csv(items: &[MachineSummary]) -> String {
    let mut rows = Vec::with_capacity(items.len() + 1);
    rows.push(HEADER.join(","));

    for item in items {
        let mut fields: Vec<String> = vec![
            item.machine_id.clone(),
            item.hostname.clone().unwrap_or_default(),
            item.os.clone().unwrap_or_default(),
            item.timestamp.to_string(),
        ];
        fields.extend(EXPORTED_CHECKS.iter().map(|name| {
            item.checks
                .get(*name)
                .map_or(UNKNOWN_STATUS, |c| c.status_or_unknown())
                .to_string()
        }));

        let line: Vec<String> = fields.iter().map(|f| escape_field(f)).collect();
        rows.push(line.join(","));
    }

    rows.join("\n")
}

/// Guillemets doublés ; champ entouré de guillemets s'il contient une virgule ou un saut de ligne
fn escape_field(value: &str) -> String {
    let doubled = value.replace('"', "\"\"");
    if doubled.contains(',') || doubled.contains('\n') {
        format!("\"{doubled}\"")
    } else {
        doubled
    }
}
