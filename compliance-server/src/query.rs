/**
 * MOTEUR DE REQUÊTES - "Dernier état connu de chaque machine"
 *
 * RÔLE :
 * Fonctions pures sur le log des rapports, partagées par les trois surfaces
 * (listing JSON, export CSV, historique d'une machine).
 *
 * FONCTIONNEMENT :
 * - latest_per_machine : un seul scan, machine_id -> rapport au timestamp max
 * - filtres os / hasIssues / q appliqués après réduction (ET logique, commutatifs)
 * - tri séparé (sort_summaries), choisi par la couche HTTP
 * - history : rapports d'une machine, plus récent d'abord, tronqué à `limit`
 *
 * ÉGALITÉ DE TIMESTAMP : comparaison strictement supérieure, donc pour une même
 * machine le PREMIER rapport rencontré (ordre d'insertion) au timestamp max gagne.
 */

use crate::models::{HistoryEntry, MachineSummary, Report};
use serde::Serialize;
use std::collections::HashMap;

/// Filtres optionnels du listing, combinés en ET
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineFilters {
    /// Égalité insensible à la casse sur `os`
    pub os: Option<String>,
    /// Présence (true) ou absence (false) d'au moins un check en `issue`
    pub has_issues: Option<bool>,
    /// Sous-chaîne insensible à la casse dans machine_id OU hostname
    pub q: Option<String>,
}

impl MachineFilters {
    /// Sémantique des paramètres HTTP : `os`/`q` vides = pas de filtre,
    /// `hasIssues` présent = filtre, vrai seulement pour "true".
    pub fn from_params(os: Option<&str>, has_issues: Option<&str>, q: Option<&str>) -> Self {
        let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            os: non_empty(os),
            has_issues: has_issues.map(|v| v.eq_ignore_ascii_case("true")),
            q: non_empty(q),
        }
    }

    pub fn matches(&self, m: &MachineSummary) -> bool {
        self.matches_os(m) && self.matches_issues(m) && self.matches_query(m)
    }

    fn matches_os(&self, m: &MachineSummary) -> bool {
        match &self.os {
            None => true,
            Some(wanted) => m.os.as_deref().is_some_and(|os| os.to_lowercase() == wanted.to_lowercase()),
        }
    }

    fn matches_issues(&self, m: &MachineSummary) -> bool {
        self.has_issues.map_or(true, |wanted| has_issues(m) == wanted)
    }

    fn matches_query(&self, m: &MachineSummary) -> bool {
        let Some(q) = &self.q else { return true };
        let needle = q.to_lowercase();
        m.machine_id.to_lowercase().contains(&needle)
            || m.hostname.as_deref().is_some_and(|h| h.to_lowercase().contains(&needle))
    }
}

/// Au moins un check avec le statut réservé `issue`
pub fn has_issues(m: &MachineSummary) -> bool {
    m.checks.values().any(|c| c.is_issue())
}

/// Dernier rapport de chaque machine, filtré.
/// Ordre de sortie = ordre de première apparition du machine_id dans le log
/// (déterministe mais pas garanti, trier avec `sort_summaries`).
pub fn latest_per_machine(reports: &[Report], filters: &MachineFilters) -> Vec<MachineSummary> {
    let mut order: Vec<&str> = Vec::new();
    let mut latest: HashMap<&str, &Report> = HashMap::new();

    for r in reports {
        match latest.get(r.machine_id.as_str()) {
            None => {
                order.push(&r.machine_id);
                latest.insert(&r.machine_id, r);
            }
            Some(prev) if r.timestamp > prev.timestamp => {
                latest.insert(&r.machine_id, r);
            }
            Some(_) => {}
        }
    }

    order
        .into_iter()
        .filter_map(|id| latest.get(id))
        .map(|r| MachineSummary::from(*r))
        .filter(|m| filters.matches(m))
        .collect()
}

/// Historique d'une machine, plus récent d'abord. Machine inconnue = liste vide.
/// Tri stable : à timestamp égal, l'ordre d'insertion est conservé.
pub fn history(reports: &[Report], machine_id: &str, limit: usize) -> Vec<HistoryEntry> {
    let mut rows: Vec<&Report> = reports.iter().filter(|r| r.machine_id == machine_id).collect();
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows.into_iter().take(limit).map(HistoryEntry::from).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    MachineId,
    Hostname,
    Os,
    Timestamp,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "machine_id" => Some(Self::MachineId),
            "hostname" => Some(Self::Hostname),
            "os" => Some(Self::Os),
            "timestamp" => Some(Self::Timestamp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    /// Tout ce qui n'est pas "desc" trie en ascendant
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

/// Tri stable. Chaînes comparées sans casse (null = ""), timestamps numériquement.
pub fn sort_summaries(items: &mut [MachineSummary], key: SortKey, dir: SortDir) {
    let text = |s: &Option<String>| s.as_deref().unwrap_or_default().to_lowercase();
    items.sort_by(|a, b| {
        let ord = match key {
            SortKey::MachineId => a.machine_id.to_lowercase().cmp(&b.machine_id.to_lowercase()),
            SortKey::Hostname => text(&a.hostname).cmp(&text(&b.hostname)),
            SortKey::Os => text(&a.os).cmp(&text(&b.os)),
            SortKey::Timestamp => a.timestamp.cmp(&b.timestamp),
        };
        match dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    });
}

/// Compteurs affichés au-dessus du tableau admin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FleetStats {
    pub machines: usize,
    pub with_issues: usize,
}

impl FleetStats {
    pub fn of(items: &[MachineSummary]) -> Self {
        Self {
            machines: items.len(),
            with_issues: items.iter().filter(|m| has_issues(m)).count(),
        }
    }
}
