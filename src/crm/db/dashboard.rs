use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::CrmDb;
use crate::crm::models::{
    DashboardStat, DashboardStatInput, KpiSummary, LocalisationPerformance, Opportunite,
    OpportuniteFilter, TypeObjectif, conversion_rate,
};

const COLUMNS: &str = "id, utilisateur_id, localisation_id, date, ca, nb_opportunites, \
                       nb_opportunites_gagnees, taux_conversion, created_at";

/// Label used for opportunités without a localisation.
const UNASSIGNED: &str = "Non affectée";

fn row_to_stat(row: &Row<'_>) -> rusqlite::Result<DashboardStat> {
    Ok(DashboardStat {
        id: row.get(0)?,
        utilisateur_id: row.get(1)?,
        localisation_id: row.get(2)?,
        date: row.get(3)?,
        ca: row.get(4)?,
        nb_opportunites: row.get(5)?,
        nb_opportunites_gagnees: row.get(6)?,
        taux_conversion: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[derive(Default)]
struct Tally {
    ca: f64,
    total: i64,
    won: i64,
}

impl Tally {
    fn add(&mut self, opp: &Opportunite) {
        self.ca += opp.chiffre_affaires();
        self.total += 1;
        if opp.statut.is_won() {
            self.won += 1;
        }
    }
}

impl CrmDb {
    // ── Dashboard snapshots ───────────────────────────────────────────

    pub fn create_dashboard_stat(&self, input: &DashboardStatInput) -> Result<DashboardStat> {
        self.conn
            .execute(
                "INSERT INTO dashboard_stats (utilisateur_id, localisation_id, date, ca, nb_opportunites,
                     nb_opportunites_gagnees, taux_conversion)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    input.utilisateur_id,
                    input.localisation_id,
                    input.date,
                    input.ca,
                    input.nb_opportunites,
                    input.nb_opportunites_gagnees,
                    input.taux_conversion,
                ],
            )
            .context("Failed to insert dashboard stat")?;
        let id = self.conn.last_insert_rowid();
        self.get_dashboard_stat(id)?
            .context("Dashboard stat not found after insert")
    }

    pub fn list_dashboard_stats(&self) -> Result<Vec<DashboardStat>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM dashboard_stats ORDER BY date DESC, id DESC",
                COLUMNS
            ))
            .context("Failed to prepare list_dashboard_stats")?;
        let rows = stmt
            .query_map([], row_to_stat)
            .context("Failed to query dashboard stats")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read dashboard stat row")
    }

    pub fn get_dashboard_stat(&self, id: i64) -> Result<Option<DashboardStat>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM dashboard_stats WHERE id = ?1", COLUMNS))
            .context("Failed to prepare get_dashboard_stat")?;
        let mut rows = stmt
            .query_map(params![id], row_to_stat)
            .context("Failed to query dashboard stat")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read dashboard stat row")?)),
            None => Ok(None),
        }
    }

    pub fn update_dashboard_stat(
        &self,
        id: i64,
        input: &DashboardStatInput,
    ) -> Result<Option<DashboardStat>> {
        let count = self
            .conn
            .execute(
                "UPDATE dashboard_stats SET utilisateur_id = ?1, localisation_id = ?2, date = ?3,
                     ca = ?4, nb_opportunites = ?5, nb_opportunites_gagnees = ?6, taux_conversion = ?7
                 WHERE id = ?8",
                params![
                    input.utilisateur_id,
                    input.localisation_id,
                    input.date,
                    input.ca,
                    input.nb_opportunites,
                    input.nb_opportunites_gagnees,
                    input.taux_conversion,
                    id,
                ],
            )
            .context("Failed to update dashboard stat")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_dashboard_stat(id)
    }

    pub fn delete_dashboard_stat(&self, id: i64) -> Result<bool> {
        self.delete_by_id("dashboard_stats", id, "Cette statistique est encore référencée")
    }

    // ── Live KPIs ─────────────────────────────────────────────────────

    /// Turnover, volume and conversion over every opportunité, with targets
    /// taken from the active objectifs.
    pub fn kpi_summary(&self) -> Result<KpiSummary> {
        let mut tally = Tally::default();
        for opp in self.list_opportunites(&OpportuniteFilter::default())? {
            tally.add(&opp);
        }

        let mut target_ca = 0.0;
        let mut target_opportunites = 0.0;
        let mut conversion_targets = Vec::new();
        for objectif in self.list_active_objectifs()? {
            match objectif.type_objectif {
                TypeObjectif::ChiffreAffaires => target_ca += objectif.cible,
                TypeObjectif::NombreOpportunites => target_opportunites += objectif.cible,
                TypeObjectif::TauxConversion => conversion_targets.push(objectif.cible),
                _ => {}
            }
        }
        let target_conversion_rate = if conversion_targets.is_empty() {
            0.0
        } else {
            conversion_targets.iter().sum::<f64>() / conversion_targets.len() as f64
        };

        Ok(KpiSummary {
            total_ca: tally.ca,
            total_opportunites: tally.total,
            opportunites_gagnees: tally.won,
            conversion_rate: conversion_rate(tally.won, tally.total),
            target_ca,
            target_opportunites,
            target_conversion_rate,
        })
    }

    /// The same figures per localisation. Every localisation is listed, and
    /// opportunités without one are grouped last under a single entry.
    pub fn localisation_performance(&self) -> Result<Vec<LocalisationPerformance>> {
        let mut tallies: BTreeMap<Option<i64>, Tally> = BTreeMap::new();
        for opp in self.list_opportunites(&OpportuniteFilter::default())? {
            tallies.entry(opp.localisation_id).or_default().add(&opp);
        }

        let mut performance: Vec<LocalisationPerformance> = self
            .list_localisations()?
            .into_iter()
            .map(|loc| {
                let tally = tallies.remove(&Some(loc.id)).unwrap_or_default();
                LocalisationPerformance {
                    localisation_id: Some(loc.id),
                    name: loc.nom,
                    ca: tally.ca,
                    opportunites: tally.total,
                    conversion: conversion_rate(tally.won, tally.total),
                }
            })
            .collect();

        if let Some(tally) = tallies.remove(&None) {
            performance.push(LocalisationPerformance {
                localisation_id: None,
                name: UNASSIGNED.to_string(),
                ca: tally.ca,
                opportunites: tally.total,
                conversion: conversion_rate(tally.won, tally.total),
            });
        }
        Ok(performance)
    }
}
