//! SQLite persistence for every CRM resource.
//!
//! `CrmDb` owns the connection; each resource adds its CRUD methods in its
//! own submodule as another `impl CrmDb` block. Handlers reach it through
//! `DbHandle::call`, which runs the closure on the blocking pool.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, Row, ffi, types::Type};
use serde::{Serialize, de::DeserializeOwned};

use crate::errors::CrmError;

mod dashboard;
mod entreprises;
mod formateurs;
mod localisations;
mod notifications;
mod objectifs;
mod opportunites;
mod plugins;
mod roles;
mod users;
mod ypareo;

#[cfg(test)]
pub(crate) mod test_support;

/// Async-safe handle to the CRM database.
///
/// Wraps `CrmDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<CrmDb>>,
}

impl DbHandle {
    pub fn new(db: CrmDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&CrmDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| CrmError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct CrmDb {
    conn: Connection,
}

impl CrmDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS localisations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    code TEXT NOT NULL UNIQUE,
                    nom TEXT NOT NULL UNIQUE,
                    ville TEXT,
                    adresse TEXT,
                    code_postal TEXT,
                    telephone TEXT,
                    email TEXT,
                    site_web TEXT,
                    actif INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS permissions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    action TEXT NOT NULL,
                    resource TEXT NOT NULL,
                    description TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS roles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    type TEXT NOT NULL UNIQUE,
                    description TEXT,
                    level INTEGER NOT NULL DEFAULT 3,
                    actif INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS role_permissions (
                    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                    permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
                    PRIMARY KEY (role_id, permission_id)
                );

                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    first_name TEXT NOT NULL,
                    last_name TEXT NOT NULL,
                    phone TEXT,
                    avatar TEXT,
                    actif INTEGER NOT NULL DEFAULT 1,
                    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE RESTRICT,
                    localisation_id INTEGER REFERENCES localisations(id) ON DELETE SET NULL,
                    managed_localisations TEXT NOT NULL DEFAULT '[]',
                    last_login_at TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS entreprises (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    raison_sociale TEXT NOT NULL,
                    siret TEXT NOT NULL UNIQUE,
                    siren TEXT,
                    numero_tva TEXT,
                    type_entreprise TEXT NOT NULL DEFAULT 'pme',
                    secteur_activite TEXT,
                    effectif INTEGER,
                    adresse TEXT,
                    code_postal TEXT,
                    ville TEXT,
                    pays TEXT,
                    telephone TEXT,
                    email TEXT,
                    site_web TEXT,
                    contact_principal TEXT,
                    notes TEXT,
                    actif INTEGER NOT NULL DEFAULT 1,
                    opco_rattachement TEXT,
                    tags TEXT NOT NULL DEFAULT '[]',
                    ypareo_id TEXT,
                    last_sync_date TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS opportunites (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    numero_opportunite TEXT NOT NULL UNIQUE,
                    titre TEXT NOT NULL,
                    description TEXT,
                    statut TEXT NOT NULL DEFAULT 'en_cours_collecte',
                    type_formation TEXT NOT NULL DEFAULT 'intra_entreprise',
                    entreprise_id INTEGER NOT NULL REFERENCES entreprises(id) ON DELETE RESTRICT,
                    localisation_id INTEGER REFERENCES localisations(id) ON DELETE SET NULL,
                    commercial_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    intitule_formation TEXT,
                    objectifs_formation TEXT,
                    nombre_participants INTEGER,
                    budget_estime REAL,
                    date_debut_souhaitee TEXT,
                    date_fin_souhaitee TEXT,
                    lieu_formation TEXT,
                    numero_devis TEXT,
                    montant_devis REAL,
                    date_envoi_devis TEXT,
                    organisme_financeur TEXT,
                    montant_accorde REAL,
                    date_formation_debut TEXT,
                    date_formation_fin TEXT,
                    formateurs_assignes TEXT NOT NULL DEFAULT '[]',
                    numero_facture TEXT,
                    montant_facture REAL,
                    date_paiement_recu TEXT,
                    mode_paiement TEXT,
                    notes TEXT,
                    historique TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS opportunite_sequences (
                    year INTEGER PRIMARY KEY,
                    last_value INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS objectifs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    titre TEXT NOT NULL,
                    description TEXT,
                    type_objectif TEXT NOT NULL,
                    periodicite TEXT NOT NULL DEFAULT 'mensuel',
                    cible REAL NOT NULL,
                    realise REAL NOT NULL DEFAULT 0,
                    unite TEXT,
                    date_debut TEXT NOT NULL,
                    date_fin TEXT NOT NULL,
                    actif INTEGER NOT NULL DEFAULT 1,
                    user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    localisation_id INTEGER REFERENCES localisations(id) ON DELETE SET NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS formateurs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    nom TEXT NOT NULL,
                    prenom TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    telephone TEXT,
                    statut TEXT NOT NULL DEFAULT 'actif',
                    competences TEXT NOT NULL DEFAULT '[]',
                    domaines_expertise TEXT NOT NULL DEFAULT '[]',
                    disponible INTEGER NOT NULL DEFAULT 1,
                    localisation_id INTEGER REFERENCES localisations(id) ON DELETE SET NULL,
                    numero_siret TEXT,
                    taux_horaire REAL,
                    notes TEXT,
                    ypareo_id TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS notifications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    utilisateur_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    titre TEXT,
                    message TEXT NOT NULL,
                    type TEXT NOT NULL DEFAULT 'info',
                    lu INTEGER NOT NULL DEFAULT 0,
                    lien TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS plugins (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    nom TEXT NOT NULL UNIQUE,
                    version TEXT NOT NULL,
                    description TEXT,
                    enabled INTEGER NOT NULL DEFAULT 0,
                    config TEXT,
                    hooks TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS ypareo_configs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    api_url TEXT NOT NULL,
                    api_key TEXT NOT NULL,
                    sync_frequency INTEGER NOT NULL DEFAULT 3600,
                    sync_mode TEXT NOT NULL DEFAULT 'read',
                    enabled INTEGER NOT NULL DEFAULT 1,
                    last_sync TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS dashboard_stats (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    utilisateur_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
                    localisation_id INTEGER REFERENCES localisations(id) ON DELETE SET NULL,
                    date TEXT NOT NULL,
                    ca REAL NOT NULL DEFAULT 0,
                    nb_opportunites INTEGER NOT NULL DEFAULT 0,
                    nb_opportunites_gagnees INTEGER NOT NULL DEFAULT 0,
                    taux_conversion REAL NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_users_role ON users(role_id);
                CREATE INDEX IF NOT EXISTS idx_opportunites_entreprise ON opportunites(entreprise_id);
                CREATE INDEX IF NOT EXISTS idx_opportunites_statut ON opportunites(statut);
                CREATE INDEX IF NOT EXISTS idx_opportunites_localisation ON opportunites(localisation_id);
                CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(utilisateur_id, lu);
                CREATE INDEX IF NOT EXISTS idx_dashboard_stats_date ON dashboard_stats(date);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Delete one row by id. A foreign key still pointing at the row becomes
    /// a `CrmError::Conflict` carrying `conflict_message`.
    fn delete_by_id(&self, table: &str, id: i64, conflict_message: &str) -> Result<bool> {
        match self
            .conn
            .execute(&format!("DELETE FROM {} WHERE id = ?1", table), [id])
        {
            Ok(count) => Ok(count > 0),
            Err(e) if constraint_code(&e) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                Err(CrmError::Conflict(conflict_message.to_string()).into())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to delete from {}", table)),
        }
    }
}

// ── Constraint classification ─────────────────────────────────────────

/// Which SQLite constraint rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    Other,
}

fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ffi::ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

/// Find a constraint violation anywhere in an error chain.
pub fn constraint_kind(err: &anyhow::Error) -> Option<ConstraintKind> {
    let code = err
        .chain()
        .find_map(|e| e.downcast_ref::<rusqlite::Error>())
        .and_then(constraint_code)?;
    Some(match code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::Unique,
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
        _ => ConstraintKind::Other,
    })
}

// ── Column helpers ────────────────────────────────────────────────────

/// Decode a JSON TEXT column.
fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode a nullable JSON TEXT column.
fn opt_json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize JSON column")
}

fn opt_to_json<T: Serialize>(value: Option<&T>) -> Result<Option<String>> {
    value.map(to_json).transpose()
}
