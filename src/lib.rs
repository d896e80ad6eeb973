//! Client-side data-synchronization core for the ClayMinds wellness tracker.
//!
//! Reconciles local application state with a remote PostgREST-style store
//! (tables `diary`, `diet`, `evidences` plus blob storage) under an
//! optimistic-update model: the UI applies changes immediately, the
//! [`sync::SyncService`] persists them best-effort, and the caller rolls back
//! on confirmed failure. A tombstone set guards evidence deletes against
//! silent server-side filtering, and [`backup::DiaryBackup`] keeps a
//! redundant copy of the diary list to survive schema drift.
//!
//! Construct one [`sync::SyncService`] at startup (from [`config::Config`]
//! master values and a [`local::LocalStore`]) and pass it by reference to
//! consumers.

pub mod ai;
pub mod backup;
pub mod config;
pub mod error;
pub mod local;
pub mod models;
pub mod parser;
pub mod remote;
pub mod stats;
pub mod sync;

pub use config::{CloudConfig, Config};
pub use error::{AppError, AppResult};
pub use models::diary::DiaryEntry;
pub use models::diet::{DietPlan, Meal, MealCategory};
pub use models::evidence::EvidenceEntry;
pub use sync::SyncService;
