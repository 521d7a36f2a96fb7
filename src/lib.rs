pub mod api;
pub mod backuprestore;
pub mod cache;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod helpers;
pub mod migration;
pub mod queue;
pub mod reconciler;
