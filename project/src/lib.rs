//! Contracts for the external project service that fetches and stores
//! project content, plus an HTTP client implementing them.

pub mod accessor;
pub mod client;
pub mod types;

pub use accessor::{ProjectAccessor, ProjectError, ProjectFactory, ProjectResolver};
pub use client::HttpProjectService;
pub use types::{Env, GetParams, ProjectId, normalize_id};
