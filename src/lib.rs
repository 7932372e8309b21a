#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod dates;
pub mod error;

pub use auth::{CredentialResolver, ResolverConfig, ScopeSet};
pub use client::{AdMobClient, ApiVersion};
pub use error::{Error, Result};
