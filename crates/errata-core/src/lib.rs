//! Core types for errata-jira.
//!
//! Domain enums shared by the template engine and the CLI, the erratum record
//! templates are rendered against, and the service-catalog descriptor model.

pub mod catalog;
pub mod enums;
pub mod erratum;
