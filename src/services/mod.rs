//! Adapters for the hosted collaborators the storefront calls.
//!
//! Each collaborator is a trait so handlers and tests can swap in fakes;
//! the concrete types talk to the real services over plain request/response.
pub mod auth;
pub mod backend;
pub mod email;
pub mod images;
pub mod payments;
