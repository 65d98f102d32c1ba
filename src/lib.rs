//! Workspace tooling package. It carries the pre-commit hook configuration;
//! the libraries live under `crates/`.
