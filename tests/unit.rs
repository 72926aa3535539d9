//! Entry point for the `tests/unit/*` module group — narrower, single-concern
//! tests than the top-level `tests/{registry,query_builder,sql_rendering}.rs`
//! integration suites.

#[path = "support/mod.rs"]
mod support;
#[path = "unit/mod.rs"]
mod unit;
