//! Activity logging: append-only JSONL with graceful degradation plus a
//! tagged stderr echo.

pub mod activity;
pub mod jsonl;
