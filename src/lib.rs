//! Multi-tenant HSE contractor evaluation backend.
//!
//! The load-bearing subsystem is the FRM32 K2 weighted-scoring workflow under
//! [`workflows::frm32`]: a metric catalog of weighted criteria, a per-submission
//! score ledger, and a scoring engine that derives the weighted final score and
//! risk classification as submissions move through draft, submitted, and
//! reviewed states.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
