//! Data layer: core types, loading, and time-series operations.
//!
//! Architecture:
//! ```text
//!  .txt / .dat / .csv        .parquet / .json
//!        │                          │
//!        ▼                          ▼
//!   ┌──────────┐              ┌──────────┐
//!   │  loader   │  LoadSpec    │ columnar  │
//!   └──────────┘              └──────────┘
//!        │                          │
//!        └────────────┬─────────────┘
//!                     ▼
//!               ┌──────────┐
//!               │ Dataset   │  Schema + Vec<Record>, time-indexed
//!               └──────────┘
//!                     │
//!        ┌────────────┼─────────────┬──────────┐
//!        ▼            ▼             ▼          ▼
//!   ┌────────┐  ┌──────────┐  ┌────────┐  ┌────────┐
//!   │ filter │  │ resample │  │ precip │  │ stats  │
//!   └────────┘  └──────────┘  └────────┘  └────────┘
//! ```

pub mod columnar;
pub mod filter;
pub mod loader;
pub mod model;
pub mod precip;
pub mod resample;
pub mod stats;
pub mod time;
