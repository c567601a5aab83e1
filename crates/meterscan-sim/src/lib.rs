//! # meterscan-sim - Synthetic Meter Sheets
//!
//! Seeded generation of building/facility consumption tables with injected
//! tamper patterns and ground truth, for exercising and benchmarking the
//! meterscan engine.
//!
//! The simulator holds no detection logic. It only writes sheets and records
//! which facility was tampered with and which rule ought to notice.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meterscan_sim::{GeneratorConfig, SheetGenerator};
//!
//! let mut generator = SheetGenerator::new(GeneratorConfig::default()).unwrap();
//! let sheet = generator.generate();
//! sheet.write_csv(std::io::stdout()).unwrap();
//! ```
//!
//! ## Available Scenarios
//!
//! | Scenario             | Expected rule     |
//! |----------------------|-------------------|
//! | `sudden_cut`         | sudden drop       |
//! | `zeroed_months`      | zero consumption  |
//! | `bypass_low`         | low consumption   |
//! | `declining_trend`    | trend             |
//! | `seasonal_inversion` | seasonal          |
//! | `peer_under_draw`    | peer comparison   |

pub mod generator;
pub mod scenarios;

pub use generator::{GeneratorConfig, GroundTruth, SheetGenerator, SimError, SyntheticSheet};
pub use scenarios::{Scenario, all_scenarios, create_scenario, list_scenarios};
