pub mod config;
pub mod conserved;
pub mod consistency;
pub mod equilibrium;
pub mod error;
pub mod generator;
pub mod moments;
pub mod report;
pub mod scheme;
pub mod stability;
pub mod stencil;
pub mod symbolic;

pub use config::SchemeConfig;
pub use consistency::{ConservationLaw, ConsistencyResult};
pub use error::{Result, SchemeError};
pub use generator::{Generator, ListingGenerator};
pub use report::ReportWriter;
pub use scheme::{AnalysisReport, Scheme};
pub use stability::StabilityAnalysis;
pub use stencil::Stencil;
pub use symbolic::{Expr, Symbol, parse_expr};

pub type Float = f64;
