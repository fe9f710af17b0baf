pub mod collapse;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod duplicates;
pub mod format;
pub mod grouping;
pub mod layout;
pub mod metrics;
pub mod overrides;
pub mod pipeline;
pub mod record;
pub mod series;
pub mod stage2;
pub mod stage3;
pub mod table;
pub mod tokens;
