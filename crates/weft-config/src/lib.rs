//! Weft Config
//!
//! This crate contains the serializable pipeline configuration types for weft.
//! These types describe a pipeline before it is resolved into a frozen graph
//! by `weft-resolver`, plus the [`EngineConfig`] the executor runs with.
//!
//! Pipelines are JSON files:
//!
//! ```json
//! {
//!   "pipeline_id": "preproc",
//!   "name": "Functional preprocessing",
//!   "params": { "fwhm": 8 },
//!   "iterables": [{ "name": "subject_id", "values": ["sub01", "sub02"] }],
//!   "nodes": [
//!     {
//!       "node_id": "smooth",
//!       "action": "command",
//!       "program": "fslmaths",
//!       "args": ["{{ in_file }}", "-s", "{{ fwhm }}", "{{ work_dir }}/smooth.nii.gz"],
//!       "produces": { "out_file": "{{ work_dir }}/smooth.nii.gz" },
//!       "inputs": ["in_file", "fwhm"],
//!       "map_over": ["in_file"],
//!       "fixed": { "fwhm": "{{ params.fwhm }}" }
//!     }
//!   ],
//!   "edges": []
//! }
//! ```

mod action;
mod edge;
mod engine;
mod node;
mod pipeline;

pub use action::ActionDef;
pub use edge::{EdgeDef, SelectorDef};
pub use engine::{CancelPolicy, EngineConfig};
pub use node::{NodeDef, PortDef};
pub use pipeline::{AxisDef, PipelineDef};
