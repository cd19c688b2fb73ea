//! # Scriptorium Converter
//!
//! Conversions between the PERF tree and the editable document tree.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ parser: marker text ↔ PERF tree             │
//! └─────────────────────────────────────────────┘
//!                     ↕
//! ┌─────────────────────────────────────────────┐
//! │ converter: PERF ↔ document node tree        │
//! │  - blocks/wrappers → elements and text runs │
//! │  - grafts → editable sub-regions            │
//! │  - side-sequence materialization on reverse │
//! └─────────────────────────────────────────────┘
//!                     ↕
//! ┌─────────────────────────────────────────────┐
//! │ editor: state arena, history, operations    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod forward;
pub mod fragment;
pub mod nodes;
pub mod reverse;

pub use error::{ConvertError, ConvertResult};
pub use forward::perf_to_document;
pub use fragment::{node_from_marker_text, FragmentKind};
pub use nodes::{perf_kind_of, DocNode, PerfKind};
pub use reverse::{document_to_perf, Conversion, PerfNode};
