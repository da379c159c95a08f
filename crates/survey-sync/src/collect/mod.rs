//! Mapping between the flat local keys and the remote record columns.

pub mod collector;
pub mod hydrate;
pub mod sections;
pub mod session;

pub use collector::{CollectedPayload, SectionCollector, SkippedKey};
pub use hydrate::{local_has_section_data, HydrationReport, Hydrator};
pub use sections::{all_sections, section_for_column, Section};
pub use session::{clear_stale_session, stale_session_keys};
