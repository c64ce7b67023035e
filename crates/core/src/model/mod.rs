mod catalog;
mod ids;
mod record;
mod state;

pub use catalog::{Catalog, CatalogError, ContentNode, MinutesRange, MODULES_ROOT, TRACKS_ROOT};
pub use ids::ContentId;
pub use record::{LearningRecord, LearningType, RecordPatch, GRAND_OPENING};
pub use state::ProgressState;
