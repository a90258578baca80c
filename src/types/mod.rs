mod document;
mod id;
mod index;

pub use document::DocumentRecord;
pub use id::{DocumentId, IdParseError, IdStrategy};
pub use index::{IndexSpec, IndexSpecError, MAX_EXPIRE_AFTER_SECONDS, PAYLOAD_FIELD};
