//! Recording sessions: the ordered log every recording-stopped consumer reads.
//!
//! # Module Structure
//!
//! - `types` - Log entry and category types
//! - `recorder` - The concurrent append-only recorder

mod recorder;
mod types;

pub use recorder::ExchangeRecorder;
pub use types::{MessageType, RecordedLogEntry};
